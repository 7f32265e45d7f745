use std::borrow::Cow;

/// Number of leading bytes the decoder emits ahead of the real content.
pub const MARKER_LEN: usize = 3;

/// Decoded symbol content with the leading marker removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPayload {
    source_index: usize,
    bytes: Vec<u8>,
}

impl DecodedPayload {
    /// Build from raw recognizer output, dropping the first [`MARKER_LEN`] bytes.
    /// Output shorter than the marker yields empty content.
    pub fn from_raw(source_index: usize, mut raw: Vec<u8>) -> Self {
        let cut = raw.len().min(MARKER_LEN);
        raw.drain(..cut);
        Self {
            source_index,
            bytes: raw,
        }
    }

    /// Candidate index this payload was decoded from
    pub fn source_index(&self) -> usize {
        self.source_index
    }

    /// Content bytes after the marker
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Always [`MARKER_LEN`]
    pub fn leading_marker_len(&self) -> usize {
        MARKER_LEN
    }

    /// Content as text, invalid UTF-8 replaced
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }
}

/// Per-candidate result, in candidate order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolResult {
    Decoded(DecodedPayload),
    Unreadable { index: usize, reason: String },
}

impl SymbolResult {
    pub fn index(&self) -> usize {
        match self {
            SymbolResult::Decoded(payload) => payload.source_index(),
            SymbolResult::Unreadable { index, .. } => *index,
        }
    }

    pub fn is_decoded(&self) -> bool {
        matches!(self, SymbolResult::Decoded(_))
    }
}

/// Overall result of decoding every candidate of one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    NoSymbolsLocated,
    AllDecoded(Vec<DecodedPayload>),
    PartiallyFailed {
        decoded: Vec<DecodedPayload>,
        failures: usize,
    },
}

impl Outcome {
    /// Fold ordered per-candidate results into an outcome
    pub fn from_results(results: Vec<SymbolResult>) -> Self {
        if results.is_empty() {
            return Outcome::NoSymbolsLocated;
        }

        let mut decoded = Vec::with_capacity(results.len());
        let mut failures = 0;
        for result in results {
            match result {
                SymbolResult::Decoded(payload) => decoded.push(payload),
                SymbolResult::Unreadable { .. } => failures += 1,
            }
        }

        if failures == 0 {
            Outcome::AllDecoded(decoded)
        } else {
            Outcome::PartiallyFailed { decoded, failures }
        }
    }

    /// Payloads that decoded, in candidate order
    pub fn decoded(&self) -> &[DecodedPayload] {
        match self {
            Outcome::NoSymbolsLocated => &[],
            Outcome::AllDecoded(decoded) | Outcome::PartiallyFailed { decoded, .. } => decoded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_is_stripped() {
        let payload = DecodedPayload::from_raw(0, b"\xEF\xBB\xBFHELLO".to_vec());
        assert_eq!(payload.bytes(), b"HELLO");
        assert_eq!(payload.text(), "HELLO");
        assert_eq!(payload.leading_marker_len(), 3);
    }

    #[test]
    fn test_short_output_gives_empty_content() {
        assert!(DecodedPayload::from_raw(1, vec![0xEF, 0xBB]).bytes().is_empty());
        assert!(DecodedPayload::from_raw(1, Vec::new()).bytes().is_empty());
    }

    #[test]
    fn test_outcome_classification() {
        assert_eq!(Outcome::from_results(Vec::new()), Outcome::NoSymbolsLocated);

        let ok = SymbolResult::Decoded(DecodedPayload::from_raw(0, b"abcX".to_vec()));
        let bad = SymbolResult::Unreadable {
            index: 1,
            reason: "ECC failure".into(),
        };

        match Outcome::from_results(vec![ok.clone()]) {
            Outcome::AllDecoded(list) => assert_eq!(list[0].bytes(), b"X"),
            other => panic!("unexpected outcome {other:?}"),
        }

        let outcome = Outcome::from_results(vec![ok, bad]);
        assert!(matches!(
            outcome,
            Outcome::PartiallyFailed { failures: 1, .. }
        ));
        assert_eq!(outcome.decoded().len(), 1);
    }
}
