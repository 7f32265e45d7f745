//! Walk every candidate of a session in index order.

use crate::error::DecodeError;
use crate::models::{Outcome, SymbolResult};
use crate::recognizer::Recognizer;
use crate::session::DecodeSession;
use log::info;

/// Decode every candidate, one result per index, in ascending order.
///
/// Returns an empty list without attempting any decode when nothing was
/// located.
pub fn decode_all<R: Recognizer>(session: &DecodeSession<'_, R>) -> Vec<SymbolResult> {
    (0..session.count())
        .map(|index| match session.decode(index) {
            Ok(payload) => {
                info!(
                    "Content from QR (i: {}): '{}'",
                    payload.source_index(),
                    payload.text()
                );
                SymbolResult::Decoded(payload)
            }
            Err(DecodeError::Unreadable { index, reason }) => {
                SymbolResult::Unreadable { index, reason }
            }
            Err(err @ DecodeError::IndexOutOfRange { .. }) => SymbolResult::Unreadable {
                index,
                reason: err.to_string(),
            },
        })
        .collect()
}

/// Decode every candidate and classify the frame.
pub fn aggregate<R: Recognizer>(session: &DecodeSession<'_, R>) -> Outcome {
    Outcome::from_results(decode_all(session))
}
