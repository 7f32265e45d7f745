//! Decode session: one frame loaded into a recognizer bitmap, located once,
//! decoded symbol by symbol.

use crate::error::{AllocationError, DecodeError};
use crate::models::DecodedPayload;
use crate::recognizer::Recognizer;
use image::GrayImage;
use log::{debug, error};

/// A frame loaded into recognizer-owned memory.
///
/// The bitmap and candidate list live exactly as long as the session.
/// Dropping the session (or calling [`DecodeSession::destroy`]) releases them
/// once, on every exit path.
pub struct DecodeSession<'r, R: Recognizer> {
    recognizer: &'r R,
    bitmap: GrayImage,
    candidates: Vec<R::Candidate>,
}

impl<'r, R: Recognizer> DecodeSession<'r, R> {
    /// Allocate a `width` x `height` bitmap, copy `buffer` into it and locate
    /// candidate symbols.
    ///
    /// The buffer is copied verbatim. Bytes past `width * height` are
    /// ignored; a short buffer leaves the rest of the bitmap white.
    pub fn create(
        recognizer: &'r R,
        buffer: &[u8],
        width: usize,
        height: usize,
    ) -> Result<Self, AllocationError> {
        debug!("Creating decode session ({}x{})", width, height);
        let mut bitmap = recognizer.allocate(width, height).inspect_err(|e| {
            error!("Unable to allocate decode bitmap: {}", e);
        })?;

        let pixels: &mut [u8] = &mut bitmap;
        let copied = buffer.len().min(pixels.len());
        pixels[..copied].copy_from_slice(&buffer[..copied]);
        if copied < buffer.len() {
            debug!("Frame buffer truncated by {} byte(s)", buffer.len() - copied);
        }

        let candidates = recognizer.locate(&bitmap);
        debug!("Found {} QR code(s)", candidates.len());

        Ok(Self {
            recognizer,
            bitmap,
            candidates,
        })
    }

    /// Number of located candidates, fixed at creation
    pub fn count(&self) -> usize {
        self.candidates.len()
    }

    /// Decode candidate `index` and strip its leading marker.
    pub fn decode(&self, index: usize) -> Result<DecodedPayload, DecodeError> {
        let candidate = self
            .candidates
            .get(index)
            .ok_or(DecodeError::IndexOutOfRange {
                index,
                count: self.candidates.len(),
            })?;

        match self.recognizer.decode(&self.bitmap, candidate) {
            Ok(raw) => Ok(DecodedPayload::from_raw(index, raw)),
            Err(reason) => {
                let err = DecodeError::Unreadable {
                    index,
                    reason: reason.to_string(),
                };
                error!("{}", err);
                Err(err)
            }
        }
    }

    pub fn bitmap(&self) -> &GrayImage {
        &self.bitmap
    }

    /// Release the bitmap and candidates.
    pub fn destroy(self) {}
}

impl<R: Recognizer> Drop for DecodeSession<'_, R> {
    fn drop(&mut self) {
        debug!(
            "Releasing decode session ({} candidate(s))",
            self.candidates.len()
        );
    }
}
