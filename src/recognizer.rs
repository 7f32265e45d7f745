//! The locate/decode seam between a decode session and a QR engine.

use crate::error::AllocationError;
use image::GrayImage;
use std::fmt::Display;

/// A QR recognizer: allocates a working bitmap, locates symbols in it and
/// decodes one located symbol at a time.
///
/// Implementations must be shareable across request threads; per-frame state
/// lives in the bitmap and candidates, never in the recognizer.
pub trait Recognizer: Send + Sync {
    /// Geometry of one located symbol
    type Candidate: Send;
    /// Per-symbol failure; its `Display` text becomes the logged reason
    type Error: Display;

    /// Allocate a `width` x `height` bitmap initialised to white.
    fn allocate(&self, width: usize, height: usize) -> Result<GrayImage, AllocationError>;

    /// Find candidate symbols. The order is stable for a given bitmap.
    fn locate(&self, bitmap: &GrayImage) -> Vec<Self::Candidate>;

    /// Decode one candidate to its raw payload bytes.
    fn decode(&self, bitmap: &GrayImage, candidate: &Self::Candidate)
        -> Result<Vec<u8>, Self::Error>;
}
