//! Built-in QR engine: Otsu or local-mean binarization, finder-triple
//! location, perspective sampling, format/version reading, Reed-Solomon
//! correction and segment decoding.

mod binarize;
mod codewords;
mod finder;
mod format;
mod function_mask;
mod geometry;
mod grid;
mod locate;
mod matrix;
mod reed_solomon;
mod segments;
mod tables;

pub use geometry::Point;
pub use locate::Candidate;
pub use matrix::BitMatrix;
pub use tables::EcLevel;

use crate::error::AllocationError;
use crate::recognizer::Recognizer;
use binarize::Threshold;
use function_mask::FunctionMask;
use image::GrayImage;
use log::trace;
use thiserror::Error;

/// Default ceiling on working bitmap size, in pixels
pub const DEFAULT_PIXEL_BUDGET: usize = 16 * 1024 * 1024;

/// Why a located symbol could not be decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ScanError {
    #[error("Invalid grid size")]
    InvalidGridSize,
    #[error("Invalid version")]
    InvalidVersion,
    #[error("Format data ECC failure")]
    FormatEcc,
    #[error("ECC failure")]
    DataEcc,
    #[error("Unknown data type")]
    UnknownDataType,
    #[error("Data overflow")]
    DataOverflow,
    #[error("Data underflow")]
    DataUnderflow,
    #[error("Invalid segment data")]
    InvalidSegment,
}

/// The default recognizer.
#[derive(Debug, Clone)]
pub struct QrEngine {
    pixel_budget: usize,
}

impl QrEngine {
    pub fn new() -> Self {
        Self {
            pixel_budget: DEFAULT_PIXEL_BUDGET,
        }
    }

    /// Engine refusing bitmaps larger than `pixel_budget` pixels
    pub fn with_pixel_budget(pixel_budget: usize) -> Self {
        Self { pixel_budget }
    }

    pub fn pixel_budget(&self) -> usize {
        self.pixel_budget
    }
}

impl Default for QrEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Recognizer for QrEngine {
    type Candidate = Candidate;
    type Error = ScanError;

    fn allocate(&self, width: usize, height: usize) -> Result<GrayImage, AllocationError> {
        allocate_bitmap(width, height, self.pixel_budget)
    }

    fn locate(&self, bitmap: &GrayImage) -> Vec<Candidate> {
        locate::locate(bitmap)
    }

    fn decode(&self, bitmap: &GrayImage, candidate: &Candidate) -> Result<Vec<u8>, ScanError> {
        let first = decode_candidate(bitmap, candidate.clone());
        if first.is_ok() || !matches!(candidate.threshold, Threshold::Global(_)) {
            return first;
        }

        // unevenly lit symbols can locate under Otsu yet sample wrong
        trace!("resampling against local mean");
        let local = Candidate {
            threshold: Threshold::local(bitmap),
            ..candidate.clone()
        };
        decode_candidate(bitmap, local).or(first)
    }
}

fn decode_candidate(bitmap: &GrayImage, mut candidate: Candidate) -> Result<Vec<u8>, ScanError> {
    // large symbols carry their version explicitly; trust it over the estimate
    if candidate.version >= 7 {
        let grid = sample(bitmap, &candidate);
        if let Some(version) = format::read_version(&grid) {
            if version != candidate.version {
                trace!("version {} read, {} estimated", version, candidate.version);
                candidate = locate::refit(bitmap, &candidate, version)
                    .ok_or(ScanError::InvalidGridSize)?;
            }
        }
    }

    let grid = sample(bitmap, &candidate);
    match decode_grid(&grid, candidate.version) {
        Ok(payload) => Ok(payload),
        // mirrored symbols read back transposed
        Err(first) => decode_grid(&grid.transposed(), candidate.version).map_err(|_| first),
    }
}

fn sample(bitmap: &GrayImage, candidate: &Candidate) -> BitMatrix {
    grid::sample(
        bitmap,
        &candidate.transform,
        tables::dimension(candidate.version),
        &candidate.threshold,
        candidate.module_size,
    )
}

/// Decode a sampled module grid of the given version.
pub fn decode_grid(grid: &BitMatrix, version: u8) -> Result<Vec<u8>, ScanError> {
    if !(1..=40).contains(&version) {
        return Err(ScanError::InvalidVersion);
    }
    let functions = FunctionMask::new(version);
    let size = functions.size();
    if grid.width() != size || grid.height() != size {
        return Err(ScanError::InvalidGridSize);
    }

    let info = format::read_format(grid).ok_or(ScanError::FormatEcc)?;
    trace!("format: level {:?}, mask {}", info.level, info.mask);

    let raw = codewords::read_codewords(grid, &functions, info.mask);
    let data = codewords::correct_blocks(&raw, version, info.level)?;
    segments::decode(&data, version)
}

/// Allocate a white `width` x `height` bitmap, refusing anything whose size
/// overflows, exceeds `pixel_budget` or is declined by the allocator.
pub fn allocate_bitmap(
    width: usize,
    height: usize,
    pixel_budget: usize,
) -> Result<GrayImage, AllocationError> {
    let out_of_memory = AllocationError::OutOfMemory { width, height };

    let pixels = width.checked_mul(height).ok_or(out_of_memory.clone())?;
    if pixels > pixel_budget {
        return Err(out_of_memory);
    }
    let w = u32::try_from(width).map_err(|_| out_of_memory.clone())?;
    let h = u32::try_from(height).map_err(|_| out_of_memory.clone())?;

    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(pixels)
        .map_err(|_| out_of_memory.clone())?;
    buffer.resize(pixels, 0xFF);
    GrayImage::from_raw(w, h, buffer).ok_or(out_of_memory)
}
