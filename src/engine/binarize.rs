//! Global Otsu and local-mean thresholding.

use image::GrayImage;
use rayon::prelude::*;
use std::fmt;
use std::sync::Arc;

const HISTOGRAM_CHUNK: usize = 16 * 1024;

/// Side of the square window averaged by the local threshold, in pixels
pub const ADAPTIVE_WINDOW: usize = 31;

/// A pixel must sit this far (percent) below its window mean to read dark
const LOCAL_BIAS_PERCENT: u64 = 5;

/// Dark/light decision for a pixel value at a position.
#[derive(Debug, Clone, PartialEq)]
pub enum Threshold {
    /// One cut for the whole frame
    Global(u8),
    /// Compared against the mean of a window around each pixel
    Local(Arc<LocalMean>),
}

impl Threshold {
    /// Otsu cut over every pixel of `bitmap`
    pub fn otsu(bitmap: &GrayImage) -> Self {
        Self::Global(otsu_threshold(bitmap.as_raw()))
    }

    /// Local mean over an [`ADAPTIVE_WINDOW`]-pixel window
    pub fn local(bitmap: &GrayImage) -> Self {
        Self::Local(Arc::new(LocalMean::new(bitmap, ADAPTIVE_WINDOW)))
    }

    pub fn is_dark(&self, x: i64, y: i64, value: u8) -> bool {
        match self {
            Self::Global(threshold) => value < *threshold,
            Self::Local(mean) => mean.is_dark(x, y, value),
        }
    }
}

/// Integral image answering window sums in constant time.
#[derive(PartialEq)]
pub struct LocalMean {
    width: usize,
    height: usize,
    radius: usize,
    // (width + 1) x (height + 1), zero first row and column
    integral: Vec<u64>,
}

impl LocalMean {
    pub fn new(bitmap: &GrayImage, window: usize) -> Self {
        let width = bitmap.width() as usize;
        let height = bitmap.height() as usize;
        let stride = width + 1;
        let mut integral = vec![0u64; stride * (height + 1)];

        if width > 0 && height > 0 {
            integral[stride..]
                .par_chunks_mut(stride)
                .zip(bitmap.as_raw().par_chunks(width))
                .for_each(|(out_row, in_row)| {
                    let mut sum = 0u64;
                    for (out, &value) in out_row[1..].iter_mut().zip(in_row) {
                        sum += u64::from(value);
                        *out = sum;
                    }
                });
            for y in 1..height {
                let (above, below) = integral.split_at_mut((y + 1) * stride);
                let previous = &above[y * stride..];
                for (cell, &up) in below[..stride].iter_mut().zip(previous) {
                    *cell += up;
                }
            }
        }

        Self {
            width,
            height,
            radius: window / 2,
            integral,
        }
    }

    /// Positions outside the bitmap use the nearest edge pixel's window
    pub fn is_dark(&self, x: i64, y: i64, value: u8) -> bool {
        if self.width == 0 || self.height == 0 {
            return false;
        }
        let x = x.clamp(0, self.width as i64 - 1) as usize;
        let y = y.clamp(0, self.height as i64 - 1) as usize;
        let (x0, x1) = (x.saturating_sub(self.radius), (x + self.radius + 1).min(self.width));
        let (y0, y1) = (y.saturating_sub(self.radius), (y + self.radius + 1).min(self.height));

        let stride = self.width + 1;
        let at = |x: usize, y: usize| self.integral[y * stride + x];
        let sum = at(x1, y1) + at(x0, y0) - at(x1, y0) - at(x0, y1);
        let area = ((x1 - x0) * (y1 - y0)) as u64;

        u64::from(value) * area * 100 < sum * (100 - LOCAL_BIAS_PERCENT)
    }
}

impl fmt::Debug for LocalMean {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalMean")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("window", &(self.radius * 2 + 1))
            .finish()
    }
}

/// Row-major dark/light map of a bitmap, one byte per pixel.
pub struct BinaryImage {
    width: usize,
    height: usize,
    dark: Vec<bool>,
}

impl BinaryImage {
    /// Classify every pixel of `bitmap` with `threshold`
    pub fn from_gray(bitmap: &GrayImage, threshold: &Threshold) -> Self {
        let width = bitmap.width() as usize;
        let height = bitmap.height() as usize;
        let mut dark = vec![false; width * height];

        if width > 0 {
            dark.par_chunks_mut(width)
                .zip(bitmap.as_raw().par_chunks(width))
                .enumerate()
                .for_each(|(y, (out_row, in_row))| {
                    for (x, (out, &value)) in out_row.iter_mut().zip(in_row).enumerate() {
                        *out = threshold.is_dark(x as i64, y as i64, value);
                    }
                });
        }

        Self {
            width,
            height,
            dark,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Out of range reads as light
    pub fn is_dark(&self, x: usize, y: usize) -> bool {
        x < self.width && y < self.height && self.dark[y * self.width + x]
    }

    /// Signed variant used when probing around a predicted point
    pub fn is_dark_at(&self, x: isize, y: isize) -> bool {
        x >= 0 && y >= 0 && self.is_dark(x as usize, y as usize)
    }

    pub fn row(&self, y: usize) -> &[bool] {
        &self.dark[y * self.width..(y + 1) * self.width]
    }
}

/// Otsu's optimal threshold for the whole bitmap.
///
/// When several thresholds separate the classes equally well (e.g. a
/// two-level image) the middle of that range is returned.
pub fn otsu_threshold(pixels: &[u8]) -> u8 {
    let histogram = pixels
        .par_chunks(HISTOGRAM_CHUNK)
        .fold(
            || [0u64; 256],
            |mut hist, chunk| {
                for &value in chunk {
                    hist[value as usize] += 1;
                }
                hist
            },
        )
        .reduce(
            || [0u64; 256],
            |mut a, b| {
                for (x, y) in a.iter_mut().zip(b) {
                    *x += y;
                }
                a
            },
        );

    let total: u64 = histogram.iter().sum();
    if total == 0 {
        return 128;
    }
    let total_sum: f64 = histogram
        .iter()
        .enumerate()
        .map(|(value, &count)| value as f64 * count as f64)
        .sum();

    let mut below_count = 0u64;
    let mut below_sum = 0.0f64;
    let mut best_variance = -1.0f64;
    let mut best_first = 128usize;
    let mut best_last = 128usize;

    // Threshold t puts values < t in the dark class
    for t in 1..256usize {
        below_count += histogram[t - 1];
        below_sum += (t - 1) as f64 * histogram[t - 1] as f64;
        let above_count = total - below_count;
        if below_count == 0 || above_count == 0 {
            continue;
        }

        let mean_below = below_sum / below_count as f64;
        let mean_above = (total_sum - below_sum) / above_count as f64;
        let variance =
            below_count as f64 * above_count as f64 * (mean_below - mean_above).powi(2);

        if variance > best_variance * (1.0 + 1e-9) {
            best_variance = variance;
            best_first = t;
            best_last = t;
        } else if (variance - best_variance).abs() <= best_variance * 1e-9 {
            best_last = t;
        }
    }

    ((best_first + best_last) / 2) as u8
}
