//! Module sampling through a fitted perspective transform.

use super::binarize::Threshold;
use super::geometry::{PerspectiveTransform, Point};
use super::matrix::BitMatrix;
use image::GrayImage;

/// Read a `dim` x `dim` module grid. Module centers are mapped through
/// `transform` and classified with `threshold` at that position; points
/// outside the image read as light.
pub fn sample(
    bitmap: &GrayImage,
    transform: &PerspectiveTransform,
    dim: usize,
    threshold: &Threshold,
    module_size: f32,
) -> BitMatrix {
    let mut grid = BitMatrix::new(dim, dim);
    let averaged = module_size >= 3.0;

    for y in 0..dim {
        for x in 0..dim {
            let center = transform.transform(&Point::new(x as f32 + 0.5, y as f32 + 0.5));
            let (px, py) = (center.x.floor() as i64, center.y.floor() as i64);
            let level = if averaged {
                average_at(bitmap, px, py)
            } else {
                pixel_at(bitmap, px, py)
            };
            if level.is_some_and(|v| threshold.is_dark(px, py, v)) {
                grid.set(x, y, true);
            }
        }
    }

    grid
}

pub fn pixel_at(bitmap: &GrayImage, x: i64, y: i64) -> Option<u8> {
    if x < 0 || y < 0 || x >= bitmap.width() as i64 || y >= bitmap.height() as i64 {
        return None;
    }
    Some(bitmap.get_pixel(x as u32, y as u32).0[0])
}

/// Mean of the 3x3 neighbourhood, counting only in-bounds pixels
fn average_at(bitmap: &GrayImage, cx: i64, cy: i64) -> Option<u8> {
    let (sum, count) = (-1..=1)
        .flat_map(|dy| (-1..=1).map(move |dx| (cx + dx, cy + dy)))
        .filter_map(|(x, y)| pixel_at(bitmap, x, y))
        .fold((0u32, 0u32), |(sum, count), v| (sum + v as u32, count + 1));
    (count > 0).then(|| (sum / count) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn identity_scaled(unit: f32, dim: usize) -> PerspectiveTransform {
        let d = dim as f32;
        PerspectiveTransform::from_points(
            &[
                Point::new(0.0, 0.0),
                Point::new(d, 0.0),
                Point::new(0.0, d),
                Point::new(d, d),
            ],
            &[
                Point::new(0.0, 0.0),
                Point::new(d * unit, 0.0),
                Point::new(0.0, d * unit),
                Point::new(d * unit, d * unit),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_checkerboard_sampling() {
        let unit = 4u32;
        let dim = 5usize;
        let img = GrayImage::from_fn(dim as u32 * unit, dim as u32 * unit, |x, y| {
            if (x / unit + y / unit) % 2 == 0 {
                Luma([10])
            } else {
                Luma([240])
            }
        });

        let transform = identity_scaled(unit as f32, dim);
        let grid = sample(&img, &transform, dim, &Threshold::Global(128), unit as f32);
        for y in 0..dim {
            for x in 0..dim {
                assert_eq!(grid.get(x, y), (x + y) % 2 == 0, "({x}, {y})");
            }
        }
    }

    #[test]
    fn test_outside_reads_light() {
        let img = GrayImage::from_pixel(4, 4, Luma([0]));
        let grid = sample(&img, &identity_scaled(2.0, 4), 4, &Threshold::Global(128), 1.0);
        assert!(grid.get(0, 0));
        assert!(grid.get(1, 1));
        assert!(!grid.get(2, 2));
        assert!(!grid.get(3, 0));
    }

    #[test]
    fn test_sampling_against_local_mean() {
        // dark modules on the right are brighter than light modules on the left
        let unit = 6u32;
        let dim = 8usize;
        let img = GrayImage::from_fn(dim as u32 * unit, dim as u32 * unit, |x, y| {
            let background = 60 + x * 4;
            if (x / unit + y / unit) % 2 == 0 {
                Luma([(background * 35 / 100) as u8])
            } else {
                Luma([background as u8])
            }
        });

        let transform = identity_scaled(unit as f32, dim);
        let grid = sample(&img, &transform, dim, &Threshold::local(&img), unit as f32);
        for y in 0..dim {
            for x in 0..dim {
                assert_eq!(grid.get(x, y), (x + y) % 2 == 0, "({x}, {y})");
            }
        }
    }
}
