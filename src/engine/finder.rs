//! Finder pattern search: 1:1:3:1:1 run scan per row, confirmed by vertical
//! and horizontal cross-checks through the candidate center.

use super::binarize::BinaryImage;
use super::geometry::Point;
use rayon::prelude::*;

/// Center of a confirmed finder pattern
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FinderPattern {
    pub center: Point,
    pub module_size: f32,
    /// Number of scan rows that confirmed this pattern
    pub hits: usize,
}

/// Find every finder pattern in the image, in row-major discovery order.
pub fn find_patterns(binary: &BinaryImage) -> Vec<FinderPattern> {
    let raw: Vec<FinderPattern> = (0..binary.height())
        .into_par_iter()
        .flat_map_iter(|y| scan_row(binary, y))
        .collect();
    merge(raw)
}

fn scan_row(binary: &BinaryImage, y: usize) -> Vec<FinderPattern> {
    let row = binary.row(y);
    let mut found = Vec::new();
    if row.is_empty() {
        return found;
    }

    // (dark, start, len)
    let mut runs: Vec<(bool, usize, usize)> = Vec::new();
    let mut start = 0;
    for x in 1..=row.len() {
        if x == row.len() || row[x] != row[start] {
            runs.push((row[start], start, x - start));
            start = x;
        }
    }

    for window in runs.windows(5) {
        if !window[0].0 {
            continue;
        }
        let counts = [
            window[0].2,
            window[1].2,
            window[2].2,
            window[3].2,
            window[4].2,
        ];
        if !ratio_ok(&counts) {
            continue;
        }
        let (_, center_start, center_len) = window[2];
        let total: usize = counts.iter().sum();
        let cx = center_start + center_len / 2;

        if let Some(pattern) = confirm(binary, cx, y, center_len, total) {
            found.push(pattern);
        }
    }

    found
}

fn confirm(
    binary: &BinaryImage,
    cx: usize,
    y: usize,
    max_count: usize,
    horizontal_total: usize,
) -> Option<FinderPattern> {
    let (v_counts, cy) = cross_check(binary, cx, y, Axis::Vertical, max_count)?;
    let v_total: usize = v_counts.iter().sum();
    if 5 * v_total.abs_diff(horizontal_total) >= 2 * horizontal_total {
        return None;
    }

    let (h_counts, cx) = cross_check(binary, cx, cy.round() as usize, Axis::Horizontal, max_count)?;
    let h_total: usize = h_counts.iter().sum();
    if 5 * h_total.abs_diff(horizontal_total) >= 2 * horizontal_total {
        return None;
    }

    Some(FinderPattern {
        center: Point::new(cx, cy),
        module_size: (h_total + v_total) as f32 / 14.0,
        hits: 1,
    })
}

#[derive(Clone, Copy)]
enum Axis {
    Horizontal,
    Vertical,
}

/// Measure the five runs through (x, y) along `axis`. Returns the counts and
/// the pattern center on that axis.
fn cross_check(
    binary: &BinaryImage,
    x: usize,
    y: usize,
    axis: Axis,
    max_count: usize,
) -> Option<([usize; 5], f32)> {
    let (origin, limit) = match axis {
        Axis::Horizontal => (x as isize, binary.width() as isize),
        Axis::Vertical => (y as isize, binary.height() as isize),
    };
    let dark = |t: isize| match axis {
        Axis::Horizontal => binary.is_dark_at(t, y as isize),
        Axis::Vertical => binary.is_dark_at(x as isize, t),
    };

    let mut counts = [0usize; 5];
    if !dark(origin) {
        return None;
    }

    let mut t = origin;
    while t >= 0 && dark(t) {
        counts[2] += 1;
        t -= 1;
    }
    while t >= 0 && !dark(t) && counts[1] <= max_count {
        counts[1] += 1;
        t -= 1;
    }
    if t < 0 || counts[1] > max_count {
        return None;
    }
    while t >= 0 && dark(t) && counts[0] <= max_count {
        counts[0] += 1;
        t -= 1;
    }
    if counts[0] > max_count {
        return None;
    }

    let mut t = origin + 1;
    while t < limit && dark(t) {
        counts[2] += 1;
        t += 1;
    }
    while t < limit && !dark(t) && counts[3] <= max_count {
        counts[3] += 1;
        t += 1;
    }
    if t >= limit || counts[3] > max_count {
        return None;
    }
    while t < limit && dark(t) && counts[4] <= max_count {
        counts[4] += 1;
        t += 1;
    }
    if counts[4] > max_count || !ratio_ok(&counts) {
        return None;
    }

    let center = t as f32 - counts[4] as f32 - counts[3] as f32 - counts[2] as f32 / 2.0;
    Some((counts, center))
}

/// Each run within half a module of 1:1:3:1:1
fn ratio_ok(counts: &[usize; 5]) -> bool {
    let total: usize = counts.iter().sum();
    if total < 7 || counts.contains(&0) {
        return false;
    }
    let module = total as f32 / 7.0;
    let tolerance = module / 2.0;

    let near = |count: usize, modules: f32| {
        (count as f32 - module * modules).abs() < tolerance * modules
    };
    near(counts[0], 1.0)
        && near(counts[1], 1.0)
        && near(counts[2], 3.0)
        && near(counts[3], 1.0)
        && near(counts[4], 1.0)
}

/// Fold repeated detections of the same pattern into one, weighting by hits
fn merge(candidates: Vec<FinderPattern>) -> Vec<FinderPattern> {
    let mut merged: Vec<FinderPattern> = Vec::new();

    for candidate in candidates {
        let existing = merged.iter_mut().find(|p| {
            let reach = p.module_size.max(candidate.module_size);
            (p.center.x - candidate.center.x).abs() <= reach
                && (p.center.y - candidate.center.y).abs() <= reach
                && (p.module_size - candidate.module_size).abs() <= reach.max(1.0)
        });

        match existing {
            Some(p) => {
                let n = p.hits as f32;
                let total = n + 1.0;
                p.center = Point::new(
                    (p.center.x * n + candidate.center.x) / total,
                    (p.center.y * n + candidate.center.y) / total,
                );
                p.module_size = (p.module_size * n + candidate.module_size) / total;
                p.hits += 1;
            }
            None => merged.push(candidate),
        }
    }

    merged
}
