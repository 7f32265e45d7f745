//! Symbol location: group finder patterns into triples, estimate the version
//! and fit a module-to-pixel transform checked against the timing patterns.

use super::binarize::{BinaryImage, Threshold};
use super::finder::{FinderPattern, find_patterns};
use super::geometry::{PerspectiveTransform, Point};
use super::grid::pixel_at;
use super::tables::dimension;
use image::GrayImage;
use log::trace;

/// Patterns beyond this many (by confirmation count) are ignored
const MAX_FINDERS: usize = 64;
const MAX_CORNER_COS: f32 = 0.2;
const MAX_LEG_RATIO: f32 = 1.4;
const MAX_SIZE_RATIO: f32 = 1.5;
const MIN_TIMING_SCORE: f32 = 0.75;
const MAX_ALIGNMENT_MISMATCH: usize = 3;
/// Frames this wide or tall try the local threshold before Otsu
const LOCAL_FIRST_SIDE: u32 = 800;

/// A located symbol, ready for grid sampling
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub(crate) transform: PerspectiveTransform,
    pub(crate) version: u8,
    pub(crate) threshold: Threshold,
    pub(crate) module_size: f32,
    pub(crate) top_left: Point,
    pub(crate) top_right: Point,
    pub(crate) bottom_left: Point,
}

impl Candidate {
    /// Version estimated from the finder geometry
    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn module_size(&self) -> f32 {
        self.module_size
    }

    /// Image position of the symbol center
    pub fn center(&self) -> Point {
        let half = dimension(self.version) as f32 / 2.0;
        self.transform.transform(&Point::new(half, half))
    }

    /// Finder centers: top-left, top-right, bottom-left
    pub fn corners(&self) -> [Point; 3] {
        [self.top_left, self.top_right, self.bottom_left]
    }
}

/// A scored finder triple, oriented as (top-left, top-right, bottom-left)
struct Triple {
    indices: [usize; 3],
    corners: [FinderPattern; 3],
    version: u8,
    score: f32,
}

/// Locate every symbol in `bitmap`, ordered by center (top to bottom, then
/// left to right).
///
/// Large frames are binarized against a local mean first and small ones with
/// Otsu; when the first pass locates nothing the other one is tried.
pub fn locate(bitmap: &GrayImage) -> Vec<Candidate> {
    let (width, height) = bitmap.dimensions();
    let passes: [fn(&GrayImage) -> Threshold; 2] =
        if width >= LOCAL_FIRST_SIDE || height >= LOCAL_FIRST_SIDE {
            [Threshold::local, Threshold::otsu]
        } else {
            [Threshold::otsu, Threshold::local]
        };

    for pass in passes {
        let candidates = locate_with(bitmap, pass(bitmap));
        if !candidates.is_empty() {
            return candidates;
        }
    }
    Vec::new()
}

fn locate_with(bitmap: &GrayImage, threshold: Threshold) -> Vec<Candidate> {
    let binary = BinaryImage::from_gray(bitmap, &threshold);

    let mut patterns = find_patterns(&binary);
    if patterns.len() > MAX_FINDERS {
        patterns.sort_by(|a, b| b.hits.cmp(&a.hits));
        patterns.truncate(MAX_FINDERS);
    }
    trace!("{} finder pattern(s), {:?}", patterns.len(), threshold);

    let mut triples = Vec::new();
    for i in 0..patterns.len() {
        for j in (i + 1)..patterns.len() {
            for k in (j + 1)..patterns.len() {
                if let Some(triple) = score_triple(&patterns, [i, j, k]) {
                    triples.push(triple);
                }
            }
        }
    }
    triples.sort_by(|a, b| a.score.total_cmp(&b.score));

    let mut used = vec![false; patterns.len()];
    let mut candidates = Vec::new();
    for triple in &triples {
        if triple.indices.iter().any(|&i| used[i]) {
            continue;
        }
        let [tl, tr, bl] = triple.corners;
        let module_size = (tl.module_size + tr.module_size + bl.module_size) / 3.0;
        let estimate = triple.version;

        let best = [estimate, estimate.saturating_sub(1), estimate + 1]
            .into_iter()
            .filter(|v| (1..=40).contains(v))
            .filter_map(|version| {
                fit(
                    bitmap,
                    &threshold,
                    [tl.center, tr.center, bl.center],
                    module_size,
                    version,
                )
            })
            .max_by(|a, b| a.1.total_cmp(&b.1));

        if let Some((candidate, _)) = best {
            for &i in &triple.indices {
                used[i] = true;
            }
            candidates.push(candidate);
        }
    }

    candidates.sort_by(|a, b| {
        let (ca, cb) = (a.center(), b.center());
        ca.y.total_cmp(&cb.y).then(ca.x.total_cmp(&cb.x))
    });
    candidates
}

/// Rebuild a candidate's transform for a different version, keeping its
/// finder positions.
pub fn refit(bitmap: &GrayImage, candidate: &Candidate, version: u8) -> Option<Candidate> {
    fit(
        bitmap,
        &candidate.threshold,
        candidate.corners(),
        candidate.module_size,
        version,
    )
    .map(|(candidate, _)| candidate)
}

fn score_triple(patterns: &[FinderPattern], indices: [usize; 3]) -> Option<Triple> {
    let [a, b, c] = indices.map(|i| patterns[i]);

    let sizes = [a.module_size, b.module_size, c.module_size];
    let largest = sizes.iter().copied().fold(f32::MIN, f32::max);
    let smallest = sizes.iter().copied().fold(f32::MAX, f32::min);
    if smallest <= 0.0 || largest / smallest > MAX_SIZE_RATIO {
        return None;
    }

    // corner is the pattern whose legs are closest to perpendicular
    let (cos, corner, p1, p2) = [(a, b, c, 0), (b, a, c, 1), (c, a, b, 2)]
        .into_iter()
        .map(|(corner, p1, p2, slot)| {
            let v1 = (p1.center.x - corner.center.x, p1.center.y - corner.center.y);
            let v2 = (p2.center.x - corner.center.x, p2.center.y - corner.center.y);
            let len = (v1.0.hypot(v1.1)) * (v2.0.hypot(v2.1));
            let cos = if len > 0.0 {
                ((v1.0 * v2.0 + v1.1 * v2.1) / len).abs()
            } else {
                1.0
            };
            (cos, slot, p1, p2)
        })
        .min_by(|x, y| x.0.total_cmp(&y.0))?;
    if cos >= MAX_CORNER_COS {
        return None;
    }
    let tl = [a, b, c][corner];

    let leg1 = tl.center.distance(&p1.center);
    let leg2 = tl.center.distance(&p2.center);
    let leg_ratio = leg1.max(leg2) / leg1.min(leg2);
    if !leg_ratio.is_finite() || leg_ratio > MAX_LEG_RATIO {
        return None;
    }

    // y grows downward, so a positive cross product puts p1 to the right
    let cross = (p1.center.x - tl.center.x) * (p2.center.y - tl.center.y)
        - (p1.center.y - tl.center.y) * (p2.center.x - tl.center.x);
    let (tr, bl) = if cross > 0.0 { (p1, p2) } else { (p2, p1) };

    let module_size = sizes.iter().sum::<f32>() / 3.0;
    let dim = (leg1 + leg2) / 2.0 / module_size + 7.0;
    let version = ((dim - 17.0) / 4.0).round();
    if !(1.0..=40.0).contains(&version) {
        return None;
    }

    Some(Triple {
        indices: match corner {
            0 => indices,
            1 => [indices[1], indices[0], indices[2]],
            _ => [indices[2], indices[0], indices[1]],
        },
        corners: [tl, tr, bl],
        version: version as u8,
        score: cos + (leg_ratio - 1.0) + (largest / smallest - 1.0),
    })
}

/// Fit a transform for `version` and return it with its timing score.
fn fit(
    bitmap: &GrayImage,
    threshold: &Threshold,
    [tl, tr, bl]: [Point; 3],
    module_size: f32,
    version: u8,
) -> Option<(Candidate, f32)> {
    let dim = dimension(version) as f32;
    let src = [
        Point::new(3.5, 3.5),
        Point::new(dim - 3.5, 3.5),
        Point::new(3.5, dim - 3.5),
        Point::new(dim - 3.5, dim - 3.5),
    ];
    let br = Point::new(tr.x + bl.x - tl.x, tr.y + bl.y - tl.y);
    let initial = PerspectiveTransform::from_points(&src, &[tl, tr, bl, br])?;

    let dark = |p: Point| {
        let (x, y) = (p.x.floor() as i64, p.y.floor() as i64);
        pixel_at(bitmap, x, y).is_some_and(|v| threshold.is_dark(x, y, v))
    };

    let mut best = (timing_score(&initial, dim as usize, &dark), initial);
    if version >= 2 {
        if let Some(refined) = refine_with_alignment(&best.1, dim, module_size, &dark) {
            let score = timing_score(&refined, dim as usize, &dark);
            if score >= best.0 {
                best = (score, refined);
            }
        }
    }

    let (score, transform) = best;
    trace!("version {version} fit, timing score {score:.2}");
    if score < MIN_TIMING_SCORE {
        return None;
    }

    Some((
        Candidate {
            transform,
            version,
            threshold: threshold.clone(),
            module_size,
            top_left: tl,
            top_right: tr,
            bottom_left: bl,
        },
        score,
    ))
}

/// Fraction of timing modules on row 6 and column 6 that alternate as expected
fn timing_score(
    transform: &PerspectiveTransform,
    dim: usize,
    dark: &impl Fn(Point) -> bool,
) -> f32 {
    if dim < 17 {
        return 0.0;
    }
    let mut matched = 0;
    let mut total = 0;
    for i in 8..dim - 8 {
        let expected = i % 2 == 0;
        let along_row = transform.transform(&Point::new(i as f32 + 0.5, 6.5));
        let along_col = transform.transform(&Point::new(6.5, i as f32 + 0.5));
        matched += usize::from(dark(along_row) == expected);
        matched += usize::from(dark(along_col) == expected);
        total += 2;
    }
    if total == 0 {
        return 0.0;
    }
    matched as f32 / total as f32
}

/// Search around the predicted bottom-right alignment pattern and re-anchor
/// the fourth corner of the transform on it.
fn refine_with_alignment(
    transform: &PerspectiveTransform,
    dim: f32,
    module_size: f32,
    dark: &impl Fn(Point) -> bool,
) -> Option<PerspectiveTransform> {
    let anchor = Point::new(dim - 6.5, dim - 6.5);
    let samples: Vec<(Point, bool)> = (-2i32..=2)
        .flat_map(|j| (-2i32..=2).map(move |i| (i, j)))
        .map(|(i, j)| {
            let point = transform.transform(&anchor.offset(i as f32, j as f32));
            let expected = i.abs() == 2 || j.abs() == 2 || (i == 0 && j == 0);
            (point, expected)
        })
        .collect();

    let radius = (module_size * 4.0).ceil() as i32;
    let mut best = usize::MAX;
    let mut ties: Vec<(i32, i32)> = Vec::new();
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let mismatch = samples
                .iter()
                .filter(|(p, expected)| dark(p.offset(dx as f32, dy as f32)) != *expected)
                .count();
            if mismatch < best {
                best = mismatch;
                ties.clear();
            }
            if mismatch == best {
                ties.push((dx, dy));
            }
        }
    }
    if best > MAX_ALIGNMENT_MISMATCH || ties.is_empty() {
        return None;
    }

    let n = ties.len() as f32;
    let (sx, sy) = ties
        .iter()
        .fold((0.0, 0.0), |(sx, sy), &(dx, dy)| (sx + dx as f32, sy + dy as f32));
    let found = transform.transform(&anchor).offset(sx / n, sy / n);

    let src = [
        Point::new(3.5, 3.5),
        Point::new(dim - 3.5, 3.5),
        Point::new(3.5, dim - 3.5),
        anchor,
    ];
    let dst = [
        transform.transform(&src[0]),
        transform.transform(&src[1]),
        transform.transform(&src[2]),
        found,
    ];
    PerspectiveTransform::from_points(&src, &dst)
}
