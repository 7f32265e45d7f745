//! Points and the module-grid to image perspective mapping.

/// 2D point with floating point coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn offset(&self, dx: f32, dy: f32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

/// Projective map from module coordinates to image pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct PerspectiveTransform {
    c: [f32; 8],
}

impl PerspectiveTransform {
    /// Solve the map taking each `src[i]` to `dst[i]`; `None` for degenerate input
    pub fn from_points(src: &[Point; 4], dst: &[Point; 4]) -> Option<Self> {
        let mut a = [[0.0f64; 8]; 8];
        let mut b = [0.0f64; 8];

        for i in 0..4 {
            let (sx, sy) = (src[i].x as f64, src[i].y as f64);
            let (dx, dy) = (dst[i].x as f64, dst[i].y as f64);
            let row = i * 2;
            a[row] = [sx, sy, 1.0, 0.0, 0.0, 0.0, -dx * sx, -dx * sy];
            b[row] = dx;
            a[row + 1] = [0.0, 0.0, 0.0, sx, sy, 1.0, -dy * sx, -dy * sy];
            b[row + 1] = dy;
        }

        let solution = solve_linear_system(a, b)?;
        let mut c = [0.0f32; 8];
        for (out, value) in c.iter_mut().zip(solution) {
            *out = value as f32;
        }
        Some(Self { c })
    }

    /// Map a point; collapses to the origin if the point lies on the horizon line
    pub fn transform(&self, p: &Point) -> Point {
        let c = &self.c;
        let den = c[6] * p.x + c[7] * p.y + 1.0;
        if den.abs() < 1e-10 {
            return Point::default();
        }
        Point::new(
            (c[0] * p.x + c[1] * p.y + c[2]) / den,
            (c[3] * p.x + c[4] * p.y + c[5]) / den,
        )
    }
}

/// Gaussian elimination with partial pivoting
#[allow(clippy::needless_range_loop)]
fn solve_linear_system(mut a: [[f64; 8]; 8], mut b: [f64; 8]) -> Option<[f64; 8]> {
    const N: usize = 8;

    for i in 0..N {
        let pivot = (i..N).max_by(|&r, &s| a[r][i].abs().total_cmp(&a[s][i].abs()))?;
        if a[pivot][i].abs() < 1e-12 {
            return None;
        }
        a.swap(i, pivot);
        b.swap(i, pivot);

        for k in (i + 1)..N {
            let factor = a[k][i] / a[i][i];
            b[k] -= factor * b[i];
            for j in i..N {
                a[k][j] -= factor * a[i][j];
            }
        }
    }

    let mut x = [0.0f64; N];
    for i in (0..N).rev() {
        let mut sum = b[i];
        for j in (i + 1)..N {
            sum -= a[i][j] * x[j];
        }
        x[i] = sum / a[i][i];
    }
    Some(x)
}
