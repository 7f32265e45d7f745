use super::matrix::BitMatrix;
use super::tables::{alignment_positions, dimension};

/// Modules reserved for function patterns (finders, separators, timing,
/// alignment, format and version areas) of one version.
pub struct FunctionMask {
    mask: BitMatrix,
}

impl FunctionMask {
    pub fn new(version: u8) -> Self {
        let size = dimension(version);
        let mut mask = BitMatrix::new(size, size);

        // finders, separators and both format copies (dark module included)
        fill(&mut mask, 0, 0, 9, 9);
        fill(&mut mask, size - 8, 0, 8, 9);
        fill(&mut mask, 0, size - 8, 9, 8);

        for i in 0..size {
            mask.set(6, i, true);
            mask.set(i, 6, true);
        }

        let align = alignment_positions(version);
        for &cx in &align {
            for &cy in &align {
                let near_finder = (cx <= 8 && cy <= 8)
                    || (cx >= size - 9 && cy <= 8)
                    || (cx <= 8 && cy >= size - 9);
                if !near_finder {
                    fill(&mut mask, cx - 2, cy - 2, 5, 5);
                }
            }
        }

        if version >= 7 {
            fill(&mut mask, size - 11, 0, 3, 6);
            fill(&mut mask, 0, size - 11, 6, 3);
        }

        Self { mask }
    }

    pub fn size(&self) -> usize {
        self.mask.width()
    }

    pub fn is_function(&self, x: usize, y: usize) -> bool {
        self.mask.get(x, y)
    }
}

fn fill(mask: &mut BitMatrix, x: usize, y: usize, width: usize, height: usize) {
    for yy in y..y + height {
        for xx in x..x + width {
            mask.set(xx, yy, true);
        }
    }
}
