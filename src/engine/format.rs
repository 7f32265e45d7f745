//! Format and version information.

use super::matrix::BitMatrix;
use super::tables::{EcLevel, FORMAT_WORDS, VERSION_WORDS};

/// Both BCH codes correct up to three bit errors.
const MAX_BIT_ERRORS: u32 = 3;

/// Level and mask read from the format area
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatInfo {
    pub level: EcLevel,
    pub mask: u8,
}

// Module coordinates as (x, y), most significant bit first. Negative values
// count from the far edge.
const FORMAT_MAIN: [(i32, i32); 15] = [
    (0, 8),
    (1, 8),
    (2, 8),
    (3, 8),
    (4, 8),
    (5, 8),
    (7, 8),
    (8, 8),
    (8, 7),
    (8, 5),
    (8, 4),
    (8, 3),
    (8, 2),
    (8, 1),
    (8, 0),
];

const FORMAT_SIDE: [(i32, i32); 15] = [
    (8, -1),
    (8, -2),
    (8, -3),
    (8, -4),
    (8, -5),
    (8, -6),
    (8, -7),
    (-8, 8),
    (-7, 8),
    (-6, 8),
    (-5, 8),
    (-4, 8),
    (-3, 8),
    (-2, 8),
    (-1, 8),
];

/// Read the format area, preferring whichever copy is closer to a valid word
pub fn read_format(grid: &BitMatrix) -> Option<FormatInfo> {
    [&FORMAT_MAIN, &FORMAT_SIDE]
        .into_iter()
        .filter_map(|coords| {
            let word = read_word(grid, coords) as u16;
            nearest(word as u32, FORMAT_WORDS.iter().map(|&w| w as u32))
        })
        .min_by_key(|&(_, distance)| distance)
        .map(|(index, _)| {
            let data = index as u16;
            FormatInfo {
                level: EcLevel::from_format_bits(data >> 3),
                mask: (data & 0x07) as u8,
            }
        })
}

/// Version from the two 6x3 version blocks; `None` when neither copy is readable
pub fn read_version(grid: &BitMatrix) -> Option<u8> {
    let mut bottom_left = Vec::with_capacity(18);
    let mut top_right = Vec::with_capacity(18);
    for major in (0..6).rev() {
        for minor in (9..12).map(|m| -m) {
            bottom_left.push((major, minor));
            top_right.push((minor, major));
        }
    }

    [bottom_left, top_right]
        .iter()
        .filter_map(|coords| nearest(read_word(grid, coords), VERSION_WORDS.iter().copied()))
        .min_by_key(|&(_, distance)| distance)
        .map(|(index, _)| index as u8 + 7)
}

fn read_word(grid: &BitMatrix, coords: &[(i32, i32)]) -> u32 {
    let size = grid.width() as i32;
    coords.iter().fold(0u32, |word, &(x, y)| {
        let x = if x < 0 { size + x } else { x };
        let y = if y < 0 { size + y } else { y };
        (word << 1) | grid.get(x as usize, y as usize) as u32
    })
}

/// Index and Hamming distance of the closest valid word within correction range
fn nearest(word: u32, valid: impl Iterator<Item = u32>) -> Option<(usize, u32)> {
    valid
        .map(|candidate| (word ^ candidate).count_ones())
        .enumerate()
        .min_by_key(|&(_, distance)| distance)
        .filter(|&(_, distance)| distance <= MAX_BIT_ERRORS)
}
