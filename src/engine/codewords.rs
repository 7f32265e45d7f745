//! Unmasking, zigzag codeword read and block de-interleaving.

use super::function_mask::FunctionMask;
use super::matrix::BitMatrix;
use super::reed_solomon;
use super::tables::{BlockLayout, EcLevel, block_layout};
use super::ScanError;

/// Whether data mask `mask` inverts the module at column `x`, row `y`
pub fn mask_applies(mask: u8, x: usize, y: usize) -> bool {
    match mask {
        0 => (x + y) % 2 == 0,
        1 => y % 2 == 0,
        2 => x % 3 == 0,
        3 => (x + y) % 3 == 0,
        4 => (y / 2 + x / 3) % 2 == 0,
        5 => (x * y) % 2 + (x * y) % 3 == 0,
        6 => ((x * y) % 2 + (x * y) % 3) % 2 == 0,
        _ => ((x + y) % 2 + (x * y) % 3) % 2 == 0,
    }
}

/// Read the data codewords in placement order, removing the mask on the fly
pub fn read_codewords(grid: &BitMatrix, functions: &FunctionMask, mask: u8) -> Vec<u8> {
    let size = grid.width();
    let mut codewords = Vec::with_capacity(size * size / 8);
    let mut current = 0u8;
    let mut bits = 0;

    let mut upward = true;
    let mut right = size as isize - 1;
    while right > 0 {
        if right == 6 {
            right -= 1;
        }
        for step in 0..size {
            let y = if upward { size - 1 - step } else { step };
            for x in [right as usize, right as usize - 1] {
                if functions.is_function(x, y) {
                    continue;
                }
                let dark = grid.get(x, y) ^ mask_applies(mask, x, y);
                current = (current << 1) | dark as u8;
                bits += 1;
                if bits == 8 {
                    codewords.push(current);
                    current = 0;
                    bits = 0;
                }
            }
        }
        upward = !upward;
        right -= 2;
    }

    codewords
}

/// Split interleaved codewords into blocks, correct each one and concatenate
/// the data portions.
pub fn correct_blocks(
    codewords: &[u8],
    version: u8,
    level: EcLevel,
) -> Result<Vec<u8>, ScanError> {
    let BlockLayout {
        num_blocks,
        ecc_per_block,
    } = block_layout(version, level).ok_or(ScanError::InvalidVersion)?;

    let ecc_total = num_blocks * ecc_per_block;
    if codewords.len() <= ecc_total {
        return Err(ScanError::InvalidGridSize);
    }
    let data_total = codewords.len() - ecc_total;
    let short_len = data_total / num_blocks;
    let long_blocks = data_total % num_blocks;
    let short_blocks = num_blocks - long_blocks;

    let data_len = |block: usize| short_len + usize::from(block >= short_blocks);
    let mut blocks: Vec<Vec<u8>> = (0..num_blocks)
        .map(|b| Vec::with_capacity(data_len(b) + ecc_per_block))
        .collect();

    let mut source = codewords.iter().copied();
    for i in 0..=short_len {
        for (b, block) in blocks.iter_mut().enumerate() {
            if i < data_len(b) {
                block.extend(source.next());
            }
        }
    }
    for _ in 0..ecc_per_block {
        for block in blocks.iter_mut() {
            block.extend(source.next());
        }
    }

    let mut data = Vec::with_capacity(data_total);
    for (b, block) in blocks.iter_mut().enumerate() {
        reed_solomon::correct(block, ecc_per_block).map_err(|_| ScanError::DataEcc)?;
        data.extend_from_slice(&block[..data_len(b)]);
    }
    Ok(data)
}
