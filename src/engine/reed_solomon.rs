//! Reed-Solomon correction over GF(256) with primitive polynomial
//! x^8 + x^4 + x^3 + x^2 + 1. Codewords are most significant coefficient
//! first and the generator has roots alpha^0 .. alpha^(n-1).

const PRIMITIVE: u16 = 0x11d;

const fn build_tables() -> ([u8; 512], [u8; 256]) {
    let mut exp = [0u8; 512];
    let mut log = [0u8; 256];
    let mut x: u16 = 1;
    let mut i = 0;
    while i < 255 {
        exp[i] = x as u8;
        log[x as usize] = i as u8;
        x <<= 1;
        if x & 0x100 != 0 {
            x ^= PRIMITIVE;
        }
        i += 1;
    }
    while i < 512 {
        exp[i] = exp[i - 255];
        i += 1;
    }
    (exp, log)
}

const TABLES: ([u8; 512], [u8; 256]) = build_tables();
static EXP: [u8; 512] = TABLES.0;
static LOG: [u8; 256] = TABLES.1;

fn mul(a: u8, b: u8) -> u8 {
    if a == 0 || b == 0 {
        return 0;
    }
    EXP[LOG[a as usize] as usize + LOG[b as usize] as usize]
}

fn div(a: u8, b: u8) -> u8 {
    debug_assert!(b != 0);
    if a == 0 {
        return 0;
    }
    EXP[LOG[a as usize] as usize + 255 - LOG[b as usize] as usize]
}

/// alpha^e for any non-negative exponent
fn alpha_pow(e: usize) -> u8 {
    EXP[e % 255]
}

/// Evaluate a polynomial stored lowest coefficient first
fn eval_ascending(poly: &[u8], x: u8) -> u8 {
    poly.iter().rev().fold(0, |acc, &c| mul(acc, x) ^ c)
}

/// Uncorrectable block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Uncorrectable;

/// Correct `block` (data followed by `ecc_len` check bytes) in place and
/// return the number of corrected bytes.
pub fn correct(block: &mut [u8], ecc_len: usize) -> Result<usize, Uncorrectable> {
    let n = block.len();
    if ecc_len == 0 || ecc_len >= n || n > 255 {
        return Err(Uncorrectable);
    }

    let syndromes: Vec<u8> = (0..ecc_len)
        .map(|j| {
            let x = alpha_pow(j);
            block.iter().fold(0, |acc, &c| mul(acc, x) ^ c)
        })
        .collect();
    if syndromes.iter().all(|&s| s == 0) {
        return Ok(0);
    }

    let locator = berlekamp_massey(&syndromes);
    let errors = locator.len() - 1;
    if errors == 0 || 2 * errors > ecc_len {
        return Err(Uncorrectable);
    }

    // Chien search: X_k = alpha^(n-1-pos) is a root of locator(X_k^-1)
    let positions: Vec<usize> = (0..n)
        .filter(|&pos| {
            let power = n - 1 - pos;
            eval_ascending(&locator, alpha_pow(255 - power % 255)) == 0
        })
        .collect();
    if positions.len() != errors {
        return Err(Uncorrectable);
    }

    // Forney: omega = S(x) * locator(x) mod x^ecc_len
    let mut omega = vec![0u8; ecc_len];
    for (i, slot) in omega.iter_mut().enumerate() {
        for j in 0..=i.min(locator.len() - 1) {
            *slot ^= mul(locator[j], syndromes[i - j]);
        }
    }
    let derivative: Vec<u8> = locator
        .iter()
        .enumerate()
        .skip(1)
        .map(|(i, &c)| if i % 2 == 1 { c } else { 0 })
        .collect();

    for &pos in &positions {
        let power = n - 1 - pos;
        let x = alpha_pow(power);
        let x_inv = alpha_pow(255 - power % 255);
        let denominator = eval_ascending(&derivative, x_inv);
        if denominator == 0 {
            return Err(Uncorrectable);
        }
        let magnitude = mul(x, div(eval_ascending(&omega, x_inv), denominator));
        block[pos] ^= magnitude;
    }

    let clean = (0..ecc_len).all(|j| {
        let x = alpha_pow(j);
        block.iter().fold(0, |acc, &c| mul(acc, x) ^ c) == 0
    });
    if clean {
        Ok(errors)
    } else {
        Err(Uncorrectable)
    }
}

/// Error locator polynomial, lowest coefficient first
fn berlekamp_massey(syndromes: &[u8]) -> Vec<u8> {
    let mut current = vec![1u8];
    let mut previous = vec![1u8];
    let mut length = 0usize;
    let mut shift = 1usize;
    let mut last_discrepancy = 1u8;

    for n in 0..syndromes.len() {
        let mut discrepancy = syndromes[n];
        for i in 1..=length.min(current.len() - 1) {
            discrepancy ^= mul(current[i], syndromes[n - i]);
        }

        if discrepancy == 0 {
            shift += 1;
            continue;
        }

        let scale = div(discrepancy, last_discrepancy);
        let snapshot = current.clone();
        if current.len() < previous.len() + shift {
            current.resize(previous.len() + shift, 0);
        }
        for (i, &c) in previous.iter().enumerate() {
            current[i + shift] ^= mul(scale, c);
        }

        if 2 * length <= n {
            length = n + 1 - length;
            previous = snapshot;
            last_discrepancy = discrepancy;
            shift = 1;
        } else {
            shift += 1;
        }
    }

    current.truncate(length + 1);
    current
}
