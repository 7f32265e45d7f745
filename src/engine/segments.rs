//! Data segment decoding: numeric, alphanumeric, byte, kanji and ECI.

use super::ScanError;
use encoding_rs::SHIFT_JIS;

/// Upper bound on decoded output
pub const MAX_PAYLOAD: usize = 8896;

const ALPHANUMERIC: &[u8; 45] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ $%*+-./:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Numeric,
    Alphanumeric,
    Byte,
    Kanji,
}

impl Mode {
    fn count_bits(self, version: u8) -> usize {
        let band = match version {
            0..=9 => 0,
            10..=26 => 1,
            _ => 2,
        };
        match self {
            Mode::Numeric => [10, 12, 14][band],
            Mode::Alphanumeric => [9, 11, 13][band],
            Mode::Byte => [8, 16, 16][band],
            Mode::Kanji => [8, 10, 12][band],
        }
    }
}

struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() * 8 - self.pos
    }

    fn read(&mut self, count: usize) -> Result<u32, ScanError> {
        if count > self.remaining() {
            return Err(ScanError::DataUnderflow);
        }
        let mut value = 0u32;
        for _ in 0..count {
            let bit = (self.data[self.pos / 8] >> (7 - self.pos % 8)) & 1;
            value = (value << 1) | bit as u32;
            self.pos += 1;
        }
        Ok(value)
    }
}

/// Decode the corrected data codewords of a symbol into payload bytes.
pub fn decode(data: &[u8], version: u8) -> Result<Vec<u8>, ScanError> {
    let mut reader = BitReader::new(data);
    let mut out = Vec::new();

    while reader.remaining() >= 4 {
        let mode = match reader.read(4)? {
            0b0000 => break,
            0b0001 => Mode::Numeric,
            0b0010 => Mode::Alphanumeric,
            0b0100 => Mode::Byte,
            0b1000 => Mode::Kanji,
            0b0111 => {
                read_eci(&mut reader)?;
                continue;
            }
            // structured append header: sequence, total, parity
            0b0011 => {
                reader.read(16)?;
                continue;
            }
            0b0101 => continue,
            0b1001 => {
                reader.read(8)?;
                continue;
            }
            _ => return Err(ScanError::UnknownDataType),
        };

        let count = reader.read(mode.count_bits(version))? as usize;
        match mode {
            Mode::Numeric => numeric(&mut reader, count, &mut out)?,
            Mode::Alphanumeric => alphanumeric(&mut reader, count, &mut out)?,
            Mode::Byte => {
                for _ in 0..count {
                    out.push(reader.read(8)? as u8);
                }
            }
            Mode::Kanji => kanji(&mut reader, count, &mut out)?,
        }

        if out.len() > MAX_PAYLOAD {
            return Err(ScanError::DataOverflow);
        }
    }

    Ok(out)
}

/// ECI designators are consumed; payload bytes are passed through untouched.
fn read_eci(reader: &mut BitReader<'_>) -> Result<u32, ScanError> {
    let first = reader.read(8)?;
    if first & 0x80 == 0 {
        Ok(first)
    } else if first & 0xC0 == 0x80 {
        Ok(((first & 0x3F) << 8) | reader.read(8)?)
    } else if first & 0xE0 == 0xC0 {
        Ok(((first & 0x1F) << 16) | reader.read(16)?)
    } else {
        Err(ScanError::UnknownDataType)
    }
}

fn numeric(reader: &mut BitReader<'_>, count: usize, out: &mut Vec<u8>) -> Result<(), ScanError> {
    let mut left = count;
    while left > 0 {
        let (digits, bits, limit) = match left {
            1 => (1, 4, 10),
            2 => (2, 7, 100),
            _ => (3, 10, 1000),
        };
        let value = reader.read(bits)?;
        if value >= limit {
            return Err(ScanError::InvalidSegment);
        }
        let text = format!("{value:0digits$}");
        out.extend_from_slice(text.as_bytes());
        left -= digits;
    }
    Ok(())
}

fn alphanumeric(
    reader: &mut BitReader<'_>,
    count: usize,
    out: &mut Vec<u8>,
) -> Result<(), ScanError> {
    let mut left = count;
    while left >= 2 {
        let value = reader.read(11)? as usize;
        if value >= 45 * 45 {
            return Err(ScanError::InvalidSegment);
        }
        out.push(ALPHANUMERIC[value / 45]);
        out.push(ALPHANUMERIC[value % 45]);
        left -= 2;
    }
    if left == 1 {
        let value = reader.read(6)? as usize;
        let &ch = ALPHANUMERIC.get(value).ok_or(ScanError::InvalidSegment)?;
        out.push(ch);
    }
    Ok(())
}

/// Kanji arrive as 13-bit compacted Shift JIS and are emitted as UTF-8.
fn kanji(reader: &mut BitReader<'_>, count: usize, out: &mut Vec<u8>) -> Result<(), ScanError> {
    let mut sjis = Vec::with_capacity(count * 2);
    for _ in 0..count {
        let value = reader.read(13)?;
        let packed = ((value / 0xC0) << 8) | (value % 0xC0);
        let code = if packed < 0x1F00 {
            packed + 0x8140
        } else {
            packed + 0xC140
        };
        sjis.push((code >> 8) as u8);
        sjis.push((code & 0xFF) as u8);
    }
    let (text, _, _) = SHIFT_JIS.decode(&sjis);
    out.extend_from_slice(text.as_bytes());
    Ok(())
}
