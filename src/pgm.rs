//! Binary grayscale (`P5`) container: `"P5 <width> <height> <maxval>\n"` followed by
//! raw 8-bit intensities.

use crate::error::ParseError;
use crate::models::Frame;

const MAGIC: &str = "P5";
const EXPORT_MAXVAL: u8 = 255;

/// Parse a container held entirely in `raw`.
///
/// The pixel slice starts one byte past the first newline and runs to the end of
/// `raw`. Its length is not checked against `width * height`; callers receive
/// exactly what the container holds.
pub fn parse(raw: &[u8]) -> Result<Frame<'_>, ParseError> {
    let newline = raw
        .iter()
        .position(|&b| b == b'\n')
        .ok_or(ParseError::MalformedHeader)?;
    let (width, height) = parse_header(&raw[..newline])?;
    Ok(Frame::new(&raw[newline + 1..], width, height))
}

fn parse_header(header: &[u8]) -> Result<(usize, usize), ParseError> {
    let header = std::str::from_utf8(header).map_err(|_| ParseError::MalformedHeader)?;
    let rest = header
        .strip_prefix(MAGIC)
        .ok_or(ParseError::MalformedHeader)?;

    // maxval is never needed; 8-bit samples are assumed
    let mut fields = rest.split_ascii_whitespace();
    let mut dimension = || -> Result<usize, ParseError> {
        fields
            .next()
            .and_then(|field| field.parse::<usize>().ok())
            .filter(|&value| value > 0)
            .ok_or(ParseError::MalformedHeader)
    };
    let width = dimension()?;
    let height = dimension()?;
    Ok((width, height))
}

/// Export header for a frame of the given size.
pub fn header(width: usize, height: usize) -> String {
    format!("{MAGIC} {width} {height} {EXPORT_MAXVAL}\n")
}

/// Serialize a frame as header plus pixels.
pub fn encode(frame: &Frame<'_>) -> Vec<u8> {
    let header = header(frame.width(), frame.height());
    let mut out = Vec::with_capacity(header.len() + frame.len());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(frame.buffer());
    out
}
