//! End-to-end engine checks on symbols rendered by the `qrcode` crate.

use camqr::handlers::PRESET_IMAGE;
use camqr::{DecodeSession, Outcome, QrEngine, Recognizer, aggregate, pgm};
use image::GrayImage;
use qrcode::{Color, EcLevel, QrCode, Version};
use test_case::test_case;

const DARK: u8 = 0x18;
const LIGHT: u8 = 0xE8;

/// Draw `code` into a row-major canvas of `width` pixels with its top-left
/// module at (`ox`, `oy`).
fn paint(canvas: &mut [u8], width: usize, code: &QrCode, scale: usize, ox: usize, oy: usize) {
    let modules = code.width();
    let colors = code.to_colors();
    for (i, color) in colors.iter().enumerate() {
        if *color != Color::Dark {
            continue;
        }
        let (mx, my) = (i % modules, i / modules);
        for dy in 0..scale {
            let row = (oy + my * scale + dy) * width;
            let start = row + ox + mx * scale;
            canvas[start..start + scale].fill(DARK);
        }
    }
}

/// A single symbol with a four-module quiet zone.
fn render(code: &QrCode, scale: usize) -> GrayImage {
    let side = (code.width() + 8) * scale;
    let mut canvas = vec![LIGHT; side * side];
    paint(&mut canvas, side, code, scale, 4 * scale, 4 * scale);
    GrayImage::from_raw(side as u32, side as u32, canvas).unwrap()
}

/// `render` under light that ramps from `dimmest` on the left edge to 250 on
/// the right; dark modules reflect 35% of the light falling on them.
fn render_lit(code: &QrCode, scale: usize, dimmest: u32) -> GrayImage {
    let flat = render(code, scale);
    let (w, h) = flat.dimensions();
    GrayImage::from_fn(w, h, |x, y| {
        let light = dimmest + (250 - dimmest) * x / (w - 1);
        let value = if flat.get_pixel(x, y).0[0] == DARK {
            light * 35 / 100
        } else {
            light
        };
        image::Luma([value as u8])
    })
}

fn decode_each(bitmap: &GrayImage) -> Vec<Vec<u8>> {
    let engine = QrEngine::new();
    engine
        .locate(bitmap)
        .iter()
        .map(|candidate| engine.decode(bitmap, candidate).unwrap())
        .collect()
}

#[test_case(EcLevel::L ; "level L")]
#[test_case(EcLevel::M ; "level M")]
#[test_case(EcLevel::Q ; "level Q")]
#[test_case(EcLevel::H ; "level H")]
fn test_error_correction_levels(level: EcLevel) {
    let code = QrCode::with_version(b"camqr", Version::Normal(1), level).unwrap();
    assert_eq!(decode_each(&render(&code, 4)), vec![b"camqr".to_vec()]);
}

#[test_case(2, 3, "https://example.com/a" ; "version 2 small modules")]
#[test_case(4, 4, "https://example.com/camera/frames?id=0042" ; "version 4 two blocks")]
#[test_case(5, 4, "https://example.com/camera/frames?id=0042" ; "version 5 uneven blocks")]
#[test_case(7, 4, "https://example.com/camera/frames?id=0042" ; "version 7 version info")]
fn test_versions(version: i16, scale: usize, payload: &str) {
    let level = if version == 5 { EcLevel::Q } else { EcLevel::M };
    let code = QrCode::with_version(payload, Version::Normal(version), level).unwrap();
    assert_eq!(decode_each(&render(&code, scale)), vec![payload.as_bytes().to_vec()]);
}

#[test]
fn test_numeric_and_alphanumeric_segments() {
    let numeric = QrCode::new(b"31415926535897932384").unwrap();
    assert_eq!(
        decode_each(&render(&numeric, 4)),
        vec![b"31415926535897932384".to_vec()]
    );

    let alnum = QrCode::new(b"CAMQR/FRAME 17").unwrap();
    assert_eq!(decode_each(&render(&alnum, 4)), vec![b"CAMQR/FRAME 17".to_vec()]);
}

#[test]
fn test_mirrored_symbol() {
    let code = QrCode::new(b"MIRROR").unwrap();
    let bitmap = render(&code, 4);
    let (w, h) = bitmap.dimensions();
    let mirrored = GrayImage::from_fn(w, h, |x, y| *bitmap.get_pixel(w - 1 - x, y));
    assert_eq!(decode_each(&mirrored), vec![b"MIRROR".to_vec()]);
}

#[test]
fn test_two_symbols_in_reading_order() {
    let (width, height) = (320, 240);
    let mut canvas = vec![LIGHT; width * height];
    let upper = QrCode::new(b"\xEF\xBB\xBFupper").unwrap();
    let lower = QrCode::new(b"\xEF\xBB\xBFlower").unwrap();
    paint(&mut canvas, width, &lower, 4, 200, 130);
    paint(&mut canvas, width, &upper, 4, 24, 20);

    let engine = QrEngine::new();
    let session = DecodeSession::create(&engine, &canvas, width, height).unwrap();
    assert_eq!(session.count(), 2);

    match aggregate(&session) {
        Outcome::AllDecoded(payloads) => {
            let texts: Vec<_> = payloads.iter().map(|p| p.text().into_owned()).collect();
            assert_eq!(texts, ["upper", "lower"]);
        }
        other => panic!("expected both symbols, got {other:?}"),
    }
}

#[test_case(120 ; "mild ramp")]
#[test_case(80 ; "strong ramp")]
#[test_case(50 ; "steep ramp")]
fn test_unevenly_lit_symbol(dimmest: u32) {
    let code = QrCode::new(b"\xEF\xBB\xBFHELLO").unwrap();
    let bitmap = render_lit(&code, 4, dimmest);
    let (w, h) = bitmap.dimensions();

    let engine = QrEngine::new();
    let session = DecodeSession::create(&engine, bitmap.as_raw(), w as usize, h as usize).unwrap();
    assert_eq!(session.count(), 1);
    assert_eq!(session.decode(0).unwrap().text(), "HELLO");
}

#[test]
fn test_blank_frame_has_no_candidates() {
    let engine = QrEngine::new();
    let canvas = vec![LIGHT; 320 * 240];
    let session = DecodeSession::create(&engine, &canvas, 320, 240).unwrap();
    assert_eq!(session.count(), 0);
    assert_eq!(aggregate(&session), Outcome::NoSymbolsLocated);
}

#[test]
fn test_reference_image() {
    let frame = pgm::parse(PRESET_IMAGE).unwrap();
    let engine = QrEngine::new();
    let session =
        DecodeSession::create(&engine, frame.buffer(), frame.width(), frame.height()).unwrap();

    assert_eq!(session.count(), 1);
    let payload = session.decode(0).unwrap();
    assert_eq!(payload.leading_marker_len(), 3);
    assert_eq!(payload.text(), "HELLO");
}
