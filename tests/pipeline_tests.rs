//! Request pipelines and routes driven by a scripted camera and recognizer.

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use camqr::engine::{DEFAULT_PIXEL_BUDGET, allocate_bitmap};
use camqr::handlers::{NO_QR, PRESET_IMAGE};
use camqr::server::router;
use camqr::{
    AllocationError, Camera, CameraError, FrameBuf, Pipeline, QrEngine, Recognizer, ReplayCamera,
    RetryPolicy, StreamError, pgm,
};
use http_body_util::BodyExt;
use image::GrayImage;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

type Script = Result<&'static [u8], &'static str>;

fn ok(text: &'static str) -> Script {
    Ok(text.as_bytes())
}

/// Candidates are chosen by the first pixel of the frame.
struct ScriptedRecognizer {
    frames: Vec<(u8, Vec<Script>)>,
}

impl ScriptedRecognizer {
    fn new(frames: Vec<(u8, Vec<Script>)>) -> Self {
        Self { frames }
    }

    fn script(&self, tag: u8) -> &[Script] {
        self.frames
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, script)| script.as_slice())
            .unwrap_or(&[])
    }
}

impl Recognizer for ScriptedRecognizer {
    type Candidate = (u8, usize);
    type Error = &'static str;

    fn allocate(&self, width: usize, height: usize) -> Result<GrayImage, AllocationError> {
        allocate_bitmap(width, height, DEFAULT_PIXEL_BUDGET)
    }

    fn locate(&self, bitmap: &GrayImage) -> Vec<(u8, usize)> {
        let tag = bitmap.as_raw().first().copied().unwrap_or(0xFF);
        (0..self.script(tag).len()).map(|i| (tag, i)).collect()
    }

    fn decode(&self, _bitmap: &GrayImage, candidate: &(u8, usize)) -> Result<Vec<u8>, &'static str> {
        let (tag, index) = *candidate;
        self.script(tag)[index].map(<[u8]>::to_vec)
    }
}

/// Hands out frames round-robin and counts both directions.
struct ScriptedCamera {
    frames: Vec<FrameBuf>,
    acquired: AtomicUsize,
    released: AtomicUsize,
}

impl ScriptedCamera {
    fn new(frames: Vec<FrameBuf>) -> Self {
        Self {
            frames,
            acquired: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
        }
    }

    fn tagged(tags: &[u8]) -> Self {
        Self::new(
            tags.iter()
                .map(|&tag| FrameBuf::new(vec![tag; 16 * 16], 16, 16))
                .collect(),
        )
    }

    fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

impl Camera for ScriptedCamera {
    fn acquire(&self) -> Result<FrameBuf, CameraError> {
        if self.frames.is_empty() {
            return Err(CameraError::Unavailable);
        }
        let n = self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(self.frames[n % self.frames.len()].clone())
    }

    fn release(&self, _frame: FrameBuf) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

fn blank_container(width: usize, height: usize) -> &'static [u8] {
    let pixels = vec![0xE0; width * height];
    let raw = pgm::encode(&camqr::Frame::new(&pixels, width, height));
    Box::leak(raw.into_boxed_slice())
}

#[test]
fn test_preset_decodes_hello() {
    let pipeline = Pipeline::new(ScriptedCamera::tagged(&[]), QrEngine::new());
    assert_eq!(pipeline.capture_preset(), "Content from QR (i: 0): 'HELLO'");
}

#[test]
fn test_preset_without_symbol() {
    let pipeline = Pipeline::new(ScriptedCamera::tagged(&[]), QrEngine::new())
        .with_preset(blank_container(64, 48));
    assert_eq!(pipeline.capture_preset(), NO_QR);
}

#[test]
fn test_preset_unparseable() {
    let pipeline =
        Pipeline::new(ScriptedCamera::tagged(&[]), QrEngine::new()).with_preset(b"P5 12 12 255");
    assert_eq!(pipeline.capture_preset(), NO_QR);
    assert!(pipeline.export_preset().is_err());
}

#[test]
fn test_capture_reports_every_symbol() {
    let recognizer = ScriptedRecognizer::new(vec![(
        1,
        vec![ok("\u{FEFF}first"), Err("format ECC failure"), ok("\u{FEFF}third")],
    )]);
    let pipeline = Pipeline::new(ScriptedCamera::tagged(&[1]), recognizer);

    assert_eq!(
        pipeline.capture().unwrap(),
        "Content from QR (i: 0): 'first'\nContent from QR (i: 2): 'third'"
    );
    assert_eq!(pipeline.camera().released(), 1);
}

#[test]
fn test_capture_all_failed_is_not_found() {
    let recognizer = ScriptedRecognizer::new(vec![(1, vec![Err("data ECC failure")])]);
    let pipeline = Pipeline::new(ScriptedCamera::tagged(&[1]), recognizer);
    assert_eq!(pipeline.capture().unwrap(), NO_QR);
}

#[test]
fn test_capture_camera_failure() {
    let pipeline = Pipeline::new(ScriptedCamera::new(Vec::new()), QrEngine::new());
    assert_eq!(pipeline.capture(), Err(CameraError::Unavailable));
}

#[test]
fn test_allocation_failure_releases_frame() {
    let camera = ScriptedCamera::tagged(&[1]);
    let pipeline = Pipeline::new(camera, QrEngine::with_pixel_budget(100));

    assert_eq!(pipeline.capture().unwrap(), NO_QR);
    assert_eq!(pipeline.camera().acquired(), 1);
    assert_eq!(pipeline.camera().released(), 1);
}

#[test]
fn test_stream_reports_only_clean_frame() {
    let recognizer = ScriptedRecognizer::new(vec![
        (1, vec![]),
        (2, vec![ok("\u{FEFF}partial"), Err("data underflow")]),
        (3, vec![ok("\u{FEFF}x"), ok("\u{FEFF}y")]),
    ]);
    let pipeline = Pipeline::new(ScriptedCamera::tagged(&[1, 2, 3]), recognizer);

    let body = pipeline.stream(&CancellationToken::new()).unwrap();
    assert_eq!(body, "Content from QR (i: 0): 'x'\nContent from QR (i: 1): 'y'");
    assert_eq!(pipeline.camera().acquired(), 3);
    assert_eq!(pipeline.camera().released(), 3);
}

#[test]
fn test_stream_policy_exhausted() {
    let recognizer = ScriptedRecognizer::new(vec![(1, vec![Err("format ECC failure")])]);
    let pipeline = Pipeline::new(ScriptedCamera::tagged(&[1]), recognizer)
        .with_retry_policy(RetryPolicy::default().with_max_attempts(4));

    assert_eq!(
        pipeline.stream(&CancellationToken::new()),
        Err(StreamError::Exhausted { attempts: 4 })
    );
    assert_eq!(pipeline.camera().released(), 4);
}

#[test]
fn test_stream_cancelled() {
    let pipeline = Pipeline::new(ScriptedCamera::tagged(&[1]), ScriptedRecognizer::new(vec![]));
    let token = CancellationToken::new();
    token.cancel();

    assert_eq!(
        pipeline.stream(&token),
        Err(StreamError::Cancelled { attempts: 0 })
    );
    assert_eq!(pipeline.camera().acquired(), 0);
}

#[test]
fn test_stream_retries_unavailable_camera() {
    let pipeline = Pipeline::new(ScriptedCamera::new(Vec::new()), ScriptedRecognizer::new(vec![]))
        .with_retry_policy(RetryPolicy::default().with_max_attempts(3));

    assert_eq!(
        pipeline.stream(&CancellationToken::new()),
        Err(StreamError::Exhausted { attempts: 3 })
    );
}

fn closed_camera() -> ReplayCamera {
    let camera = ReplayCamera::new(vec![FrameBuf::new(vec![0xE0; 16 * 16], 16, 16)], 1);
    camera.close();
    camera
}

#[test]
fn test_stream_stops_on_closed_camera() {
    // no attempt limit: only the closed camera can end this stream
    let pipeline = Pipeline::new(closed_camera(), ScriptedRecognizer::new(vec![]));

    assert_eq!(
        pipeline.stream(&CancellationToken::new()),
        Err(StreamError::Camera(CameraError::Closed))
    );
}

#[test]
fn test_export_frame() {
    let camera = ScriptedCamera::new(vec![FrameBuf::new(vec![0x42; 320 * 240], 320, 240)]);
    let pipeline = Pipeline::new(camera, QrEngine::new());

    let export = pipeline.export_frame().unwrap();
    assert_eq!(export.header, "P5 320 240 255\n");
    assert_eq!(export.pixels.len(), 76_800);
    assert_eq!(pipeline.camera().released(), 1);
}

#[test]
fn test_export_preset_round_trips() {
    let pipeline = Pipeline::new(ScriptedCamera::tagged(&[]), QrEngine::new());
    let export = pipeline.export_preset().unwrap();

    let mut raw = export.header.clone().into_bytes();
    raw.extend_from_slice(&export.pixels);
    assert_eq!(raw, PRESET_IMAGE);
}

async fn get(app: axum::Router, uri: &str) -> (StatusCode, header::HeaderMap, Vec<u8>) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, headers, body.to_vec())
}

fn scripted_app(tags: &[u8], recognizer: ScriptedRecognizer, retry: RetryPolicy) -> axum::Router {
    let pipeline =
        Pipeline::new(ScriptedCamera::tagged(tags), recognizer).with_retry_policy(retry);
    router(Arc::new(pipeline))
}

#[tokio::test]
async fn test_route_qr() {
    let recognizer = ScriptedRecognizer::new(vec![(5, vec![ok("\u{FEFF}hi")])]);
    let app = scripted_app(&[5], recognizer, RetryPolicy::default());

    let (status, headers, body) = get(app, "/qr").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "text/plain");
    assert_eq!(body, b"Content from QR (i: 0): 'hi'");
}

#[tokio::test]
async fn test_route_qr_camera_failure() {
    let pipeline = Pipeline::new(ScriptedCamera::new(Vec::new()), QrEngine::new());
    let (status, _, _) = get(router(Arc::new(pipeline)), "/qr").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_route_preset_qr() {
    let pipeline = Pipeline::new(ScriptedCamera::tagged(&[]), QrEngine::new());
    let (status, _, body) = get(router(Arc::new(pipeline)), "/preset_qr").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"Content from QR (i: 0): 'HELLO'");
}

#[tokio::test]
async fn test_route_stream() {
    let recognizer = ScriptedRecognizer::new(vec![(1, vec![]), (2, vec![ok("\u{FEFF}ok")])]);
    let app = scripted_app(&[1, 2], recognizer, RetryPolicy::default());

    let (status, _, body) = get(app, "/qr_stream").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"Content from QR (i: 0): 'ok'");
}

#[tokio::test]
async fn test_route_stream_exhausted() {
    let app = scripted_app(
        &[1],
        ScriptedRecognizer::new(vec![]),
        RetryPolicy::default().with_max_attempts(2),
    );

    let (status, headers, body) = get(app, "/qr_stream").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(headers[header::CONTENT_TYPE], "text/plain");
    assert_eq!(body, NO_QR.as_bytes());
}

#[tokio::test]
async fn test_route_stream_closed_camera() {
    let pipeline = Pipeline::new(closed_camera(), QrEngine::new());
    let (status, headers, body) = get(router(Arc::new(pipeline)), "/qr_stream").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(headers[header::CONTENT_TYPE], "text/plain");
    assert_eq!(body, b"camera is shut down\n");
}

#[tokio::test]
async fn test_route_stream_stops_when_client_leaves() {
    // tag 1 never yields a symbol, so the stream only ends on cancellation
    let pipeline = Arc::new(Pipeline::new(
        ScriptedCamera::tagged(&[1]),
        ScriptedRecognizer::new(vec![]),
    ));
    let request = Request::builder()
        .uri("/qr_stream")
        .body(Body::empty())
        .unwrap();

    let response = router(pipeline.clone()).oneshot(request);
    assert!(
        tokio::time::timeout(Duration::from_millis(50), response)
            .await
            .is_err()
    );

    tokio::time::sleep(Duration::from_millis(50)).await;
    let settled = pipeline.camera().acquired();
    assert!(settled > 0);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(pipeline.camera().acquired(), settled);
    assert_eq!(pipeline.camera().released(), settled);
}

#[tokio::test]
async fn test_route_pgm() {
    let camera = ScriptedCamera::new(vec![FrameBuf::new(vec![0x10; 320 * 240], 320, 240)]);
    let app = router(Arc::new(Pipeline::new(camera, QrEngine::new())));

    let (status, headers, body) = get(app, "/pgm").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "image/x-portable-graymap");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"image.pgm\""
    );
    assert!(body.starts_with(b"P5 320 240 255\n"));
    assert_eq!(body.len(), "P5 320 240 255\n".len() + 76_800);
}

#[tokio::test]
async fn test_route_preset_pgm() {
    let app = router(Arc::new(Pipeline::new(ScriptedCamera::tagged(&[]), QrEngine::new())));
    let (status, _, body) = get(app, "/preset_pgm").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, PRESET_IMAGE);
}

#[tokio::test]
async fn test_unknown_route() {
    let app = router(Arc::new(Pipeline::new(ScriptedCamera::tagged(&[]), QrEngine::new())));
    let (status, _, body) = get(app, "/favicon.ico").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.is_empty());
}
