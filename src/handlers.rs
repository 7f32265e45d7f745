//! Request pipelines behind each route: capture, decode, aggregate and
//! render the reply. Everything here is synchronous; the server runs each
//! call on a blocking worker.

use crate::aggregate::aggregate;
use crate::camera::{Camera, FrameGuard};
use crate::error::{CameraError, ParseError, StreamError};
use crate::models::{DecodedPayload, Frame, Outcome};
use crate::pgm;
use crate::recognizer::Recognizer;
use crate::session::DecodeSession;
use log::{debug, info, warn};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Reply when no symbol could be read.
pub const NO_QR: &str = "Failed to locate QR\n";

/// Reference image compiled into the binary
pub static PRESET_IMAGE: &[u8] = include_bytes!("../assets/image.pgm");

/// Bounds for the retry-until-found loop. The default retries forever.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: Option<u32>,
    pub deadline: Option<Duration>,
}

impl RetryPolicy {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    fn allows(&self, attempts: u32, started: Instant) -> bool {
        let under_cap = self.max_attempts.is_none_or(|max| attempts < max);
        let in_time = self.deadline.is_none_or(|limit| started.elapsed() < limit);
        under_cap && in_time
    }
}

/// A frame export: header and pixels, sent as two chunks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Export {
    pub header: String,
    pub pixels: Vec<u8>,
}

impl Export {
    fn of(frame: Frame<'_>) -> Self {
        Self {
            header: pgm::header(frame.width(), frame.height()),
            pixels: frame.buffer().to_vec(),
        }
    }

    pub fn len(&self) -> usize {
        self.header.len() + self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The camera, the recognizer, the embedded reference image and the stream
/// retry policy, shared by every request.
pub struct Pipeline<C, R> {
    camera: C,
    recognizer: R,
    preset: &'static [u8],
    retry: RetryPolicy,
}

impl<C: Camera, R: Recognizer> Pipeline<C, R> {
    pub fn new(camera: C, recognizer: R) -> Self {
        Self {
            camera,
            recognizer,
            preset: PRESET_IMAGE,
            retry: RetryPolicy::default(),
        }
    }

    /// Use a different reference image for the preset routes.
    pub fn with_preset(mut self, preset: &'static [u8]) -> Self {
        self.preset = preset;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn camera(&self) -> &C {
        &self.camera
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// `/qr`: decode one camera frame.
    pub fn capture(&self) -> Result<String, CameraError> {
        let outcome = self.capture_outcome()?;
        Ok(render(&outcome))
    }

    /// `/preset_qr`: decode the embedded reference image.
    pub fn capture_preset(&self) -> String {
        match pgm::parse(self.preset) {
            Ok(frame) => render(&self.decode_frame(frame)),
            Err(err) => {
                warn!("Reference image unreadable: {}", err);
                NO_QR.to_string()
            }
        }
    }

    /// `/qr_stream`: pull frames until one decodes completely.
    ///
    /// Frames with no symbols or with any failed symbol are discarded, as are
    /// transient camera errors; a closed camera ends the stream. The token is
    /// checked once per frame.
    pub fn stream(&self, cancel: &CancellationToken) -> Result<String, StreamError> {
        let started = Instant::now();
        let mut attempts = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(StreamError::Cancelled { attempts });
            }
            if !self.retry.allows(attempts, started) {
                return Err(StreamError::Exhausted { attempts });
            }
            attempts += 1;
            info!("Attempting to read QR from frame no. {}", attempts);

            match self.capture_outcome() {
                Ok(Outcome::AllDecoded(payloads)) => return Ok(render_lines(&payloads)),
                Ok(Outcome::NoSymbolsLocated) => debug!("Failed to locate QR. Continuing"),
                Ok(Outcome::PartiallyFailed { failures, .. }) => {
                    debug!("{} symbol(s) unreadable. Continuing", failures)
                }
                Err(err) if err.is_permanent() => return Err(err.into()),
                Err(err) => debug!("Capture failed: {}. Continuing", err),
            }
        }
    }

    /// `/pgm`: export the current camera frame.
    pub fn export_frame(&self) -> Result<Export, CameraError> {
        let guard = FrameGuard::acquire(&self.camera)?;
        let export = Export::of(guard.frame());
        guard.release();
        Ok(export)
    }

    /// `/preset_pgm`: export the embedded reference image.
    pub fn export_preset(&self) -> Result<Export, ParseError> {
        pgm::parse(self.preset).map(Export::of)
    }

    /// One camera frame through a session. The frame goes back to the camera
    /// as soon as its pixels are in the session bitmap.
    fn capture_outcome(&self) -> Result<Outcome, CameraError> {
        let guard = FrameGuard::acquire(&self.camera)?;
        let frame = guard.frame();
        let session =
            DecodeSession::create(&self.recognizer, frame.buffer(), frame.width(), frame.height());
        guard.release();

        Ok(match session {
            Ok(session) => aggregate(&session),
            Err(_) => Outcome::NoSymbolsLocated,
        })
    }

    fn decode_frame(&self, frame: Frame<'_>) -> Outcome {
        match DecodeSession::create(&self.recognizer, frame.buffer(), frame.width(), frame.height())
        {
            Ok(session) => aggregate(&session),
            Err(_) => Outcome::NoSymbolsLocated,
        }
    }
}

/// One line per decoded symbol, or [`NO_QR`] when none decoded.
pub fn render(outcome: &Outcome) -> String {
    match outcome.decoded() {
        [] => NO_QR.to_string(),
        payloads => render_lines(payloads),
    }
}

fn render_lines(payloads: &[DecodedPayload]) -> String {
    payloads
        .iter()
        .map(format_line)
        .collect::<Vec<_>>()
        .join("\n")
}

/// `Content from QR (i: <index>): '<content>'`
pub fn format_line(payload: &DecodedPayload) -> String {
    format!(
        "Content from QR (i: {}): '{}'",
        payload.source_index(),
        payload.text()
    )
}
