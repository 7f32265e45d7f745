//! camqr - QR capture service for a grayscale camera
//!
//! Frames come from a [`camera::Camera`], pass through a
//! [`session::DecodeSession`] over a [`recognizer::Recognizer`] (by default
//! the in-crate [`engine::QrEngine`]) and are reported as text over HTTP.
//!
//! ```
//! use camqr::{DecodeSession, QrEngine, aggregate, pgm};
//!
//! let frame = pgm::parse(camqr::handlers::PRESET_IMAGE).unwrap();
//! let engine = QrEngine::new();
//! let session =
//!     DecodeSession::create(&engine, frame.buffer(), frame.width(), frame.height()).unwrap();
//! let outcome = aggregate(&session);
//! assert_eq!(outcome.decoded()[0].text(), "HELLO");
//! ```

/// Result aggregation over a session
pub mod aggregate;
/// Camera trait, frame guard and replay camera
pub mod camera;
/// Service configuration
pub mod config;
/// QR locator and decoder
pub mod engine;
/// Error types
pub mod error;
/// Per-route request pipelines and reply rendering
pub mod handlers;
/// Frames and decode results
pub mod models;
pub mod network;
/// `P5` graymap container
pub mod pgm;
pub mod recognizer;
/// HTTP routes and the serve loop
pub mod server;
/// Scoped decode sessions
pub mod session;

pub use aggregate::aggregate;
pub use camera::{Camera, FrameGuard, ReplayCamera};
pub use config::Config;
pub use engine::QrEngine;
pub use error::{AllocationError, CameraError, DecodeError, ParseError, ServerError, StreamError};
pub use handlers::{Pipeline, RetryPolicy};
pub use models::{DecodedPayload, Frame, FrameBuf, Outcome, SymbolResult};
pub use recognizer::Recognizer;
pub use session::DecodeSession;
