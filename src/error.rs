//! Error types shared across the capture pipeline.

use thiserror::Error;

/// The image container could not be understood.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Missing newline, wrong magic, or fewer than two usable dimensions.
    #[error("malformed image container header")]
    MalformedHeader,
}

/// The recognizer could not allocate its working bitmap.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocationError {
    /// Raised for arithmetic overflow, allocator refusal or an exceeded pixel budget.
    #[error("unable to allocate a {width}x{height} bitmap")]
    OutOfMemory { width: usize, height: usize },
}

/// A single located symbol could not be turned into a payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("QR decode failed: {reason}")]
    Unreadable { index: usize, reason: String },
    #[error("candidate {index} out of range, session holds {count}")]
    IndexOutOfRange { index: usize, count: usize },
}

impl DecodeError {
    /// Candidate index the failure belongs to.
    pub fn index(&self) -> usize {
        match self {
            DecodeError::Unreadable { index, .. } | DecodeError::IndexOutOfRange { index, .. } => {
                *index
            }
        }
    }
}

/// The camera could not hand out a frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CameraError {
    #[error("camera has no frame available")]
    Unavailable,
    #[error("camera is shut down")]
    Closed,
    #[error("stored frame is unreadable: {0}")]
    Parse(#[from] ParseError),
}

impl CameraError {
    /// No later `acquire` can succeed
    pub fn is_permanent(&self) -> bool {
        matches!(self, CameraError::Closed)
    }
}

/// Why the retry-until-found loop stopped without a clean frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("stream cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },
    #[error("no frame decoded cleanly within {attempts} attempt(s)")]
    Exhausted { attempts: u32 },
    #[error("stream stopped: {0}")]
    Camera(#[from] CameraError),
}

/// Fatal errors of the HTTP front end.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("server stopped: {0}")]
    Serve(#[from] std::io::Error),
}
