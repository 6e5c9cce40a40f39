//! Remote status codes and the transient-error classifier
//!
//! Every remote call attempt ends in a [`CallOutcome`]. The classifier decides
//! whether a failed attempt is worth retrying, means the object is gone, or
//! has to be surfaced to the caller.

use crate::codec::{EnumCodec, Vocabulary};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Status vocabulary shared by every control-plane call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCode {
    Ok,
    NotFound,
    InvalidArgument,
    PermissionDenied,
    Unauthenticated,
    ResourceExhausted,
    Unavailable,
    DeadlineExceeded,
    Internal,
}

impl Vocabulary for StatusCode {
    const NAME: &'static str = "status code";
    const VARIANTS: &'static [Self] = &[
        StatusCode::Ok,
        StatusCode::NotFound,
        StatusCode::InvalidArgument,
        StatusCode::PermissionDenied,
        StatusCode::Unauthenticated,
        StatusCode::ResourceExhausted,
        StatusCode::Unavailable,
        StatusCode::DeadlineExceeded,
        StatusCode::Internal,
    ];

    fn wire_name(self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::NotFound => "NOT_FOUND",
            StatusCode::InvalidArgument => "INVALID_ARGUMENT",
            StatusCode::PermissionDenied => "PERMISSION_DENIED",
            StatusCode::Unauthenticated => "UNAUTHENTICATED",
            StatusCode::ResourceExhausted => "RESOURCE_EXHAUSTED",
            StatusCode::Unavailable => "UNAVAILABLE",
            StatusCode::DeadlineExceeded => "DEADLINE_EXCEEDED",
            StatusCode::Internal => "INTERNAL",
        }
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Failure reported by the remote control plane
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct RemoteError {
    pub code: StatusCode,
    pub message: String,
}

impl RemoteError {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NotFound, message)
    }

    /// Build from a textual status as transports receive it. Unknown names
    /// map to `Internal` so the original text is kept in the message.
    pub fn from_wire(codec: &EnumCodec<StatusCode>, code: &str, message: &str) -> Self {
        match codec.decode(code) {
            Some(code) => Self::new(code, message),
            None => Self::new(StatusCode::Internal, format!("{code}: {message}")),
        }
    }
}

/// Why a fatal outcome is fatal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FatalCause {
    /// The caller's credentials were rejected
    Credentials,
    /// The request itself was malformed; the rendered request is kept
    InvalidArgument { request: String },
    /// Anything else the remote side refused
    Other,
}

/// Result of one remote call attempt
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome<T> {
    Success(T),
    Retryable {
        code: StatusCode,
        message: String,
    },
    Fatal {
        code: StatusCode,
        cause: FatalCause,
        message: String,
    },
    NotFound,
}

impl<T> CallOutcome<T> {
    pub fn is_retryable(&self) -> bool {
        matches!(self, CallOutcome::Retryable { .. })
    }
}

/// Classify a finished attempt. `request` renders the outgoing request and is
/// only evaluated for `InvalidArgument`.
pub fn classify<T>(
    result: Result<T, RemoteError>,
    request: impl FnOnce() -> String,
) -> CallOutcome<T> {
    let err = match result {
        Ok(value) => return CallOutcome::Success(value),
        Err(err) => err,
    };

    match err.code {
        StatusCode::Unavailable | StatusCode::DeadlineExceeded | StatusCode::ResourceExhausted => {
            CallOutcome::Retryable {
                code: err.code,
                message: err.message,
            }
        }
        StatusCode::PermissionDenied | StatusCode::Unauthenticated => CallOutcome::Fatal {
            code: err.code,
            cause: FatalCause::Credentials,
            message: err.message,
        },
        StatusCode::InvalidArgument => CallOutcome::Fatal {
            code: err.code,
            cause: FatalCause::InvalidArgument { request: request() },
            message: err.message,
        },
        StatusCode::NotFound => CallOutcome::NotFound,
        StatusCode::Ok | StatusCode::Internal => CallOutcome::Fatal {
            code: err.code,
            cause: FatalCause::Other,
            message: err.message,
        },
    }
}
