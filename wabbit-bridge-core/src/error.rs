//! Error translation for the bridge boundary
//!
//! Learning cores report failures as [`CoreFailure`]. Before anything reaches
//! the host it is mapped onto exactly one [`ErrorKind`] and wrapped in an
//! [`ErrorEnvelope`]. Unwinding out of a core is intercepted by [`guard`] and
//! translated the same way.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::TryReserveError;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use thiserror::Error;
use tracing::{debug, error};

/// Status code for a successful boundary call
pub const STATUS_OK: i32 = 0;

/// Marker attached to failures the translator does not recognize
pub const INCOMPLETE_TRANSLATION: &str =
    "unidentified failure => the error translation layer may require completion";

/// Failure raised by a learning core
#[derive(Debug, Error)]
pub enum CoreFailure {
    /// Memory for model state or an example could not be allocated
    #[error("allocation failed: {message}")]
    Allocation { message: String },

    /// The configuration string was rejected by the option grammar
    #[error("invalid option: {message}")]
    Options { message: String },

    /// Described failure while reading, learning or finishing
    #[error("{message}")]
    Runtime { message: String },

    /// Failure the core could not classify
    #[error("unrecognized failure: {message}")]
    Unrecognized { message: String },
}

impl CoreFailure {
    pub fn allocation(message: impl Into<String>) -> Self {
        Self::Allocation { message: message.into() }
    }

    pub fn options(message: impl Into<String>) -> Self {
        Self::Options { message: message.into() }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime { message: message.into() }
    }

    pub fn unrecognized(message: impl Into<String>) -> Self {
        Self::Unrecognized { message: message.into() }
    }
}

impl From<TryReserveError> for CoreFailure {
    fn from(err: TryReserveError) -> Self {
        Self::Allocation { message: err.to_string() }
    }
}

impl From<clap::Error> for CoreFailure {
    fn from(err: clap::Error) -> Self {
        Self::Options { message: err.to_string().trim_end().to_string() }
    }
}

/// Host-visible error categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ResourceExhausted,
    InvalidConfiguration,
    RuntimeFailure,
    UnknownFailure,
    InvalidHandle,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 5] = [
        ErrorKind::ResourceExhausted,
        ErrorKind::InvalidConfiguration,
        ErrorKind::RuntimeFailure,
        ErrorKind::UnknownFailure,
        ErrorKind::InvalidHandle,
    ];

    /// Status code reported across the C boundary
    pub fn code(self) -> i32 {
        match self {
            ErrorKind::ResourceExhausted => 1,
            ErrorKind::InvalidConfiguration => 2,
            ErrorKind::RuntimeFailure => 3,
            ErrorKind::UnknownFailure => 4,
            ErrorKind::InvalidHandle => 5,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.code() == code)
    }

    /// Only exhaustion may succeed when retried unchanged
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::ResourceExhausted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::ResourceExhausted => "resource exhausted",
            ErrorKind::InvalidConfiguration => "invalid configuration",
            ErrorKind::RuntimeFailure => "runtime failure",
            ErrorKind::UnknownFailure => "unknown failure",
            ErrorKind::InvalidHandle => "invalid handle",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Translated error handed to the host
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct ErrorEnvelope {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorEnvelope {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn resource_exhausted(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ResourceExhausted, message)
    }

    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidConfiguration, message)
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RuntimeFailure, message)
    }

    pub fn invalid_handle(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidHandle, message)
    }

    /// Status code for this envelope
    pub fn code(&self) -> i32 {
        self.kind.code()
    }
}

/// Result type for every operation that crosses the boundary
pub type BridgeResult<T> = Result<T, ErrorEnvelope>;

/// Map a core failure onto its host-visible kind
pub fn translate(failure: CoreFailure) -> ErrorEnvelope {
    let envelope = match failure {
        CoreFailure::Allocation { message } => ErrorEnvelope::resource_exhausted(message),
        CoreFailure::Options { message } => ErrorEnvelope::invalid_configuration(message),
        CoreFailure::Runtime { message } => ErrorEnvelope::runtime(message),
        CoreFailure::Unrecognized { message } => ErrorEnvelope::new(
            ErrorKind::UnknownFailure,
            format!("{message} ({INCOMPLETE_TRANSLATION})"),
        ),
    };

    debug!(kind = %envelope.kind, "translated core failure");
    envelope
}

impl From<CoreFailure> for ErrorEnvelope {
    fn from(failure: CoreFailure) -> Self {
        translate(failure)
    }
}

/// Map the payload of a caught panic
///
/// String payloads carry a description and become runtime failures. Anything
/// else is reported as unknown.
pub fn translate_panic(payload: Box<dyn Any + Send>) -> ErrorEnvelope {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned());

    match message {
        Some(message) => ErrorEnvelope::runtime(format!("learning core panicked: {message}")),
        None => ErrorEnvelope::new(ErrorKind::UnknownFailure, INCOMPLETE_TRANSLATION),
    }
}

/// Run one boundary operation, intercepting any unwind
pub fn guard<T>(operation: &str, f: impl FnOnce() -> BridgeResult<T>) -> BridgeResult<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let envelope = translate_panic(payload);
            error!(operation, kind = %envelope.kind, "unwind intercepted at bridge boundary: {}", envelope.message);
            Err(envelope)
        }
    }
}
