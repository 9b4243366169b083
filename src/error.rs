//! Error types for the stac-dl library.

use std::fmt;

use thiserror::Error;

/// Errors that can occur while talking to STAC APIs or downloading assets.
#[derive(Error, Debug)]
pub enum Error {
    /// The remote host could not be reached.
    #[error("network error: {reason}")]
    Network {
        /// Human-readable reason reported by the transport.
        reason: String,
    },

    /// The request or transfer timed out.
    #[error("request timed out")]
    Timeout,

    /// The server answered with a non-success status.
    #[error("HTTP {code} {reason}")]
    HttpStatus {
        /// Numeric status code.
        code: u16,
        /// Canonical reason phrase for the code.
        reason: String,
    },

    /// The external raster compositing tool is not installed.
    #[error("unable to find \"{tool}\" in current path")]
    ToolNotFound {
        /// Name of the missing executable.
        tool: String,
    },

    /// The external raster compositing tool exited unsuccessfully.
    #[error("{tool} failed with {status}")]
    ToolFailed {
        /// Name of the executable.
        tool: String,
        /// Exit status as reported by the OS.
        status: String,
    },

    /// The server returned a document that is not a usable STAC response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// JSON (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be read or written.
    #[error("configuration error: {0}")]
    Config(String),

    /// The item has no thumbnail asset to preview.
    #[error("item {item_id} has no thumbnail")]
    NoThumbnail {
        /// Id of the item.
        item_id: String,
    },

    /// A command-line argument could not be used.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No configured API matches the given id or href.
    #[error("unknown API: {0}")]
    UnknownApi(String),

    /// A background task reported a failure.
    #[error("{0}")]
    Failed(Failure),

    /// The operation was cancelled by the caller.
    #[error("operation cancelled")]
    Cancelled,
}

/// Coarse classification used when presenting failures to a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Host unreachable, DNS failure, connection reset.
    NetworkUnreachable,
    /// Request or transfer timed out.
    Timeout,
    /// Non-success HTTP status.
    HttpStatus,
    /// External compositing tool missing.
    ToolNotFound,
    /// Anything else.
    Unrecognized,
}

impl Error {
    /// Returns the classification of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Network { .. } => ErrorKind::NetworkUnreachable,
            Self::Timeout => ErrorKind::Timeout,
            Self::HttpStatus { .. } => ErrorKind::HttpStatus,
            Self::ToolNotFound { .. } => ErrorKind::ToolNotFound,
            Self::Failed(failure) => failure.kind,
            _ => ErrorKind::Unrecognized,
        }
    }

    /// Returns the category name of this error.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Network { .. } => "NetworkError",
            Self::Timeout => "Timeout",
            Self::HttpStatus { .. } => "HttpError",
            Self::ToolNotFound { .. } => "ToolNotFound",
            Self::ToolFailed { .. } => "ToolFailed",
            Self::InvalidResponse(_) => "InvalidResponse",
            Self::Json(_) => "JsonError",
            Self::Io(_) => "IoError",
            Self::Config(_) => "ConfigError",
            Self::NoThumbnail { .. } => "NoThumbnail",
            Self::InvalidArgument(_) => "InvalidArgument",
            Self::UnknownApi(_) => "UnknownApi",
            Self::Failed(_) => "Failed",
            Self::Cancelled => "Cancelled",
        }
    }

    /// Renders the error for display to a user.
    ///
    /// Network errors show their reason, HTTP errors their code and reason,
    /// everything else only its category name.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Network { reason } => reason.clone(),
            Self::HttpStatus { code, reason } => format!("{code} {reason}"),
            Self::Failed(failure) => failure.message.clone(),
            other => other.category().to_string(),
        }
    }

    /// Returns true if this error is a cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if is_timeout(&err) {
            return Self::Timeout;
        }
        if let Some(status) = err.status() {
            return Self::HttpStatus {
                code: status.as_u16(),
                reason: status.canonical_reason().unwrap_or_default().to_string(),
            };
        }
        if err.is_decode() {
            return Self::InvalidResponse(err.to_string());
        }
        Self::Network {
            reason: err.to_string(),
        }
    }
}

/// True if `err` or any error in its source chain is a timeout.
fn is_timeout(err: &reqwest::Error) -> bool {
    if err.is_timeout() {
        return true;
    }
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        if cause
            .downcast_ref::<std::io::Error>()
            .is_some_and(|io| io.kind() == std::io::ErrorKind::TimedOut)
        {
            return true;
        }
        source = cause.source();
    }
    false
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// An owned, already-rendered failure carried by task events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// Classification of the underlying error.
    pub kind: ErrorKind,
    /// User-facing rendering from [`Error::describe`].
    pub message: String,
}

impl From<&Error> for Failure {
    fn from(err: &Error) -> Self {
        Self {
            kind: err.kind(),
            message: err.describe(),
        }
    }
}

impl From<Error> for Failure {
    fn from(err: Error) -> Self {
        Self::from(&err)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// A specialized `Result` type for stac-dl operations.
pub type Result<T> = std::result::Result<T, Error>;
