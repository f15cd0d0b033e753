//! Error types for weeb-dl
//!
//! The taxonomy keeps the failure classes an operator needs to tell apart:
//! - [`Error::Network`] - the upstream could not be reached or answered badly
//!   (retries already spent)
//! - [`Error::StructuralMismatch`] - the upstream answered, but its markup no
//!   longer has the shape the extractor expects (the site changed)
//! - [`Error::IncompleteArtifact`] - a combined document was requested for a
//!   chapter with missing pages
//! - [`Error::Io`] - local filesystem failures, never retried automatically
//!
//! `Error` is `Clone`: the resource cache hands the same failure to every
//! caller that converged on one in-flight fetch.

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Result type alias for weeb-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for weeb-dl
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Transport-level failure after internal retries were exhausted
    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    /// Upstream markup no longer matches the assumed document shape
    #[error("structural mismatch in {document}: {reason}")]
    StructuralMismatch {
        /// Document family being extracted (e.g. "chapter_list")
        document: &'static str,
        /// What was missing or malformed
        reason: String,
    },

    /// Combined document requested but some pages are missing
    #[error("incomplete artifact: missing pages {missing:?}")]
    IncompleteArtifact {
        /// Positions that failed or are absent, ascending
        missing: Vec<u32>,
    },

    /// Local filesystem failure
    #[error("I/O error{}: {source}", display_path(.path))]
    Io {
        /// Path involved in the failing operation, when known
        path: Option<PathBuf>,
        /// Underlying error (shared so the error stays cloneable)
        #[source]
        source: Arc<std::io::Error>,
    },

    /// Archive encoder failed to produce a combined document
    #[error("encode error: {0}")]
    Encode(String),

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "page_concurrency")
        key: Option<String>,
    },

    /// URL could not be parsed or joined onto the base URL
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// The caller cancelled the operation before this unit of work started
    #[error("cancelled")]
    Cancelled,
}

impl Error {
    /// Wrap an I/O error together with the path it happened at
    pub fn io_at(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: Some(path.into()),
            source: Arc::new(source),
        }
    }

    /// Shorthand for a structural mismatch in the named document family
    pub fn structural(document: &'static str, reason: impl Into<String>) -> Self {
        Error::StructuralMismatch {
            document,
            reason: reason.into(),
        }
    }

    /// True for transport failures ("site is down")
    pub fn is_network(&self) -> bool {
        matches!(self, Error::Network(_))
    }

    /// True for extractor failures ("site changed layout")
    pub fn is_structural(&self) -> bool {
        matches!(self, Error::StructuralMismatch { .. })
    }
}

fn display_path(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| format!(" at {}", p.display()))
        .unwrap_or_default()
}

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Error::Io {
            path: None,
            source: Arc::new(source),
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Error::InvalidUrl(e.to_string())
    }
}

/// Why a request never produced a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestFailure {
    /// The per-request timeout elapsed
    Timeout,
    /// TCP/TLS connection could not be established
    Connect,
    /// Response body could not be read to completion
    Body,
    /// Anything else reported by the HTTP client
    Other,
}

impl std::fmt::Display for RequestFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RequestFailure::Timeout => "timeout",
            RequestFailure::Connect => "connect",
            RequestFailure::Body => "body",
            RequestFailure::Other => "request",
        };
        f.write_str(s)
    }
}

/// Transport failures
///
/// Whether a value is retryable is decided once, when the transport builds it,
/// from the active retry policy's status predicate.
#[derive(Debug, Clone, Error)]
pub enum NetworkError {
    /// Upstream answered with a non-success status
    #[error("{url} returned HTTP {status} after {attempts} attempt(s)")]
    Status {
        /// Requested URL
        url: String,
        /// Last observed status code
        status: u16,
        /// Number of attempts made (filled in when retries end)
        attempts: u32,
        /// Whether the retry policy considers this status transient
        retryable: bool,
    },

    /// No response was received
    #[error("{kind} failure for {url} after {attempts} attempt(s): {message}")]
    Request {
        /// Requested URL
        url: String,
        /// Failure class
        kind: RequestFailure,
        /// Cause reported by the HTTP client
        message: String,
        /// Number of attempts made (filled in when retries end)
        attempts: u32,
    },

    /// Upstream served a different kind of content than requested
    #[error("{url} served {content_type} where {expected} was expected")]
    UnexpectedContent {
        /// Requested URL
        url: String,
        /// Expected kind ("image", "html", "json")
        expected: &'static str,
        /// Content-Type header received
        content_type: String,
    },
}

impl NetworkError {
    /// Classify a `reqwest` failure that happened before a status was seen
    pub fn from_reqwest(url: &str, e: &reqwest::Error) -> Self {
        let kind = if e.is_timeout() {
            RequestFailure::Timeout
        } else if e.is_connect() {
            RequestFailure::Connect
        } else if e.is_body() || e.is_decode() {
            RequestFailure::Body
        } else {
            RequestFailure::Other
        };
        NetworkError::Request {
            url: url.to_string(),
            kind,
            message: e.to_string(),
            attempts: 1,
        }
    }

    /// Status code carried by this failure, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            NetworkError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether another attempt could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            NetworkError::Status { retryable, .. } => *retryable,
            NetworkError::Request { kind, .. } => !matches!(kind, RequestFailure::Other),
            NetworkError::UnexpectedContent { .. } => false,
        }
    }

    /// Record the total number of attempts spent on the request
    pub(crate) fn with_attempts(mut self, total: u32) -> Self {
        match &mut self {
            NetworkError::Status { attempts, .. } | NetworkError::Request { attempts, .. } => {
                *attempts = total;
            }
            NetworkError::UnexpectedContent { .. } => {}
        }
        self
    }
}
