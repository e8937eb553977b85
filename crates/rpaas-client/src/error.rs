//! Error types for RPaaS API calls.
//!
//! Errors keep the raw response body of failed calls so callers can look
//! for markers the API puts there (such as an instance lock).

use std::fmt;
use thiserror::Error;

/// Result type alias for API operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of API errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The addressed object does not exist
    NotFound,
    /// Token missing, expired or not allowed on the instance
    Unauthorized,
    /// The API refused the request (validation, conflict)
    Rejected,
    /// The API failed while handling the request
    Server,
    /// The request never got an answer
    Network,
    /// The response could not be understood
    Decode,
    /// The client is not configured correctly
    Config,
}

impl ErrorCategory {
    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::NotFound => "Object not found",
            Self::Unauthorized => "Not authorized",
            Self::Rejected => "Request rejected",
            Self::Server => "RPaaS API error",
            Self::Network => "Network connectivity issue",
            Self::Decode => "Invalid API response",
            Self::Config => "Invalid client configuration",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::NotFound => "Check the instance and object names",
            Self::Unauthorized => "Log in again with `tsuru login` or set TSURU_TOKEN",
            Self::Rejected => "Check the error details returned by the API",
            Self::Server => "Check the RPaaS API logs and try again",
            Self::Network => "Check the target URL and your connection",
            Self::Decode => "Check that the target points at an RPaaS API",
            Self::Config => "Set the target and token in the manifest or environment",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors surfaced by the API client.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// The API answered with a non-2xx status
    #[error("unexpected status code {status}: {}", .body.trim())]
    UnexpectedStatus {
        /// HTTP status code
        status: u16,
        /// Response body, verbatim
        body: String,
    },

    /// Connection, TLS or timeout failure
    #[error("transport error: {message}")]
    Transport {
        /// Error reported by the HTTP stack
        message: String,
    },

    /// Body could not be parsed
    #[error("invalid response: {0}")]
    Decode(String),

    /// Missing or inconsistent client configuration
    #[error("invalid client configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create a status error.
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::UnexpectedStatus {
            status,
            body: body.into(),
        }
    }

    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::UnexpectedStatus { status: 404, .. } => ErrorCategory::NotFound,
            Self::UnexpectedStatus {
                status: 401 | 403, ..
            } => ErrorCategory::Unauthorized,
            Self::UnexpectedStatus { status, .. } if *status >= 500 => ErrorCategory::Server,
            Self::UnexpectedStatus { .. } => ErrorCategory::Rejected,
            Self::Transport { .. } => ErrorCategory::Network,
            Self::Decode(_) => ErrorCategory::Decode,
            Self::InvalidConfig(_) => ErrorCategory::Config,
        }
    }

    /// Whether the API reported the object as missing.
    pub fn is_not_found(&self) -> bool {
        self.category() == ErrorCategory::NotFound
    }

    /// Raw body of a status error.
    pub fn response_body(&self) -> Option<&str> {
        match self {
            Self::UnexpectedStatus { body, .. } => Some(body),
            _ => None,
        }
    }
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(code) => Self::status(code, String::new()),
            other => Self::Transport {
                message: other.to_string(),
            },
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}
