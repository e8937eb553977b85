//! Error types for reconciliation.
//!
//! Errors are categorized so callers can tell operator mistakes (a
//! malformed identifier, an immutable field edit, an ambiguous legacy
//! record) apart from remote failures, and decide how to report them.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Boxed remote error, preserved unmodified for the caller.
pub type RemoteError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Categories of reconciliation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The persisted identifier or the desired key is unusable
    Identity,
    /// A legacy record matches several remote objects
    Ambiguous,
    /// The remote stayed locked past the operation deadline
    Timeout,
    /// The remote rejected the call
    Remote,
    /// The desired state asks for something the remote cannot do in place
    Configuration,
}

impl ErrorCategory {
    /// Whether the operator has to intervene before the next run can succeed.
    pub fn needs_operator(&self) -> bool {
        matches!(self, Self::Identity | Self::Ambiguous | Self::Configuration)
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Identity => "Invalid resource identifier",
            Self::Ambiguous => "Ambiguous resource",
            Self::Timeout => "Remote instance stayed locked",
            Self::Remote => "Remote API error",
            Self::Configuration => "Invalid configuration",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Identity => "Fix the identifier in state or re-import the resource",
            Self::Ambiguous => {
                "Remove the record from state and import the intended object by its full identifier"
            }
            Self::Timeout => "Another operation is running on the instance; retry later",
            Self::Remote => "Check the error details returned by the API",
            Self::Configuration => {
                "Fix the manifest; identity fields only change by destroying and recreating the resource"
            }
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors raised by the reconciliation core.
#[derive(Debug, Error)]
pub enum Error {
    /// Persisted identifier matches no known encoding generation
    #[error("invalid {kind} identifier {id:?}: expected format {expected}")]
    MalformedIdentifier {
        /// Resource kind the identifier was decoded for
        kind: &'static str,
        /// Identifier as persisted
        id: String,
        /// Current-generation format
        expected: String,
    },

    /// Key cannot be encoded
    #[error("invalid {kind} key: {reason}")]
    InvalidKey {
        /// Resource kind
        kind: &'static str,
        /// What is wrong with the key
        reason: String,
    },

    /// A partial key resolved to more than one remote object
    #[error(
        "{kind} {service}/{instance} was created by an older release whose identifier does not \
         name a single object, and {} candidates exist ({}). You must resolve it manually",
        .candidates.len(),
        .candidates.join(", ")
    )]
    AmbiguousResource {
        /// Resource kind
        kind: &'static str,
        /// Service name
        service: String,
        /// Instance name
        instance: String,
        /// Identifiers of every candidate
        candidates: Vec<String>,
    },

    /// The remote kept reporting a lock conflict until the deadline passed
    #[error("{operation} timed out after {elapsed:?} ({attempts} attempts): {source}")]
    Timeout {
        /// Operation being retried
        operation: String,
        /// Time spent retrying
        elapsed: Duration,
        /// Number of invocations
        attempts: u32,
        /// Last lock-conflict error
        #[source]
        source: RemoteError,
    },

    /// Any other remote failure
    #[error("{operation} failed: {source}")]
    Remote {
        /// Operation that failed
        operation: String,
        /// Error as returned by the remote client
        #[source]
        source: RemoteError,
    },

    /// Update attempted to change an identity field
    #[error("{field} cannot be changed in place (from {from:?} to {to:?})")]
    ImmutableFieldChanged {
        /// Field name
        field: &'static str,
        /// Value in the persisted identifier
        from: String,
        /// Value in the desired state
        to: String,
    },

    /// Desired state cannot be turned into a request
    #[error("invalid {kind} configuration: {reason}")]
    InvalidDesired {
        /// Resource kind
        kind: &'static str,
        /// What is wrong with it
        reason: String,
    },

    /// Create succeeded remotely but the follow-up read found nothing
    #[error("{kind} {id} was created but could not be read back")]
    NotConfirmed {
        /// Resource kind
        kind: &'static str,
        /// Identifier that was about to be persisted
        id: String,
    },
}

impl Error {
    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::MalformedIdentifier { .. } | Error::InvalidKey { .. } => ErrorCategory::Identity,
            Error::AmbiguousResource { .. } => ErrorCategory::Ambiguous,
            Error::Timeout { .. } => ErrorCategory::Timeout,
            Error::Remote { .. } | Error::NotConfirmed { .. } => ErrorCategory::Remote,
            Error::ImmutableFieldChanged { .. } | Error::InvalidDesired { .. } => {
                ErrorCategory::Configuration
            }
        }
    }

    /// The remote error behind a `Remote` or `Timeout`, if any.
    pub fn remote(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            Error::Remote { source, .. } | Error::Timeout { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }

    pub fn invalid_desired(kind: &'static str, reason: impl Into<String>) -> Self {
        Error::InvalidDesired {
            kind,
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_key(kind: &'static str, reason: impl Into<String>) -> Self {
        Error::InvalidKey {
            kind,
            reason: reason.into(),
        }
    }
}

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, Error>;
