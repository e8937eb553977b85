//! Client configuration.

use crate::error::{Error, Result};
use std::fmt;
use std::time::Duration;

/// Request timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Where API calls are sent.
#[derive(Clone, PartialEq, Eq)]
pub enum Target {
    /// Through the tsuru service proxy, authenticated with a tsuru token
    Tsuru { host: String, token: String },
    /// Straight to the RPaaS API, unauthenticated
    Direct { url: String },
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tsuru { host, .. } => f
                .debug_struct("Tsuru")
                .field("host", host)
                .field("token", &"<redacted>")
                .finish(),
            Self::Direct { url } => f.debug_struct("Direct").field("url", url).finish(),
        }
    }
}

/// Explicit client configuration, built once by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub target: Target,
    pub skip_cert_verification: bool,
    pub timeout: Duration,
}

impl ClientConfig {
    /// Configuration for the tsuru proxy with default settings.
    pub fn tsuru(host: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            target: Target::Tsuru {
                host: host.into(),
                token: token.into(),
            },
            skip_cert_verification: false,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Configuration for direct access with default settings.
    pub fn direct(url: impl Into<String>) -> Self {
        Self {
            target: Target::Direct { url: url.into() },
            skip_cert_verification: false,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Check that every required value is present.
    pub fn validate(&self) -> Result<()> {
        match &self.target {
            Target::Tsuru { host, token } => {
                if host.trim().is_empty() {
                    return Err(Error::InvalidConfig("Tsuru target is empty".into()));
                }
                if token.trim().is_empty() {
                    return Err(Error::InvalidConfig("Tsuru token is empty".into()));
                }
            }
            Target::Direct { url } => {
                if url.trim().is_empty() {
                    return Err(Error::InvalidConfig("RPaaS target is empty".into()));
                }
            }
        }
        if self.timeout.is_zero() {
            return Err(Error::InvalidConfig("timeout must be positive".into()));
        }
        Ok(())
    }
}
