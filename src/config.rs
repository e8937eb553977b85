//! Provider configuration
//!
//! Values come from, in order: command-line flags, the manifest's
//! `[provider]` table, the environment, and the files the tsuru client
//! leaves under `~/.tsuru`. The environment is captured once at startup and
//! only read afterwards.

use anyhow::{Result, bail};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use rpaas_client::{ClientConfig, Target};

use crate::paths;

pub const ENV_TSURU_TARGET: &str = "TSURU_TARGET";
pub const ENV_TSURU_TOKEN: &str = "TSURU_TOKEN";
pub const ENV_SKIP_CERT_VERIFICATION: &str = "TSURU_SKIP_CERT_VERIFICATION";
pub const ENV_SKIP_TSURU_PASSTHROUGH: &str = "PROVIDER_SKIP_TSURU_PASSTHROUGH";
pub const ENV_RPAAS_TARGET: &str = "RPAAS_TARGET";

static URL_SCHEME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://").expect("URL_SCHEME is a valid regex pattern"));

// ============================================================================
// Environment
// ============================================================================

/// Snapshot of the process environment
#[derive(Debug, Clone, Default)]
pub struct Environment {
    vars: HashMap<String, String>,
    home: Option<PathBuf>,
}

impl Environment {
    /// Capture the current process environment
    pub fn capture() -> Self {
        Self {
            vars: std::env::vars().collect(),
            home: dirs::home_dir(),
        }
    }

    /// Build a snapshot from explicit values
    pub fn from_pairs<'a>(
        vars: impl IntoIterator<Item = (&'a str, &'a str)>,
        home: Option<PathBuf>,
    ) -> Self {
        Self {
            vars: vars
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            home,
        }
    }

    /// Non-empty value of a variable
    pub fn var(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// Boolean variable; unset or unparseable is `None`
    pub fn flag(&self, key: &str) -> Option<bool> {
        match self.var(key)?.trim().to_ascii_lowercase().as_str() {
            "1" | "t" | "true" => Some(true),
            "0" | "f" | "false" => Some(false),
            other => {
                log::warn!("Ignoring {key}={other:?}: not a boolean");
                None
            }
        }
    }

    pub fn home(&self) -> Option<&PathBuf> {
        self.home.as_ref()
    }
}

// ============================================================================
// Provider Config
// ============================================================================

/// `[provider]` table of the manifest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderSection {
    /// Tsuru API address
    #[serde(default)]
    pub host: Option<String>,
    /// Tsuru token; prefer TSURU_TOKEN over committing it
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub skip_cert_verification: Option<bool>,
    /// Client request timeout in seconds
    #[serde(default)]
    pub timeout: Option<u64>,
}

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub host: Option<String>,
    pub token: Option<String>,
}

/// Resolved provider configuration
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub host: String,
    pub token: String,
    pub skip_cert_verification: bool,
    /// Set when requests bypass the tsuru proxy
    pub direct_target: Option<String>,
    pub timeout: Duration,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("host", &self.host)
            .field("token", &"<redacted>")
            .field("skip_cert_verification", &self.skip_cert_verification)
            .field("direct_target", &self.direct_target)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ProviderConfig {
    /// Resolve every setting from its sources
    pub fn resolve(cli: &Overrides, section: &ProviderSection, env: &Environment) -> Result<Self> {
        let skip_cert_verification = section
            .skip_cert_verification
            .or_else(|| env.flag(ENV_SKIP_CERT_VERIFICATION))
            .unwrap_or(false);
        let timeout = match section.timeout {
            Some(0) => bail!("[provider].timeout must be positive"),
            Some(secs) => Duration::from_secs(secs),
            None => rpaas_client::DEFAULT_TIMEOUT,
        };

        if env.var(ENV_SKIP_TSURU_PASSTHROUGH) == Some("true") {
            let Some(target) = env.var(ENV_RPAAS_TARGET) else {
                bail!("RPaaS target is empty (set {ENV_RPAAS_TARGET})");
            };
            log::info!("Bypassing tsuru, sending requests to {target}");
            return Ok(Self {
                host: String::new(),
                token: String::new(),
                skip_cert_verification,
                direct_target: Some(target.to_string()),
                timeout,
            });
        }

        let host = pick(&cli.host, &section.host)
            .or_else(|| env.var(ENV_TSURU_TARGET).map(ToString::to_string))
            .or_else(|| read_tsuru_file(env, "target"));
        let Some(host) = host else {
            bail!("Tsuru target is empty");
        };

        let token = pick(&cli.token, &section.token)
            .or_else(|| env.var(ENV_TSURU_TOKEN).map(ToString::to_string))
            .or_else(|| read_tsuru_file(env, "token"));
        let Some(token) = token else {
            bail!("Tsuru token is empty");
        };

        Ok(Self {
            host: normalize_host(&host),
            token,
            skip_cert_verification,
            direct_target: None,
            timeout,
        })
    }

    /// Configuration for the API client
    pub fn client_config(&self) -> ClientConfig {
        let target = match &self.direct_target {
            Some(url) => Target::Direct { url: url.clone() },
            None => Target::Tsuru {
                host: self.host.clone(),
                token: self.token.clone(),
            },
        };
        ClientConfig {
            target,
            skip_cert_verification: self.skip_cert_verification,
            timeout: self.timeout,
        }
    }

    /// Where requests go, for display
    pub fn endpoint(&self) -> &str {
        self.direct_target.as_deref().unwrap_or(&self.host)
    }
}

fn pick(first: &Option<String>, second: &Option<String>) -> Option<String> {
    first
        .iter()
        .chain(second.iter())
        .map(|v| v.trim())
        .find(|v| !v.is_empty())
        .map(ToString::to_string)
}

fn read_tsuru_file(env: &Environment, name: &str) -> Option<String> {
    let path = paths::tsuru_file(env, name)?;
    match fs::read_to_string(&path) {
        Ok(content) => {
            let value = content.trim();
            log::debug!("Read tsuru {name} from {}", path.display());
            (!value.is_empty()).then(|| value.to_string())
        }
        Err(e) => {
            log::debug!("No tsuru {name} at {}: {e}", path.display());
            None
        }
    }
}

/// Tsuru targets may be written without a scheme
fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if URL_SCHEME.is_match(host) {
        host.to_string()
    } else {
        format!("http://{host}")
    }
}
