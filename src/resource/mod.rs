//! RPaaS resource kinds
//!
//! Every kind is a [`ResourceAdapter`] over the API [`Backend`]:
//! - Identifier scheme (current and legacy generations)
//! - Payload construction and the upsert/delete calls
//! - Drift detection against the desired fields ([`Converge`])
//!
//! [`Backend`]: rpaas_client::Backend

pub mod acl;
pub mod autoscale;
pub mod block;
pub mod cert_manager;
pub mod certificate;
pub mod file;
pub mod route;

use declarative::{RemoteFailure, ResourceAdapter, ResourceKey, split_exact};
use rpaas_client::Instance;
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use std::fmt;
use std::str::FromStr;

/// API error as seen by the reconciliation core
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ApiFailure(#[from] pub rpaas_client::Error);

impl RemoteFailure for ApiFailure {
    fn response_body(&self) -> Option<&str> {
        self.0.response_body()
    }

    fn is_not_found(&self) -> bool {
        self.0.is_not_found()
    }
}

/// Resource kinds managed by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    Route,
    Block,
    Acl,
    Certificate,
    CertManager,
    File,
    Autoscale,
}

impl Kind {
    pub const ALL: [Self; 7] = [
        Self::Route,
        Self::Block,
        Self::Acl,
        Self::Certificate,
        Self::CertManager,
        Self::File,
        Self::Autoscale,
    ];

    /// Name used in addresses and manifest tables
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Route => "route",
            Self::Block => "block",
            Self::Acl => "acl",
            Self::Certificate => "certificate",
            Self::CertManager => "cert_manager",
            Self::File => "file",
            Self::Autoscale => "autoscale",
        }
    }

    /// Heading used when grouping output
    pub fn title(&self) -> &'static str {
        match self {
            Self::Route => "Routes",
            Self::Block => "Blocks",
            Self::Acl => "ACLs",
            Self::Certificate => "Certificates",
            Self::CertManager => "Cert-manager certificates",
            Self::File => "Files",
            Self::Autoscale => "Autoscale",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown resource kind '{s}'"))
    }
}

/// Desired-state record as written in the manifest
pub trait Spec: Serialize + DeserializeOwned + Clone + Send + Sync {
    const KIND: Kind;

    /// Field-level checks that need no remote call
    fn validate(&self) -> anyhow::Result<()>;
}

/// Drift detection and display on top of the lifecycle adapter
pub trait Converge: ResourceAdapter<Error = ApiFailure> {
    /// Desired fields the remote object does not match
    fn drift(&self, observed: &Self::Observed, desired: &Self::Desired) -> Vec<&'static str>;

    /// Observed fields worth printing. Secrets never appear here.
    fn describe(&self, observed: &Self::Observed) -> Vec<(&'static str, String)>;
}

/// Instance a key lives on
pub(crate) fn instance_of(key: &ResourceKey) -> Instance {
    Instance::new(key.service_name.clone(), key.instance_name.clone())
}

/// `<service>/<instance>`, written before discriminators were recorded
pub(crate) fn legacy_instance_pair(id: &str) -> Option<ResourceKey> {
    let parts = split_exact(id, "/", 2)?;
    Some(ResourceKey::new(parts[0], parts[1]))
}

/// Require exactly one of two alternative fields
pub(crate) fn exactly_one(
    (a, a_set): (&str, bool),
    (b, b_set): (&str, bool),
) -> anyhow::Result<()> {
    match (a_set, b_set) {
        (true, false) | (false, true) => Ok(()),
        (true, true) => anyhow::bail!("only one of {a} or {b} may be set"),
        (false, false) => anyhow::bail!("one of {a} or {b} must be set"),
    }
}

/// Reject empty service or instance names before any key is built
pub(crate) fn require_instance(service_name: &str, instance: &str) -> anyhow::Result<()> {
    if service_name.trim().is_empty() {
        anyhow::bail!("service_name must not be empty");
    }
    if instance.trim().is_empty() {
        anyhow::bail!("instance must not be empty");
    }
    Ok(())
}
