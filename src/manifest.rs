//! Desired-state manifest
//!
//! A TOML file with an optional `[provider]` table and one array of tables
//! per resource kind:
//!
//! ```toml
//! [provider]
//! host = "https://tsuru.example.com"
//!
//! [[route]]
//! label = "root"
//! service_name = "rpaasv2-be"
//! instance = "my-rpaas"
//! path = "/"
//! destination = "app1.tsuru.example.com"
//!
//! [route.timeouts]
//! update = 600
//! ```
//!
//! Every entry is addressed as `kind.label`.

use anyhow::{Context, Result, bail};
use declarative::Timeouts;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use crate::config::ProviderSection;
use crate::resource::Kind;
use crate::resource::Spec;
use crate::resource::acl::AclSpec;
use crate::resource::autoscale::AutoscaleSpec;
use crate::resource::block::BlockSpec;
use crate::resource::cert_manager::CertManagerSpec;
use crate::resource::certificate::CertificateSpec;
use crate::resource::file::FileSpec;
use crate::resource::route::RouteSpec;

static LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_-]+$").expect("LABEL is a valid regex pattern")
});

// ============================================================================
// Addresses
// ============================================================================

/// Address of a declared record, `kind.label`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address {
    pub kind: Kind,
    pub label: String,
}

impl Address {
    pub fn new(kind: Kind, label: impl Into<String>) -> Self {
        Self {
            kind,
            label: label.into(),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.kind, self.label)
    }
}

impl FromStr for Address {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let Some((kind, label)) = s.split_once('.') else {
            bail!("invalid address '{s}' (expected <kind>.<label>, e.g. route.root)");
        };
        let kind = kind.parse::<Kind>().map_err(anyhow::Error::msg)?;
        if !LABEL.is_match(label) {
            bail!("invalid label '{label}' in address '{s}'");
        }
        Ok(Self::new(kind, label))
    }
}

// ============================================================================
// Entries
// ============================================================================

/// Per-entry deadline overrides, in seconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeoutOverrides {
    #[serde(default)]
    pub create: Option<u64>,
    #[serde(default)]
    pub read: Option<u64>,
    #[serde(default)]
    pub update: Option<u64>,
    #[serde(default)]
    pub delete: Option<u64>,
}

impl TimeoutOverrides {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Replace the deadlines that are overridden
    pub fn apply(&self, base: Timeouts) -> Timeouts {
        let pick = |value: Option<u64>, default: Duration| {
            value.map_or(default, Duration::from_secs)
        };
        Timeouts {
            create: pick(self.create, base.create),
            read: pick(self.read, base.read),
            update: pick(self.update, base.update),
            delete: pick(self.delete, base.delete),
        }
    }
}

/// One `[[kind]]` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry<S> {
    pub label: String,
    #[serde(default, skip_serializing_if = "TimeoutOverrides::is_empty")]
    pub timeouts: TimeoutOverrides,
    #[serde(flatten)]
    pub spec: S,
    /// Keys none of the fields above claim
    #[serde(flatten, skip_serializing)]
    pub unknown: BTreeMap<String, toml::Value>,
}

/// Desired state of any kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Desired {
    Route(RouteSpec),
    Block(BlockSpec),
    Acl(AclSpec),
    Certificate(CertificateSpec),
    CertManager(CertManagerSpec),
    File(FileSpec),
    Autoscale(AutoscaleSpec),
}

impl Desired {
    pub fn kind(&self) -> Kind {
        match self {
            Self::Route(_) => Kind::Route,
            Self::Block(_) => Kind::Block,
            Self::Acl(_) => Kind::Acl,
            Self::Certificate(_) => Kind::Certificate,
            Self::CertManager(_) => Kind::CertManager,
            Self::File(_) => Kind::File,
            Self::Autoscale(_) => Kind::Autoscale,
        }
    }

    /// Content hash of the configuration, recorded in state after apply
    pub fn digest(&self) -> Result<String> {
        let bytes = match self {
            Self::Route(s) => serde_json::to_vec(s),
            Self::Block(s) => serde_json::to_vec(s),
            Self::Acl(s) => serde_json::to_vec(s),
            Self::Certificate(s) => serde_json::to_vec(s),
            Self::CertManager(s) => serde_json::to_vec(s),
            Self::File(s) => serde_json::to_vec(s),
            Self::Autoscale(s) => serde_json::to_vec(s),
        }
        .context("Failed to serialize desired state")?;
        Ok(blake3::hash(&bytes).to_hex().to_string())
    }
}

/// A validated manifest entry
#[derive(Debug, Clone)]
pub struct Declared {
    pub address: Address,
    pub timeouts: TimeoutOverrides,
    pub desired: Desired,
}

// ============================================================================
// Manifest
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub provider: ProviderSection,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub route: Vec<Entry<RouteSpec>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub block: Vec<Entry<BlockSpec>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub acl: Vec<Entry<AclSpec>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub certificate: Vec<Entry<CertificateSpec>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cert_manager: Vec<Entry<CertManagerSpec>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub file: Vec<Entry<FileSpec>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub autoscale: Vec<Entry<AutoscaleSpec>>,
}

impl Manifest {
    /// Load and parse a manifest file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
        let manifest = Self::parse(&content)
            .with_context(|| format!("Failed to parse manifest: {}", path.display()))?;
        log::debug!("Loaded manifest from {}", path.display());
        Ok(manifest)
    }

    /// Load the manifest if it exists; commands that only touch state can
    /// run without one
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("Manifest {} does not exist, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Every entry, validated, in manifest order grouped by kind
    pub fn declared(&self) -> Result<Vec<Declared>> {
        let mut out = Vec::new();
        push_entries(&self.route, Desired::Route, &mut out)?;
        push_entries(&self.block, Desired::Block, &mut out)?;
        push_entries(&self.acl, Desired::Acl, &mut out)?;
        push_entries(&self.certificate, Desired::Certificate, &mut out)?;
        push_entries(&self.cert_manager, Desired::CertManager, &mut out)?;
        push_entries(&self.file, Desired::File, &mut out)?;
        push_entries(&self.autoscale, Desired::Autoscale, &mut out)?;

        let mut seen = HashSet::new();
        for declared in &out {
            if !seen.insert(&declared.address) {
                bail!("duplicate address {}", declared.address);
            }
        }
        Ok(out)
    }
}

fn push_entries<S: Spec>(
    entries: &[Entry<S>],
    wrap: fn(S) -> Desired,
    out: &mut Vec<Declared>,
) -> Result<()> {
    for entry in entries {
        if !LABEL.is_match(&entry.label) {
            bail!(
                "invalid label '{}' for {} (use letters, digits, '_' and '-')",
                entry.label,
                S::KIND
            );
        }
        let address = Address::new(S::KIND, &entry.label);
        for key in entry.unknown.keys() {
            log::warn!("{address}: ignoring unknown key '{key}'");
        }
        entry
            .spec
            .validate()
            .with_context(|| format!("Invalid {address}"))?;
        out.push(Declared {
            address,
            timeouts: entry.timeouts,
            desired: wrap(entry.spec.clone()),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[provider]
host = "https://tsuru.example.com"

[[route]]
label = "root"
service_name = "rpaasv2-be"
instance = "my-rpaas"
path = "/"
destination = "app1.tsuru.example.com"

[route.timeouts]
update = 600

[[block]]
label = "http"
service_name = "rpaasv2-be"
instance = "my-rpaas"
name = "http"
content = "limit_req_zone $binary_remote_addr zone=one:10m rate=1r/s;"

[[acl]]
label = "google"
service_name = "rpaasv2-be"
instance = "my-rpaas"
host = "www.google.com"
port = 443

[[file]]
label = "index"
service_name = "rpaasv2-be"
instance = "my-rpaas"
name = "index.html"
content = "<h1>hello</h1>"

[[autoscale]]
label = "main"
service_name = "rpaasv2-be"
instance = "my-rpaas"
min_replicas = 2
max_replicas = 5

[[autoscale.scheduled_window]]
min_replicas = 3
start = "00 08 * * 1-5"
end = "00 20 * * 1-5"
"#;

    #[test]
    fn test_parse_sample() {
        let manifest = Manifest::parse(SAMPLE).unwrap();
        assert_eq!(manifest.provider.host.as_deref(), Some("https://tsuru.example.com"));
        assert_eq!(manifest.route[0].timeouts.update, Some(600));
        assert_eq!(manifest.acl[0].spec.port, 443);
        assert_eq!(manifest.autoscale[0].spec.scheduled_window.len(), 1);

        let declared = manifest.declared().unwrap();
        let addresses: Vec<String> = declared.iter().map(|d| d.address.to_string()).collect();
        assert_eq!(
            addresses,
            vec!["route.root", "block.http", "acl.google", "file.index", "autoscale.main"]
        );
    }

    #[test]
    fn test_validation_names_the_address() {
        let manifest = Manifest::parse(
            r#"
[[block]]
label = "bad"
service_name = "rpaasv2-be"
instance = "my-rpaas"
name = "location"
content = "x"
"#,
        )
        .unwrap();
        let err = manifest.declared().unwrap_err();
        assert_eq!(err.to_string(), "Invalid block.bad");
        assert!(format!("{err:#}").contains("invalid block name"));
    }

    #[test]
    fn test_duplicate_address() {
        let manifest = Manifest::parse(
            r#"
[[acl]]
label = "a"
service_name = "s"
instance = "i"
host = "h1"
port = 80

[[acl]]
label = "a"
service_name = "s"
instance = "i"
host = "h2"
port = 80
"#,
        )
        .unwrap();
        assert!(manifest.declared().is_err());
    }

    #[test]
    fn test_unknown_table_rejected() {
        assert!(Manifest::parse("[[dock]]\nlabel = \"x\"\n").is_err());
    }

    #[test]
    fn test_unknown_entry_keys_are_collected() {
        let manifest = Manifest::parse(
            r#"
[[route]]
label = "root"
service_name = "rpaasv2-be"
instance = "my-rpaas"
path = "/"
destination = "app1.tsuru.example.com"
https-only = true
"#,
        )
        .unwrap();

        let entry = &manifest.route[0];
        assert_eq!(entry.unknown.keys().collect::<Vec<_>>(), vec!["https-only"]);
        assert!(!entry.spec.https_only);
        assert_eq!(manifest.declared().unwrap().len(), 1);
    }

    #[test]
    fn test_known_keys_are_not_reported() {
        let manifest = Manifest::parse(SAMPLE).unwrap();
        assert!(manifest.route.iter().all(|e| e.unknown.is_empty()));
        assert!(manifest.block.iter().all(|e| e.unknown.is_empty()));
    }

    #[test]
    fn test_address_parsing() {
        let address: Address = "cert_manager.www".parse().unwrap();
        assert_eq!(address, Address::new(Kind::CertManager, "www"));
        assert_eq!(address.to_string(), "cert_manager.www");

        assert!("route".parse::<Address>().is_err());
        assert!("dock.x".parse::<Address>().is_err());
        assert!("route.a b".parse::<Address>().is_err());
    }

    #[test]
    fn test_timeout_overrides() {
        let overrides = TimeoutOverrides {
            update: Some(60),
            ..Default::default()
        };
        let timeouts = overrides.apply(Timeouts::default());
        assert_eq!(timeouts.update, Duration::from_secs(60));
        assert_eq!(timeouts.create, declarative::types::DEFAULT_TIMEOUT);
        assert!(TimeoutOverrides::default().is_empty());
    }

    #[test]
    fn test_digest_tracks_content() {
        let manifest = Manifest::parse(SAMPLE).unwrap();
        let declared = manifest.declared().unwrap();
        let first = declared[0].desired.digest().unwrap();
        assert_eq!(first, declared[0].desired.digest().unwrap());

        let mut changed = declared[0].desired.clone();
        if let Desired::Route(spec) = &mut changed {
            spec.https_only = true;
        }
        assert_ne!(first, changed.digest().unwrap());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = Manifest::load_or_default(&dir.path().join("rpaas.toml")).unwrap();
        assert!(manifest.declared().unwrap().is_empty());
    }
}
