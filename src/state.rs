//! Persisted state
//!
//! Maps every managed address to the identifier of its remote object. The
//! identifier is the only thing needed to find the object again; the digest
//! records which configuration was last applied.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::resource::Kind;

// ============================================================================
// State Structures
// ============================================================================

/// Main state structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProviderState {
    /// Managed records by address (`kind.label`)
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceRecord>,

    /// Last time the state was updated
    pub last_updated: DateTime<Utc>,
}

/// State for one managed record
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ResourceRecord {
    pub kind: Kind,

    /// Canonical identifier of the remote object
    pub id: String,

    /// Content hash of the configuration last applied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,

    /// Last time the record was created or updated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_applied: Option<DateTime<Utc>>,

    /// Last time the record was read back
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_refreshed: Option<DateTime<Utc>>,
}

impl ResourceRecord {
    pub fn new(kind: Kind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            digest: None,
            last_applied: None,
            last_refreshed: None,
        }
    }
}

// ============================================================================
// ProviderState Implementation
// ============================================================================

impl ProviderState {
    /// Load state from disk, or return default if file doesn't exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("State file does not exist, using default state");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;

        let state: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))?;

        log::debug!("Loaded state from {}", path.display());
        Ok(state)
    }

    /// Save state to disk
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).with_context(|| {
                format!("Failed to create state directory: {}", dir.display())
            })?;
        }

        let content = toml::to_string_pretty(&self).context("Failed to serialize state to TOML")?;

        fs::write(path, &content)
            .with_context(|| format!("Failed to write state file: {}", path.display()))?;

        log::debug!("Saved state to {}", path.display());
        Ok(())
    }

    /// Update the last_updated timestamp and save
    pub fn touch(&mut self, path: &Path) -> Result<()> {
        self.last_updated = Utc::now();
        self.save(path)
    }

    pub fn get(&self, address: &str) -> Option<&ResourceRecord> {
        self.resources.get(address)
    }

    /// Record a create or update
    pub fn mark_applied(&mut self, address: &str, kind: Kind, id: &str, digest: String) {
        let now = Utc::now();
        let record = self
            .resources
            .entry(address.to_string())
            .or_insert_with(|| ResourceRecord::new(kind, id));
        record.kind = kind;
        record.id = id.to_string();
        record.digest = Some(digest);
        record.last_applied = Some(now);
        record.last_refreshed = Some(now);
    }

    /// Record a read; a changed identifier replaces the stored one
    pub fn mark_refreshed(&mut self, address: &str, kind: Kind, id: &str) {
        let record = self
            .resources
            .entry(address.to_string())
            .or_insert_with(|| ResourceRecord::new(kind, id));
        if record.id != id {
            log::info!("{address}: identifier {:?} is now {id:?}", record.id);
            record.id = id.to_string();
        }
        record.last_refreshed = Some(Utc::now());
    }

    /// Forget a record
    pub fn remove(&mut self, address: &str) -> Option<ResourceRecord> {
        self.resources.remove(address)
    }
}

impl Default for ProviderState {
    fn default() -> Self {
        Self {
            resources: BTreeMap::new(),
            last_updated: Utc::now(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_state() {
        let state = ProviderState::default();
        assert!(state.resources.is_empty());
    }

    #[test]
    fn test_mark_applied_and_refreshed() {
        let mut state = ProviderState::default();
        state.mark_applied("route.root", Kind::Route, "svc::inst::/", "abc".into());

        let record = state.get("route.root").unwrap();
        assert_eq!(record.id, "svc::inst::/");
        assert_eq!(record.digest.as_deref(), Some("abc"));
        assert!(record.last_applied.is_some());

        state.mark_refreshed("route.root", Kind::Route, "svc::inst::/");
        assert_eq!(state.get("route.root").unwrap().digest.as_deref(), Some("abc"));

        state.mark_refreshed("route.root", Kind::Route, "svc::inst::/other");
        assert_eq!(state.get("route.root").unwrap().id, "svc::inst::/other");
    }

    #[test]
    fn test_refresh_of_unknown_address_has_no_digest() {
        let mut state = ProviderState::default();
        state.mark_refreshed("acl.a", Kind::Acl, "svc::inst::h::80");
        let record = state.get("acl.a").unwrap();
        assert_eq!(record.digest, None);
        assert_eq!(record.last_applied, None);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("state.toml");

        let mut state = ProviderState::default();
        state.mark_applied("cert_manager.www", Kind::CertManager, "s::i::issuer", "d".into());
        state.mark_applied("block.http", Kind::Block, "s::i::http", "e".into());
        state.save(&path).unwrap();

        let loaded = ProviderState::load(&path).unwrap();
        assert_eq!(loaded.resources, state.resources);

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("kind = \"cert_manager\""));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let state = ProviderState::load(&dir.path().join("state.toml")).unwrap();
        assert!(state.resources.is_empty());
    }

    #[test]
    fn test_load_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.toml");
        fs::write(&path, "resources = 3").unwrap();
        assert!(ProviderState::load(&path).is_err());
    }
}
