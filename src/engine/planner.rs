//! Planning - decide what each address needs
//!
//! Every address known to the manifest or to state becomes an [`Item`].
//! Inspecting an item reads the remote object (when there is an identifier)
//! and turns the result into a [`Change`].

use anyhow::{Context, Result, bail};
use rayon::prelude::*;
use std::collections::BTreeMap;

use crate::manifest::{Address, Declared, TimeoutOverrides};
use crate::progress;
use crate::resource::{Converge, Kind};
use crate::state::{ProviderState, ResourceRecord};
use declarative::Observation;

use super::dispatch::{Session, Visit, describe_error, dispatch};

/// An address with whatever the manifest and state know about it
#[derive(Debug, Clone)]
pub struct Item {
    pub address: Address,
    pub declared: Option<Declared>,
    pub record: Option<ResourceRecord>,
}

impl Item {
    /// Whether the stored digest differs from the configuration
    fn digest_changed(&self) -> Result<bool> {
        let Some(declared) = &self.declared else {
            return Ok(false);
        };
        let digest = declared.desired.digest()?;
        Ok(self
            .record
            .as_ref()
            .is_none_or(|r| r.digest.as_deref() != Some(digest.as_str())))
    }
}

/// What reconciliation will do to an address
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Declared, no identifier yet
    Create,
    /// Declared, but the remote object disappeared
    Recreate,
    /// Remote object differs from the configuration
    Update { fields: Vec<&'static str> },
    /// In state, no longer declared
    Delete,
    /// In state, not declared, and already gone remotely
    Forget,
    NoChange,
    /// The remote object could not be read
    Failed { error: String },
}

impl Action {
    /// Whether carrying out the action calls the API
    pub fn is_change(&self) -> bool {
        matches!(
            self,
            Self::Create | Self::Recreate | Self::Update { .. } | Self::Delete
        )
    }
}

/// Planned action for one address
#[derive(Debug, Clone)]
pub struct Change {
    pub address: Address,
    pub action: Action,
    /// Canonical identifier of the existing remote object
    pub id: Option<String>,
    /// The read rewrote a legacy identifier
    pub migrated: bool,
    /// Observed fields, for display
    pub observed: Vec<(&'static str, String)>,
    pub declared: Option<Declared>,
}

impl Change {
    fn new(item: &Item, action: Action) -> Self {
        Self {
            address: item.address.clone(),
            action,
            id: item.record.as_ref().map(|r| r.id.clone()),
            migrated: false,
            observed: Vec::new(),
            declared: item.declared.clone(),
        }
    }

    pub fn kind(&self) -> Kind {
        self.address.kind
    }
}

/// Join manifest entries and state records by address.
///
/// `target` narrows the result to one address.
pub fn items(
    declared: Vec<Declared>,
    state: &ProviderState,
    target: Option<&Address>,
) -> Result<Vec<Item>> {
    let mut by_address: BTreeMap<Address, Item> = BTreeMap::new();

    for (key, record) in &state.resources {
        let address: Address = key
            .parse()
            .with_context(|| format!("Invalid address in state: {key}"))?;
        if address.kind != record.kind {
            bail!(
                "state record {key} has kind {} but its address says {}",
                record.kind,
                address.kind
            );
        }
        by_address.insert(
            address.clone(),
            Item {
                address,
                declared: None,
                record: Some(record.clone()),
            },
        );
    }

    for entry in declared {
        let address = entry.address.clone();
        by_address
            .entry(address.clone())
            .or_insert_with(|| Item {
                address,
                declared: None,
                record: None,
            })
            .declared = Some(entry);
    }

    if let Some(target) = target {
        let item = by_address
            .remove(target)
            .with_context(|| format!("{target} is neither declared nor in state"))?;
        return Ok(vec![item]);
    }

    Ok(by_address.into_values().collect())
}

/// Read an item back and decide what to do with it
pub fn inspect(session: &Session<'_>, item: &Item) -> Change {
    let digest_changed = match item.digest_changed() {
        Ok(changed) => changed,
        Err(e) => return Change::new(item, Action::Failed { error: format!("{e:#}") }),
    };

    let Some(record) = &item.record else {
        return Change::new(item, Action::Create);
    };

    let desired = item.declared.as_ref().map(|d| &d.desired);
    let timeouts = item.declared.as_ref().map(|d| d.timeouts).unwrap_or_default();
    dispatch(
        session.api,
        item.address.kind,
        desired,
        Inspect {
            session,
            item,
            id: &record.id,
            timeouts,
            digest_changed,
        },
    )
}

/// Inspect items on a pool of `jobs` threads, keeping their order
pub fn inspect_all(session: &Session<'_>, items: &[Item], jobs: usize) -> Result<Vec<Change>> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.max(1))
        .build()
        .context("Failed to create read thread pool")?;

    let pb = progress::bar(items.len() as u64, "Reading");
    let changes = pool.install(|| {
        items
            .par_iter()
            .map(|item| {
                let change = inspect(session, item);
                pb.set_message(item.address.to_string());
                pb.inc(1);
                change
            })
            .collect()
    });
    pb.finish_and_clear();

    Ok(changes)
}

/// Look up an existing remote object by a user-supplied identifier.
///
/// The declaration for the address, when there is one, narrows identifiers
/// written by older releases.
pub fn adopt(session: &Session<'_>, address: &Address, declared: Option<&Declared>, id: &str) -> Result<Change> {
    let item = Item {
        address: address.clone(),
        declared: declared.cloned(),
        record: None,
    };
    let desired = declared.map(|d| &d.desired);
    let timeouts = declared.map(|d| d.timeouts).unwrap_or_default();
    dispatch(
        session.api,
        address.kind,
        desired,
        Adopt {
            session,
            item: &item,
            id,
            timeouts,
        },
    )
}

struct Adopt<'s, 'a> {
    session: &'s Session<'a>,
    item: &'s Item,
    id: &'s str,
    timeouts: TimeoutOverrides,
}

impl Visit for Adopt<'_, '_> {
    type Output = Result<Change>;

    fn visit<A: Converge>(self, adapter: &A, desired: Option<&A::Desired>) -> Result<Change> {
        let reconciler = self.session.reconciler(adapter, &self.timeouts);
        let observation = match desired {
            Some(desired) => reconciler.read(self.id, Some(desired)),
            None => reconciler.import(self.id),
        }
        .map_err(|e| anyhow::anyhow!(describe_error(&e)))?;

        let Observation::Managed(managed) = observation else {
            bail!("no {} matches identifier {:?}", self.item.address.kind, self.id);
        };

        Ok(Change {
            address: self.item.address.clone(),
            action: Action::NoChange,
            id: Some(managed.id),
            migrated: managed.migrated,
            observed: adapter.describe(&managed.observed),
            declared: self.item.declared.clone(),
        })
    }
}

/// Every stateful item, scheduled for deletion without a read
pub fn teardown(items: &[Item]) -> Vec<Change> {
    items
        .iter()
        .filter(|item| item.record.is_some())
        .map(|item| Change::new(item, Action::Delete))
        .collect()
}

struct Inspect<'s, 'a> {
    session: &'s Session<'a>,
    item: &'s Item,
    id: &'s str,
    timeouts: TimeoutOverrides,
    digest_changed: bool,
}

impl Visit for Inspect<'_, '_> {
    type Output = Change;

    fn visit<A: Converge>(self, adapter: &A, desired: Option<&A::Desired>) -> Change {
        let reconciler = self.session.reconciler(adapter, &self.timeouts);
        let observation = match reconciler.read(self.id, desired) {
            Ok(observation) => observation,
            Err(e) => {
                return Change::new(self.item, Action::Failed { error: describe_error(&e) });
            }
        };

        let managed = match observation {
            Observation::Managed(managed) => managed,
            Observation::Gone => {
                let action = if desired.is_some() {
                    Action::Recreate
                } else {
                    Action::Forget
                };
                return Change::new(self.item, action);
            }
        };

        let action = match desired {
            None => Action::Delete,
            Some(desired) => {
                let fields = adapter.drift(&managed.observed, desired);
                if !fields.is_empty() || self.digest_changed {
                    Action::Update { fields }
                } else {
                    Action::NoChange
                }
            }
        };

        Change {
            address: self.item.address.clone(),
            action,
            id: Some(managed.id),
            migrated: managed.migrated,
            observed: adapter.describe(&managed.observed),
            declared: self.item.declared.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Manifest;
    use declarative::RetryPolicy;
    use rpaas_client::{Instance, MockBackend};
    use std::time::Duration;

    const MANIFEST: &str = r#"
[[route]]
label = "root"
service_name = "rpaasv2-be"
instance = "my-rpaas"
path = "/"
destination = "app1.tsuru.example.com"

[[acl]]
label = "db"
service_name = "rpaasv2-be"
instance = "my-rpaas"
host = "db.internal"
port = 5432
"#;

    fn declared() -> Vec<Declared> {
        Manifest::parse(MANIFEST).unwrap().declared().unwrap()
    }

    fn session(api: &MockBackend) -> Session<'_> {
        Session::new(api).with_backoff(RetryPolicy {
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            ..RetryPolicy::default()
        })
    }

    #[test]
    fn test_items_join_manifest_and_state() {
        let mut state = ProviderState::default();
        state.mark_applied("route.root", Kind::Route, "rpaasv2-be::my-rpaas::/", "x".into());
        state.mark_applied("block.http", Kind::Block, "rpaasv2-be::my-rpaas::http", "y".into());

        let items = items(declared(), &state, None).unwrap();
        let summary: Vec<_> = items
            .iter()
            .map(|i| (i.address.to_string(), i.declared.is_some(), i.record.is_some()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("route.root".to_string(), true, true),
                ("block.http".to_string(), false, true),
                ("acl.db".to_string(), true, false),
            ]
        );
    }

    #[test]
    fn test_items_target_filter() {
        let target: Address = "acl.db".parse().unwrap();
        let items = items(declared(), &ProviderState::default(), Some(&target)).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].address, target);

        let missing: Address = "route.nope".parse().unwrap();
        assert!(super::items(declared(), &ProviderState::default(), Some(&missing)).is_err());
    }

    #[test]
    fn test_items_reject_kind_mismatch() {
        let mut state = ProviderState::default();
        state.mark_applied("route.root", Kind::Acl, "x::y::h::1", "d".into());
        assert!(items(Vec::new(), &state, None).is_err());
    }

    #[test]
    fn test_inspect_new_item_plans_create_without_remote_call() {
        let api = MockBackend::new();
        let items = items(declared(), &ProviderState::default(), None).unwrap();
        let change = inspect(&session(&api), &items[0]);
        assert_eq!(change.action, Action::Create);
        assert_eq!(api.calls("list_routes"), 0);
    }

    #[test]
    fn test_inspect_gone_declared_item_recreates() {
        let api = MockBackend::new();
        let mut state = ProviderState::default();
        state.mark_applied("acl.db", Kind::Acl, "rpaasv2-be::my-rpaas::db.internal::5432", "d".into());
        let items = items(declared(), &state, Some(&"acl.db".parse().unwrap())).unwrap();
        assert_eq!(inspect(&session(&api), &items[0]).action, Action::Recreate);
    }

    #[test]
    fn test_inspect_gone_orphan_is_forgotten() {
        let api = MockBackend::new();
        let mut state = ProviderState::default();
        state.mark_applied("block.http", Kind::Block, "rpaasv2-be::my-rpaas::http", "d".into());
        let items = items(Vec::new(), &state, None).unwrap();
        assert_eq!(inspect(&session(&api), &items[0]).action, Action::Forget);
    }

    #[test]
    fn test_inspect_unchanged_item_with_matching_digest() {
        let api = MockBackend::new();
        api.with_instance(&Instance::new("rpaasv2-be", "my-rpaas"), |data| {
            data.acls.push(rpaas_client::AclEntry {
                host: "db.internal".into(),
                port: 5432,
            });
        });

        let declared = declared();
        let digest = declared[1].desired.digest().unwrap();
        let mut state = ProviderState::default();
        state.mark_applied("acl.db", Kind::Acl, "rpaasv2-be/my-rpaas db.internal:5432", digest);

        let items = items(declared, &state, Some(&"acl.db".parse().unwrap())).unwrap();
        let change = inspect(&session(&api), &items[0]);
        assert_eq!(change.action, Action::NoChange);
        assert!(change.migrated);
        assert_eq!(change.id.as_deref(), Some("rpaasv2-be::my-rpaas::db.internal::5432"));
    }

    #[test]
    fn test_inspect_digest_change_forces_update() {
        let api = MockBackend::new();
        api.with_instance(&Instance::new("rpaasv2-be", "my-rpaas"), |data| {
            data.acls.push(rpaas_client::AclEntry {
                host: "db.internal".into(),
                port: 5432,
            });
        });
        let mut state = ProviderState::default();
        state.mark_applied("acl.db", Kind::Acl, "rpaasv2-be::my-rpaas::db.internal::5432", "stale".into());

        let items = items(declared(), &state, Some(&"acl.db".parse().unwrap())).unwrap();
        assert_eq!(
            inspect(&session(&api), &items[0]).action,
            Action::Update { fields: Vec::new() }
        );
    }

    #[test]
    fn test_inspect_malformed_identifier_fails() {
        let api = MockBackend::new();
        let mut state = ProviderState::default();
        state.mark_applied("route.root", Kind::Route, "not an id", "d".into());
        let items = items(declared(), &state, Some(&"route.root".parse().unwrap())).unwrap();
        match inspect(&session(&api), &items[0]).action {
            Action::Failed { error } => assert!(error.contains("invalid route identifier")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn test_adopt_migrates_legacy_identifier() {
        let api = MockBackend::new();
        api.with_instance(&Instance::new("rpaasv2-be", "my-rpaas"), |data| {
            data.acls.push(rpaas_client::AclEntry {
                host: "db.internal".into(),
                port: 5432,
            });
        });
        let address: Address = "acl.db".parse().unwrap();

        let change = adopt(&session(&api), &address, None, "rpaasv2-be/my-rpaas db.internal:5432").unwrap();
        assert_eq!(change.id.as_deref(), Some("rpaasv2-be::my-rpaas::db.internal::5432"));
        assert!(change.migrated);

        let missing = adopt(&session(&api), &address, None, "rpaasv2-be::my-rpaas::other::80");
        assert!(missing.unwrap_err().to_string().starts_with("no acl matches"));
    }

    #[test]
    fn test_teardown_only_touches_stateful_items() {
        let mut state = ProviderState::default();
        state.mark_applied("route.root", Kind::Route, "rpaasv2-be::my-rpaas::/", "x".into());
        let items = items(declared(), &state, None).unwrap();
        let changes = teardown(&items);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].action, Action::Delete);
        assert_eq!(changes[0].id.as_deref(), Some("rpaasv2-be::my-rpaas::/"));
    }
}
