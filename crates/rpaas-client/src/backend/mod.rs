//! Backend trait and implementations for talking to the RPaaS API.
//!
//! This module provides the [`Backend`] trait, the blocking HTTP
//! implementation in [`http`], and [`MockBackend`] for tests.
//!
//! # Testing
//!
//! ```
//! use rpaas_client::backend::{Backend, MockBackend};
//! use rpaas_client::{Instance, Route};
//!
//! let mock = MockBackend::new();
//! let at = Instance::new("rpaasv2-be", "my-rpaas");
//! mock.update_route(&at, &Route { path: "/".into(), content: "ok".into(), ..Route::default() })
//!     .unwrap();
//!
//! assert_eq!(mock.list_routes(&at).unwrap().len(), 1);
//! assert_eq!(mock.calls("update_route"), 1);
//! ```

pub mod http;

use crate::error::{Error, Result};
use crate::types::{
    AclEntry, Autoscale, Block, CertManager, CertificateInfo, ExtraFile, Instance, InstanceInfo,
    Route, UpdateCertificate,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Operations of the RPaaS management API.
///
/// Every call addresses one instance. Upserts create the object when it is
/// missing and replace it otherwise.
pub trait Backend: Send + Sync {
    fn list_routes(&self, at: &Instance) -> Result<Vec<Route>>;
    fn update_route(&self, at: &Instance, route: &Route) -> Result<()>;
    fn delete_route(&self, at: &Instance, path: &str) -> Result<()>;

    fn list_blocks(&self, at: &Instance) -> Result<Vec<Block>>;
    fn update_block(&self, at: &Instance, block: &Block) -> Result<()>;
    fn delete_block(&self, at: &Instance, server_name: &str, name: &str) -> Result<()>;

    fn list_acls(&self, at: &Instance) -> Result<Vec<AclEntry>>;
    fn add_acl(&self, at: &Instance, entry: &AclEntry) -> Result<()>;
    fn remove_acl(&self, at: &Instance, entry: &AclEntry) -> Result<()>;

    fn info(&self, at: &Instance) -> Result<InstanceInfo>;
    fn update_certificate(&self, at: &Instance, certificate: &UpdateCertificate) -> Result<()>;
    fn delete_certificate(&self, at: &Instance, name: &str) -> Result<()>;

    fn list_cert_managers(&self, at: &Instance) -> Result<Vec<CertManager>>;
    fn update_cert_manager(&self, at: &Instance, request: &CertManager) -> Result<()>;
    /// Delete by certificate name when given, otherwise every request of the issuer.
    fn delete_cert_manager(&self, at: &Instance, issuer: &str, name: &str) -> Result<()>;

    /// Names of the instance files; contents are left empty.
    fn list_files(&self, at: &Instance) -> Result<Vec<ExtraFile>>;
    fn get_file(&self, at: &Instance, name: &str) -> Result<ExtraFile>;
    /// Fails when a file with the same name exists.
    fn add_files(&self, at: &Instance, files: &[ExtraFile]) -> Result<()>;
    /// Fails when a file does not exist.
    fn update_files(&self, at: &Instance, files: &[ExtraFile]) -> Result<()>;
    fn delete_files(&self, at: &Instance, names: &[String]) -> Result<()>;

    /// `None` when the instance has no autoscaling policy.
    fn get_autoscale(&self, at: &Instance) -> Result<Option<Autoscale>>;
    fn update_autoscale(&self, at: &Instance, autoscale: &Autoscale) -> Result<()>;
    fn remove_autoscale(&self, at: &Instance) -> Result<()>;
}

/// Objects stored for one instance by [`MockBackend`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceData {
    pub routes: Vec<Route>,
    pub blocks: Vec<Block>,
    pub acls: Vec<AclEntry>,
    pub certificates: Vec<UpdateCertificate>,
    pub cert_managers: Vec<CertManager>,
    pub files: Vec<ExtraFile>,
    pub autoscale: Option<Autoscale>,
}

#[derive(Debug, Default)]
struct MockState {
    instances: HashMap<Instance, InstanceData>,
    scripted: HashMap<String, VecDeque<Error>>,
    broken: HashMap<String, Error>,
    calls: HashMap<String, usize>,
}

/// In-memory backend for testing without network access.
///
/// Behaves like the API for the happy path and for missing objects, and
/// can be told to fail specific operations.
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    /// Create a new empty mock backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The error the API returns while another operation holds the instance.
    pub fn lock_error(at: &Instance) -> Error {
        Error::status(
            409,
            format!(
                "failed to lock instance {}: event locked: rpaas-update({})",
                at.name, at.name
            ),
        )
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed or inspect the objects of an instance.
    pub fn with_instance<T>(&self, at: &Instance, f: impl FnOnce(&mut InstanceData) -> T) -> T {
        let mut state = self.state();
        f(state.instances.entry(at.clone()).or_default())
    }

    /// Copy of the objects stored for an instance.
    pub fn snapshot(&self, at: &Instance) -> InstanceData {
        self.state().instances.get(at).cloned().unwrap_or_default()
    }

    /// Fail the next call of `operation` with `err`. Queued errors are
    /// returned in order before the operation succeeds again.
    pub fn fail_next(&self, operation: &str, err: Error) {
        self.state()
            .scripted
            .entry(operation.to_string())
            .or_default()
            .push_back(err);
    }

    /// Fail every call of `operation` with `err`.
    pub fn fail_always(&self, operation: &str, err: Error) {
        self.state().broken.insert(operation.to_string(), err);
    }

    /// Number of times `operation` was invoked, failed calls included.
    pub fn calls(&self, operation: &str) -> usize {
        self.state().calls.get(operation).copied().unwrap_or(0)
    }

    /// Record the call, return any scripted failure, then run `f` on the instance data.
    fn call<T>(
        &self,
        operation: &str,
        at: &Instance,
        f: impl FnOnce(&mut InstanceData) -> Result<T>,
    ) -> Result<T> {
        let mut state = self.state();
        *state.calls.entry(operation.to_string()).or_default() += 1;

        if let Some(err) = state.broken.get(operation) {
            return Err(err.clone());
        }
        if let Some(err) = state.scripted.get_mut(operation).and_then(VecDeque::pop_front) {
            return Err(err);
        }
        f(state.instances.entry(at.clone()).or_default())
    }
}

fn not_found(what: impl std::fmt::Display) -> Error {
    Error::status(404, format!("{what} not found"))
}

fn remove_where<T>(items: &mut Vec<T>, what: String, pred: impl Fn(&T) -> bool) -> Result<()> {
    let before = items.len();
    items.retain(|item| !pred(item));
    if items.len() == before {
        return Err(not_found(what));
    }
    Ok(())
}

impl Backend for MockBackend {
    fn list_routes(&self, at: &Instance) -> Result<Vec<Route>> {
        self.call("list_routes", at, |data| Ok(data.routes.clone()))
    }

    fn update_route(&self, at: &Instance, route: &Route) -> Result<()> {
        self.call("update_route", at, |data| {
            data.routes.retain(|r| r.path != route.path);
            data.routes.push(route.clone());
            Ok(())
        })
    }

    fn delete_route(&self, at: &Instance, path: &str) -> Result<()> {
        self.call("delete_route", at, |data| {
            remove_where(&mut data.routes, format!("route {path}"), |r| r.path == path)
        })
    }

    fn list_blocks(&self, at: &Instance) -> Result<Vec<Block>> {
        self.call("list_blocks", at, |data| Ok(data.blocks.clone()))
    }

    fn update_block(&self, at: &Instance, block: &Block) -> Result<()> {
        self.call("update_block", at, |data| {
            data.blocks
                .retain(|b| !(b.name == block.name && b.server_name == block.server_name));
            data.blocks.push(block.clone());
            Ok(())
        })
    }

    fn delete_block(&self, at: &Instance, server_name: &str, name: &str) -> Result<()> {
        self.call("delete_block", at, |data| {
            remove_where(&mut data.blocks, format!("block {name}"), |b| {
                b.name == name && b.server_name == server_name
            })
        })
    }

    fn list_acls(&self, at: &Instance) -> Result<Vec<AclEntry>> {
        self.call("list_acls", at, |data| Ok(data.acls.clone()))
    }

    fn add_acl(&self, at: &Instance, entry: &AclEntry) -> Result<()> {
        self.call("add_acl", at, |data| {
            if !data.acls.contains(entry) {
                data.acls.push(entry.clone());
            }
            Ok(())
        })
    }

    fn remove_acl(&self, at: &Instance, entry: &AclEntry) -> Result<()> {
        self.call("remove_acl", at, |data| {
            let what = format!("acl {}:{}", entry.host, entry.port);
            remove_where(&mut data.acls, what, |e| e == entry)
        })
    }

    fn info(&self, at: &Instance) -> Result<InstanceInfo> {
        self.call("info", at, |data| {
            Ok(InstanceInfo {
                certificates: data
                    .certificates
                    .iter()
                    .map(|c| CertificateInfo {
                        name: c.name.clone(),
                        ..CertificateInfo::default()
                    })
                    .collect(),
            })
        })
    }

    fn update_certificate(&self, at: &Instance, certificate: &UpdateCertificate) -> Result<()> {
        self.call("update_certificate", at, |data| {
            data.certificates.retain(|c| c.name != certificate.name);
            data.certificates.push(certificate.clone());
            Ok(())
        })
    }

    fn delete_certificate(&self, at: &Instance, name: &str) -> Result<()> {
        self.call("delete_certificate", at, |data| {
            remove_where(&mut data.certificates, format!("certificate {name}"), |c| {
                c.name == name
            })
        })
    }

    fn list_cert_managers(&self, at: &Instance) -> Result<Vec<CertManager>> {
        self.call("list_cert_managers", at, |data| Ok(data.cert_managers.clone()))
    }

    fn update_cert_manager(&self, at: &Instance, request: &CertManager) -> Result<()> {
        self.call("update_cert_manager", at, |data| {
            data.cert_managers
                .retain(|c| !(c.issuer == request.issuer && c.name == request.name));
            data.cert_managers.push(request.clone());
            Ok(())
        })
    }

    fn delete_cert_manager(&self, at: &Instance, issuer: &str, name: &str) -> Result<()> {
        self.call("delete_cert_manager", at, |data| {
            if name.is_empty() {
                remove_where(&mut data.cert_managers, format!("issuer {issuer}"), |c| {
                    c.issuer == issuer
                })
            } else {
                remove_where(&mut data.cert_managers, format!("certificate {name}"), |c| {
                    c.name == name
                })
            }
        })
    }

    fn list_files(&self, at: &Instance) -> Result<Vec<ExtraFile>> {
        self.call("list_files", at, |data| {
            Ok(data
                .files
                .iter()
                .map(|f| ExtraFile {
                    name: f.name.clone(),
                    content: Vec::new(),
                })
                .collect())
        })
    }

    fn get_file(&self, at: &Instance, name: &str) -> Result<ExtraFile> {
        self.call("get_file", at, |data| {
            data.files
                .iter()
                .find(|f| f.name == name)
                .cloned()
                .ok_or_else(|| not_found(format!("file {name}")))
        })
    }

    fn add_files(&self, at: &Instance, files: &[ExtraFile]) -> Result<()> {
        self.call("add_files", at, |data| {
            if let Some(dup) = files.iter().find(|f| data.files.iter().any(|e| e.name == f.name)) {
                return Err(Error::status(409, format!("file {} already exists", dup.name)));
            }
            data.files.extend(files.iter().cloned());
            Ok(())
        })
    }

    fn update_files(&self, at: &Instance, files: &[ExtraFile]) -> Result<()> {
        self.call("update_files", at, |data| {
            for file in files {
                let existing = data
                    .files
                    .iter_mut()
                    .find(|f| f.name == file.name)
                    .ok_or_else(|| not_found(format!("file {}", file.name)))?;
                existing.content = file.content.clone();
            }
            Ok(())
        })
    }

    fn delete_files(&self, at: &Instance, names: &[String]) -> Result<()> {
        self.call("delete_files", at, |data| {
            for name in names {
                remove_where(&mut data.files, format!("file {name}"), |f| &f.name == name)?;
            }
            Ok(())
        })
    }

    fn get_autoscale(&self, at: &Instance) -> Result<Option<Autoscale>> {
        self.call("get_autoscale", at, |data| Ok(data.autoscale.clone()))
    }

    fn update_autoscale(&self, at: &Instance, autoscale: &Autoscale) -> Result<()> {
        self.call("update_autoscale", at, |data| {
            data.autoscale = Some(autoscale.clone());
            Ok(())
        })
    }

    fn remove_autoscale(&self, at: &Instance) -> Result<()> {
        self.call("remove_autoscale", at, |data| {
            data.autoscale
                .take()
                .map(|_| ())
                .ok_or_else(|| not_found("autoscale"))
        })
    }
}
