//! Lifecycle engine - create, read, update and delete through an adapter

use crate::adapter::ResourceAdapter;
use crate::error::{Error, Result};
use crate::identity::{Presence, ResourceKey};
use crate::resolve::{RemoteMatch, fill_from_hint, resolve};
use crate::retry::{RemoteFailure, RetryPolicy, with_retry};
use crate::types::{Managed, Observation, Operation, Timeouts};

/// Drives one resource kind through its lifecycle.
///
/// Every remote call gets its own retry scope bounded by the deadline of
/// the operation it belongs to. Listing calls use the read deadline.
pub struct Reconciler<'a, A: ResourceAdapter> {
    adapter: &'a A,
    timeouts: Timeouts,
    backoff: RetryPolicy,
}

impl<'a, A: ResourceAdapter> Reconciler<'a, A> {
    pub fn new(adapter: &'a A) -> Self {
        Self {
            adapter,
            timeouts: adapter.timeouts(),
            backoff: RetryPolicy::default(),
        }
    }

    /// Override the adapter's deadlines
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Override the backoff schedule. The deadline field is ignored.
    pub fn with_backoff(mut self, backoff: RetryPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    fn kind(&self) -> &'static str {
        self.adapter.scheme().kind
    }

    /// Retry policy for the calls of one operation
    pub fn policy(&self, op: Operation) -> RetryPolicy {
        RetryPolicy {
            deadline: self.timeouts.for_operation(op),
            ..self.backoff.clone()
        }
    }

    /// Create the object and confirm it with a read.
    ///
    /// Nothing is returned for persistence unless both steps succeed.
    pub fn create(&self, desired: &A::Desired) -> Result<Managed<A::Observed>> {
        let scheme = self.adapter.scheme();
        let key = self.adapter.key(desired);
        let id = scheme.encode(&key)?;

        log::info!("Creating {} {key}", self.kind());
        let payload = self.adapter.payload(&key, desired)?;
        with_retry(
            &self.policy(Operation::Create),
            &format!("create {} {id}", self.kind()),
            || self.adapter.mutate(&key, &payload),
        )?;

        self.confirm(key, &id, desired)
    }

    /// Read the object a persisted identifier names.
    ///
    /// Legacy identifiers are accepted; the returned record carries the
    /// canonical identifier to persist instead.
    pub fn read(&self, id: &str, desired: Option<&A::Desired>) -> Result<Observation<A::Observed>> {
        let decoded = self.adapter.scheme().decode(id)?;
        if decoded.is_legacy() {
            log::info!("Found legacy {} identifier {id:?}", self.kind());
        }
        self.observe(decoded.key, id, desired)
    }

    /// Adopt an existing remote object by identifier.
    pub fn import(&self, id: &str) -> Result<Observation<A::Observed>> {
        self.read(id, None)
    }

    /// Push desired state to an existing object, then read it back.
    ///
    /// Identity fields cannot change in place; such an edit fails before any
    /// remote call.
    pub fn update(&self, id: &str, desired: &A::Desired) -> Result<Managed<A::Observed>> {
        let scheme = self.adapter.scheme();
        let current = scheme.decode(id)?.key;
        let key = self.adapter.key(desired);
        self.check_immutable(&current, &key)?;
        scheme.encode(&key)?;

        log::info!("Updating {} {key}", self.kind());
        let payload = self.adapter.payload(&key, desired)?;
        with_retry(
            &self.policy(Operation::Update),
            &format!("update {} {id}", self.kind()),
            || self.adapter.mutate(&key, &payload),
        )?;

        self.confirm(key, id, desired)
    }

    /// Delete the object. An object that is already gone counts as deleted.
    pub fn delete(&self, id: &str) -> Result<()> {
        let scheme = self.adapter.scheme();
        let mut key = scheme.decode(id)?.key;

        if scheme.is_partial(&key) {
            match self.locate(&key)? {
                RemoteMatch::Found { key: resolved, .. } => key = resolved,
                RemoteMatch::Gone => {
                    log::debug!("{} {key} already gone", self.kind());
                    return Ok(());
                }
            }
        }

        log::info!("Deleting {} {key}", self.kind());
        with_retry(
            &self.policy(Operation::Delete),
            &format!("delete {} {id}", self.kind()),
            || match self.adapter.delete(&key) {
                Err(err) if err.is_not_found() => {
                    log::debug!("{} {key} already gone: {err}", self.kind());
                    Ok(())
                }
                other => other,
            },
        )
    }

    fn confirm(&self, key: ResourceKey, id: &str, desired: &A::Desired) -> Result<Managed<A::Observed>> {
        match self.observe(key, id, Some(desired))? {
            Observation::Managed(managed) => Ok(managed),
            Observation::Gone => Err(Error::NotConfirmed {
                kind: self.kind(),
                id: id.to_string(),
            }),
        }
    }

    fn locate(&self, key: &ResourceKey) -> Result<RemoteMatch<A::Remote>> {
        let listing = with_retry(
            &self.policy(Operation::Read),
            &format!("list {} on {}/{}", self.kind(), key.service_name, key.instance_name),
            || self.adapter.list(key),
        )?;
        resolve(self.adapter.scheme(), key, listing, |remote| {
            self.adapter.discriminators(remote)
        })
    }

    fn observe(
        &self,
        mut key: ResourceKey,
        original_id: &str,
        desired: Option<&A::Desired>,
    ) -> Result<Observation<A::Observed>> {
        let scheme = self.adapter.scheme();
        if let Some(desired) = desired
            && scheme.is_partial(&key)
        {
            fill_from_hint(&mut key, &self.adapter.key(desired));
        }

        match self.locate(&key)? {
            RemoteMatch::Gone => {
                log::debug!("{} {key} no longer exists", self.kind());
                Ok(Observation::Gone)
            }
            RemoteMatch::Found { key, remote, .. } => {
                let id = scheme.encode(&key)?;
                let migrated = id != original_id;
                if migrated {
                    log::info!("Migrated {} identifier {original_id:?} to {id:?}", self.kind());
                }
                let observed = self.adapter.observe(&key, remote, desired);
                Ok(Observation::Managed(Managed {
                    id,
                    key,
                    observed,
                    migrated,
                }))
            }
        }
    }

    fn check_immutable(&self, current: &ResourceKey, desired: &ResourceKey) -> Result<()> {
        let scheme = self.adapter.scheme();
        let identity = [
            ("service_name", &current.service_name, &desired.service_name),
            ("instance", &current.instance_name, &desired.instance_name),
        ];
        for (field, from, to) in identity {
            if from != to {
                return Err(Error::ImmutableFieldChanged {
                    field,
                    from: from.clone(),
                    to: to.clone(),
                });
            }
        }

        // empty slots of a legacy key are unknown, not values
        let partial = scheme.is_partial(current);
        for (i, slot) in scheme.slots.iter().enumerate() {
            let from = current.discriminator(i);
            let to = desired.discriminator(i);
            let unknown = from.is_empty() && (partial || slot.presence == Presence::Wildcard);
            if !unknown && from != to {
                return Err(Error::ImmutableFieldChanged {
                    field: slot.name,
                    from: from.to_string(),
                    to: to.to_string(),
                });
            }
        }
        Ok(())
    }
}
