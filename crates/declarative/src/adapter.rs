//! Per-kind adapter trait
//!
//! An adapter knows how one kind of remote object is addressed, listed,
//! written and removed. The [`Reconciler`](crate::Reconciler) drives every
//! kind through the same lifecycle on top of it.

use crate::identity::{IdentityScheme, ResourceKey};
use crate::retry::RemoteFailure;
use crate::types::Timeouts;

/// Core trait for a reconcilable resource kind
///
/// # Example
///
/// ```ignore
/// impl ResourceAdapter for RouteAdapter<'_> {
///     type Desired = RouteSpec;
///     type Payload = UpdateRouteArgs;
///     type Remote = Route;
///     type Observed = RouteState;
///     type Error = ApiFailure;
///
///     fn scheme(&self) -> &'static IdentityScheme { &ROUTE }
///
///     fn key(&self, desired: &RouteSpec) -> ResourceKey {
///         ResourceKey::new(&desired.service_name, &desired.instance).with(&desired.path)
///     }
///     // ...
/// }
/// ```
pub trait ResourceAdapter {
    /// Typed desired-state record
    type Desired;
    /// Request body of the upsert call
    type Payload;
    /// Object as returned by the list call
    type Remote;
    /// Fields reported back to state
    type Observed;
    /// Error of the underlying client
    type Error: RemoteFailure;

    /// Identifier layout of this kind
    fn scheme(&self) -> &'static IdentityScheme;

    /// Per-operation deadlines
    fn timeouts(&self) -> Timeouts {
        Timeouts::default()
    }

    /// Key named by the desired state. Discriminators come straight from
    /// configuration; nothing is invented.
    fn key(&self, desired: &Self::Desired) -> ResourceKey;

    /// Build the mutation payload. Desired state the remote cannot be sent
    /// is rejected with [`Error::InvalidDesired`](crate::Error::InvalidDesired).
    fn payload(&self, key: &ResourceKey, desired: &Self::Desired) -> crate::Result<Self::Payload>;

    /// Create or update the remote object. The same call serves both.
    fn mutate(&self, key: &ResourceKey, payload: &Self::Payload) -> Result<(), Self::Error>;

    /// Remote objects of this kind on the key's instance.
    ///
    /// Adapters may narrow the listing using the key's known discriminators.
    fn list(&self, key: &ResourceKey) -> Result<Vec<Self::Remote>, Self::Error>;

    /// Discriminators of a remote object, in scheme order
    fn discriminators(&self, remote: &Self::Remote) -> Vec<String>;

    /// Remove the remote object named by a fully resolved key
    fn delete(&self, key: &ResourceKey) -> Result<(), Self::Error>;

    /// Convert the matched remote object into reportable fields.
    ///
    /// `desired` is the configuration being applied, when there is one.
    fn observe(
        &self,
        key: &ResourceKey,
        remote: Self::Remote,
        desired: Option<&Self::Desired>,
    ) -> Self::Observed;
}
