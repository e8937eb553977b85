//! Per-kind dispatch
//!
//! The lifecycle is generic over the adapter; the manifest and the state
//! file are not. [`dispatch`] builds the adapter for a kind and hands it,
//! with the matching desired spec, to a [`Visit`] implementation.

use declarative::{ErrorCategory, Reconciler, ResourceAdapter, RetryPolicy};
use rpaas_client::Backend;

use crate::manifest::{Desired, TimeoutOverrides};
use crate::resource::acl::AclAdapter;
use crate::resource::autoscale::AutoscaleAdapter;
use crate::resource::block::BlockAdapter;
use crate::resource::cert_manager::CertManagerAdapter;
use crate::resource::certificate::CertificateAdapter;
use crate::resource::file::FileAdapter;
use crate::resource::route::RouteAdapter;
use crate::resource::{ApiFailure, Converge, Kind};

/// Work performed with a concrete adapter
pub trait Visit {
    type Output;

    fn visit<A: Converge>(self, adapter: &A, desired: Option<&A::Desired>) -> Self::Output;
}

/// Run `visitor` with the adapter for `kind`.
///
/// `desired` is passed through when it belongs to the same kind.
pub fn dispatch<V: Visit>(
    api: &dyn Backend,
    kind: Kind,
    desired: Option<&Desired>,
    visitor: V,
) -> V::Output {
    match (kind, desired) {
        (Kind::Route, Some(Desired::Route(spec))) => visitor.visit(&RouteAdapter::new(api), Some(spec)),
        (Kind::Route, _) => visitor.visit(&RouteAdapter::new(api), None),
        (Kind::Block, Some(Desired::Block(spec))) => visitor.visit(&BlockAdapter::new(api), Some(spec)),
        (Kind::Block, _) => visitor.visit(&BlockAdapter::new(api), None),
        (Kind::Acl, Some(Desired::Acl(spec))) => visitor.visit(&AclAdapter::new(api), Some(spec)),
        (Kind::Acl, _) => visitor.visit(&AclAdapter::new(api), None),
        (Kind::Certificate, Some(Desired::Certificate(spec))) => {
            visitor.visit(&CertificateAdapter::new(api), Some(spec))
        }
        (Kind::Certificate, _) => visitor.visit(&CertificateAdapter::new(api), None),
        (Kind::CertManager, Some(Desired::CertManager(spec))) => {
            visitor.visit(&CertManagerAdapter::new(api), Some(spec))
        }
        (Kind::CertManager, _) => visitor.visit(&CertManagerAdapter::new(api), None),
        (Kind::File, Some(Desired::File(spec))) => visitor.visit(&FileAdapter::new(api), Some(spec)),
        (Kind::File, _) => visitor.visit(&FileAdapter::new(api), None),
        (Kind::Autoscale, Some(Desired::Autoscale(spec))) => {
            visitor.visit(&AutoscaleAdapter::new(api), Some(spec))
        }
        (Kind::Autoscale, _) => visitor.visit(&AutoscaleAdapter::new(api), None),
    }
}

/// API handle plus the knobs every lifecycle call shares
#[derive(Clone)]
pub struct Session<'a> {
    pub api: &'a dyn Backend,
    pub backoff: RetryPolicy,
}

impl<'a> Session<'a> {
    pub fn new(api: &'a dyn Backend) -> Self {
        Self {
            api,
            backoff: RetryPolicy::default(),
        }
    }

    /// Override the lock-conflict backoff schedule
    pub fn with_backoff(mut self, backoff: RetryPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Reconciler for one record, with its deadline overrides applied
    pub fn reconciler<'b, A: ResourceAdapter>(
        &self,
        adapter: &'b A,
        timeouts: &TimeoutOverrides,
    ) -> Reconciler<'b, A> {
        Reconciler::new(adapter)
            .with_timeouts(timeouts.apply(adapter.timeouts()))
            .with_backoff(self.backoff.clone())
    }
}

/// Render a core error with its category and advice.
///
/// Remote failures are described by the API error behind them.
pub fn describe_error(err: &declarative::Error) -> String {
    let category = err.category();
    if category == ErrorCategory::Remote
        && let Some(ApiFailure(api)) = err.remote().and_then(|e| e.downcast_ref::<ApiFailure>())
    {
        let api_category = api.category();
        return format!("{err} ({api_category}). {}", api_category.advice());
    }
    format!("{err} ({category}). {}", category.advice())
}
