//! Route resource - custom locations on an instance

use std::time::Duration;

use declarative::{
    IdentityScheme, LegacyFormat, ResourceAdapter, ResourceKey, Slot, Timeouts,
};
use rpaas_client::{Backend, Route};
use serde::{Deserialize, Serialize};

use super::{ApiFailure, Converge, Kind, Spec, exactly_one, instance_of, legacy_instance_pair};

/// Identifier layout for routes
pub const SCHEME: IdentityScheme = IdentityScheme {
    kind: "route",
    slots: &[Slot::required("path")],
    legacy: &[LegacyFormat {
        shape: "<service>/<instance>",
        parse: legacy_instance_pair,
    }],
};

/// A route as declared in the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteSpec {
    pub service_name: String,
    pub instance: String,
    pub path: String,
    /// Upstream to proxy to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    /// Literal NGINX configuration for the location
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default)]
    pub https_only: bool,
}

impl Spec for RouteSpec {
    const KIND: Kind = Kind::Route;

    fn validate(&self) -> anyhow::Result<()> {
        super::require_instance(&self.service_name, &self.instance)?;
        if self.path.is_empty() {
            anyhow::bail!("path must not be empty");
        }
        exactly_one(
            ("destination", self.destination.as_deref().is_some_and(|d| !d.is_empty())),
            ("content", self.content.as_deref().is_some_and(|c| !c.is_empty())),
        )
    }
}

/// Route fields read back from the API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteState {
    pub path: String,
    pub destination: String,
    pub content: String,
    pub https_only: bool,
}

pub struct RouteAdapter<'a> {
    api: &'a dyn Backend,
}

impl<'a> RouteAdapter<'a> {
    pub fn new(api: &'a dyn Backend) -> Self {
        Self { api }
    }
}

impl ResourceAdapter for RouteAdapter<'_> {
    type Desired = RouteSpec;
    type Payload = Route;
    type Remote = Route;
    type Observed = RouteState;
    type Error = ApiFailure;

    fn scheme(&self) -> &'static IdentityScheme {
        &SCHEME
    }

    // Route changes roll out the whole instance
    fn timeouts(&self) -> Timeouts {
        Timeouts {
            create: Duration::from_secs(40 * 60),
            update: Duration::from_secs(80 * 60),
            delete: Duration::from_secs(40 * 60),
            ..Timeouts::default()
        }
    }

    fn key(&self, desired: &RouteSpec) -> ResourceKey {
        ResourceKey::new(&desired.service_name, &desired.instance).with(&desired.path)
    }

    fn payload(&self, key: &ResourceKey, desired: &RouteSpec) -> declarative::Result<Route> {
        Ok(Route {
            path: key.discriminator(0).to_string(),
            destination: desired.destination.clone().unwrap_or_default(),
            content: desired.content.clone().unwrap_or_default(),
            https_only: desired.https_only,
        })
    }

    fn mutate(&self, key: &ResourceKey, payload: &Route) -> Result<(), ApiFailure> {
        Ok(self.api.update_route(&instance_of(key), payload)?)
    }

    fn list(&self, key: &ResourceKey) -> Result<Vec<Route>, ApiFailure> {
        Ok(self.api.list_routes(&instance_of(key))?)
    }

    fn discriminators(&self, remote: &Route) -> Vec<String> {
        vec![remote.path.clone()]
    }

    fn delete(&self, key: &ResourceKey) -> Result<(), ApiFailure> {
        Ok(self.api.delete_route(&instance_of(key), key.discriminator(0))?)
    }

    fn observe(&self, _key: &ResourceKey, remote: Route, _desired: Option<&RouteSpec>) -> RouteState {
        RouteState {
            path: remote.path,
            destination: remote.destination,
            content: remote.content,
            https_only: remote.https_only,
        }
    }
}

impl Converge for RouteAdapter<'_> {
    fn drift(&self, observed: &RouteState, desired: &RouteSpec) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if observed.path != desired.path {
            fields.push("path");
        }
        if observed.destination != desired.destination.as_deref().unwrap_or_default() {
            fields.push("destination");
        }
        if observed.content != desired.content.as_deref().unwrap_or_default() {
            fields.push("content");
        }
        if observed.https_only != desired.https_only {
            fields.push("https_only");
        }
        fields
    }

    fn describe(&self, observed: &RouteState) -> Vec<(&'static str, String)> {
        let mut out = vec![("path", observed.path.clone())];
        if observed.destination.is_empty() {
            out.push(("content", crate::ui::payload_size(observed.content.len())));
        } else {
            out.push(("destination", observed.destination.clone()));
        }
        out.push(("https_only", observed.https_only.to_string()));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::{Observation, Reconciler};
    use rpaas_client::{Instance, MockBackend};

    fn spec(path: &str) -> RouteSpec {
        RouteSpec {
            service_name: "rpaasv2-be".into(),
            instance: "my-rpaas".into(),
            path: path.into(),
            destination: Some("app1.tsuru.example.com".into()),
            content: None,
            https_only: false,
        }
    }

    fn at() -> Instance {
        Instance::new("rpaasv2-be", "my-rpaas")
    }

    #[test]
    fn test_validate_requires_exactly_one_target() {
        assert!(spec("/").validate().is_ok());

        let mut both = spec("/");
        both.content = Some("# nginx".into());
        assert!(both.validate().is_err());

        let mut neither = spec("/");
        neither.destination = None;
        assert!(neither.validate().is_err());

        let mut empty_destination = spec("/");
        empty_destination.destination = Some(String::new());
        assert!(empty_destination.validate().is_err());
    }

    #[test]
    fn test_route_timeouts() {
        let api = MockBackend::new();
        let timeouts = RouteAdapter::new(&api).timeouts();
        assert_eq!(timeouts.create, Duration::from_secs(2400));
        assert_eq!(timeouts.read, declarative::types::DEFAULT_TIMEOUT);
        assert_eq!(timeouts.update, Duration::from_secs(4800));
        assert_eq!(timeouts.delete, Duration::from_secs(2400));
    }

    #[test]
    fn test_create_and_read_back() {
        let api = MockBackend::new();
        let adapter = RouteAdapter::new(&api);
        let reconciler = Reconciler::new(&adapter);

        let managed = reconciler.create(&spec("/")).unwrap();
        assert_eq!(managed.id, "rpaasv2-be::my-rpaas::/");
        assert_eq!(managed.observed.destination, "app1.tsuru.example.com");
        assert!(adapter.drift(&managed.observed, &spec("/")).is_empty());
        assert_eq!(api.snapshot(&at()).routes.len(), 1);
    }

    #[test]
    fn test_legacy_pair_backfills_path() {
        let api = MockBackend::new();
        api.with_instance(&at(), |data| {
            data.routes.push(Route {
                path: "/path/1".into(),
                destination: "app1.tsuru.example.com".into(),
                ..Route::default()
            });
        });
        let adapter = RouteAdapter::new(&api);

        let observation = Reconciler::new(&adapter)
            .import("rpaasv2-be/my-rpaas")
            .unwrap();
        let managed = observation.managed().unwrap();
        assert_eq!(managed.id, "rpaasv2-be::my-rpaas::/path/1");
        assert!(managed.migrated);
    }

    #[test]
    fn test_drift_detects_content_switch() {
        let api = MockBackend::new();
        let adapter = RouteAdapter::new(&api);
        let observed = RouteState {
            path: "/".into(),
            destination: "app1.tsuru.example.com".into(),
            content: String::new(),
            https_only: true,
        };

        let mut desired = spec("/");
        desired.destination = None;
        desired.content = Some("return 200;".into());
        assert_eq!(
            adapter.drift(&observed, &desired),
            vec!["destination", "content", "https_only"]
        );
    }

    #[test]
    fn test_removed_route_reads_as_gone() {
        let api = MockBackend::new();
        let adapter = RouteAdapter::new(&api);
        let reconciler = Reconciler::new(&adapter);
        let managed = reconciler.create(&spec("/")).unwrap();

        api.with_instance(&at(), |data| data.routes.clear());
        assert_eq!(reconciler.read(&managed.id, Some(&spec("/"))).unwrap(), Observation::Gone);
    }
}
