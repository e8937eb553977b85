//! Autoscale resource - one policy per instance

use declarative::{IdentityScheme, LegacyFormat, ResourceAdapter, ResourceKey};
use rpaas_client::{Autoscale, Backend, ScheduledWindow};
use serde::{Deserialize, Serialize};

use super::{ApiFailure, Converge, Kind, Spec, instance_of, legacy_instance_pair};

/// Identifier layout for autoscale policies
pub const SCHEME: IdentityScheme = IdentityScheme {
    kind: "autoscale",
    slots: &[],
    legacy: &[LegacyFormat {
        shape: "<service>/<instance>",
        parse: legacy_instance_pair,
    }],
};

/// Cron window as declared in the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSpec {
    pub min_replicas: i32,
    /// Cron expression opening the window
    pub start: String,
    /// Cron expression closing the window
    pub end: String,
}

/// An autoscale policy as declared in the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoscaleSpec {
    pub service_name: String,
    pub instance: String,
    pub min_replicas: i32,
    pub max_replicas: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_cpu_utilization_percentage: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_requests_per_second: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scheduled_window: Vec<WindowSpec>,
}

impl Spec for AutoscaleSpec {
    const KIND: Kind = Kind::Autoscale;

    fn validate(&self) -> anyhow::Result<()> {
        super::require_instance(&self.service_name, &self.instance)?;
        if self.min_replicas < 0 {
            anyhow::bail!("min_replicas must not be negative");
        }
        if self.min_replicas > self.max_replicas {
            anyhow::bail!(
                "min_replicas ({}) must not exceed max_replicas ({})",
                self.min_replicas,
                self.max_replicas
            );
        }
        for window in &self.scheduled_window {
            if window.start.trim().is_empty() || window.end.trim().is_empty() {
                anyhow::bail!("scheduled_window needs both start and end");
            }
        }
        Ok(())
    }
}

/// Autoscale policy read back from the API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoscaleState {
    pub min_replicas: i32,
    pub max_replicas: i32,
    pub target_cpu_utilization_percentage: Option<i32>,
    pub target_requests_per_second: Option<i32>,
    pub scheduled_window: Vec<WindowSpec>,
}

pub struct AutoscaleAdapter<'a> {
    api: &'a dyn Backend,
}

impl<'a> AutoscaleAdapter<'a> {
    pub fn new(api: &'a dyn Backend) -> Self {
        Self { api }
    }
}

impl ResourceAdapter for AutoscaleAdapter<'_> {
    type Desired = AutoscaleSpec;
    type Payload = Autoscale;
    type Remote = Autoscale;
    type Observed = AutoscaleState;
    type Error = ApiFailure;

    fn scheme(&self) -> &'static IdentityScheme {
        &SCHEME
    }

    fn key(&self, desired: &AutoscaleSpec) -> ResourceKey {
        ResourceKey::new(&desired.service_name, &desired.instance)
    }

    fn payload(&self, _key: &ResourceKey, desired: &AutoscaleSpec) -> declarative::Result<Autoscale> {
        Ok(Autoscale {
            min_replicas: Some(desired.min_replicas),
            max_replicas: Some(desired.max_replicas),
            target_cpu_utilization_percentage: desired.target_cpu_utilization_percentage,
            target_requests_per_second: desired.target_requests_per_second,
            scheduled_windows: desired
                .scheduled_window
                .iter()
                .map(|w| ScheduledWindow {
                    min_replicas: w.min_replicas,
                    start: w.start.clone(),
                    end: w.end.clone(),
                })
                .collect(),
        })
    }

    fn mutate(&self, key: &ResourceKey, payload: &Autoscale) -> Result<(), ApiFailure> {
        Ok(self.api.update_autoscale(&instance_of(key), payload)?)
    }

    fn list(&self, key: &ResourceKey) -> Result<Vec<Autoscale>, ApiFailure> {
        Ok(self.api.get_autoscale(&instance_of(key))?.into_iter().collect())
    }

    fn discriminators(&self, _remote: &Autoscale) -> Vec<String> {
        Vec::new()
    }

    fn delete(&self, key: &ResourceKey) -> Result<(), ApiFailure> {
        Ok(self.api.remove_autoscale(&instance_of(key))?)
    }

    fn observe(
        &self,
        _key: &ResourceKey,
        remote: Autoscale,
        _desired: Option<&AutoscaleSpec>,
    ) -> AutoscaleState {
        AutoscaleState {
            min_replicas: remote.min_replicas.unwrap_or_default(),
            max_replicas: remote.max_replicas.unwrap_or_default(),
            target_cpu_utilization_percentage: remote.target_cpu_utilization_percentage,
            target_requests_per_second: remote.target_requests_per_second,
            scheduled_window: remote
                .scheduled_windows
                .into_iter()
                .map(|w| WindowSpec {
                    min_replicas: w.min_replicas,
                    start: w.start,
                    end: w.end,
                })
                .collect(),
        }
    }
}

impl Converge for AutoscaleAdapter<'_> {
    fn drift(&self, observed: &AutoscaleState, desired: &AutoscaleSpec) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if observed.min_replicas != desired.min_replicas {
            fields.push("min_replicas");
        }
        if observed.max_replicas != desired.max_replicas {
            fields.push("max_replicas");
        }
        if observed.target_cpu_utilization_percentage != desired.target_cpu_utilization_percentage
        {
            fields.push("target_cpu_utilization_percentage");
        }
        if observed.target_requests_per_second != desired.target_requests_per_second {
            fields.push("target_requests_per_second");
        }
        if observed.scheduled_window != desired.scheduled_window {
            fields.push("scheduled_window");
        }
        fields
    }

    fn describe(&self, observed: &AutoscaleState) -> Vec<(&'static str, String)> {
        let mut out = vec![(
            "replicas",
            format!("{}..{}", observed.min_replicas, observed.max_replicas),
        )];
        if let Some(cpu) = observed.target_cpu_utilization_percentage {
            out.push(("target_cpu_utilization_percentage", format!("{cpu}%")));
        }
        if let Some(rps) = observed.target_requests_per_second {
            out.push(("target_requests_per_second", rps.to_string()));
        }
        for window in &observed.scheduled_window {
            out.push((
                "scheduled_window",
                format!("{} replicas from '{}' to '{}'", window.min_replicas, window.start, window.end),
            ));
        }
        out
    }
}
