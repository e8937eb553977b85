//! ACL resource - upstream destinations an instance may reach

use declarative::{
    IdentityScheme, LegacyFormat, ResourceAdapter, ResourceKey, Slot, split_exact,
};
use rpaas_client::{AclEntry, Backend};
use serde::{Deserialize, Serialize};

use super::{ApiFailure, Converge, Kind, Spec, instance_of};

/// Identifier layout for ACL entries
pub const SCHEME: IdentityScheme = IdentityScheme {
    kind: "acl",
    slots: &[Slot::required("host"), Slot::required("port").integer()],
    legacy: &[LegacyFormat {
        shape: "<service>/<instance> <host>:<port>",
        parse: legacy_host_port,
    }],
};

fn legacy_host_port(id: &str) -> Option<ResourceKey> {
    let (instance, target) = id.split_once(' ')?;
    let parts = split_exact(instance, "/", 2)?;
    let (host, port) = target.rsplit_once(':')?;
    if host.is_empty() || port.is_empty() {
        return None;
    }
    Some(ResourceKey::new(parts[0], parts[1]).with(host).with(port))
}

/// An ACL entry as declared in the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclSpec {
    pub service_name: String,
    pub instance: String,
    pub host: String,
    pub port: u16,
}

impl Spec for AclSpec {
    const KIND: Kind = Kind::Acl;

    fn validate(&self) -> anyhow::Result<()> {
        super::require_instance(&self.service_name, &self.instance)?;
        if self.host.is_empty() {
            anyhow::bail!("host must not be empty");
        }
        if self.port == 0 {
            anyhow::bail!("port must be between 1 and 65535");
        }
        Ok(())
    }
}

/// ACL fields read back from the API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclState {
    pub host: String,
    pub port: u16,
}

pub struct AclAdapter<'a> {
    api: &'a dyn Backend,
}

impl<'a> AclAdapter<'a> {
    pub fn new(api: &'a dyn Backend) -> Self {
        Self { api }
    }

    fn entry(key: &ResourceKey) -> Result<AclEntry, ApiFailure> {
        let port = key.discriminator(1).parse::<u16>().map_err(|_| {
            rpaas_client::Error::InvalidConfig(format!(
                "ACL port {:?} is out of range",
                key.discriminator(1)
            ))
        })?;
        Ok(AclEntry {
            host: key.discriminator(0).to_string(),
            port,
        })
    }
}

impl ResourceAdapter for AclAdapter<'_> {
    type Desired = AclSpec;
    type Payload = AclEntry;
    type Remote = AclEntry;
    type Observed = AclState;
    type Error = ApiFailure;

    fn scheme(&self) -> &'static IdentityScheme {
        &SCHEME
    }

    fn key(&self, desired: &AclSpec) -> ResourceKey {
        ResourceKey::new(&desired.service_name, &desired.instance)
            .with(&desired.host)
            .with(desired.port.to_string())
    }

    fn payload(&self, _key: &ResourceKey, desired: &AclSpec) -> declarative::Result<AclEntry> {
        Ok(AclEntry {
            host: desired.host.clone(),
            port: desired.port,
        })
    }

    // Adding an entry that already exists is a no-op on the API side
    fn mutate(&self, key: &ResourceKey, payload: &AclEntry) -> Result<(), ApiFailure> {
        Ok(self.api.add_acl(&instance_of(key), payload)?)
    }

    fn list(&self, key: &ResourceKey) -> Result<Vec<AclEntry>, ApiFailure> {
        Ok(self.api.list_acls(&instance_of(key))?)
    }

    fn discriminators(&self, remote: &AclEntry) -> Vec<String> {
        vec![remote.host.clone(), remote.port.to_string()]
    }

    fn delete(&self, key: &ResourceKey) -> Result<(), ApiFailure> {
        let entry = Self::entry(key)?;
        Ok(self.api.remove_acl(&instance_of(key), &entry)?)
    }

    fn observe(&self, _key: &ResourceKey, remote: AclEntry, _desired: Option<&AclSpec>) -> AclState {
        AclState {
            host: remote.host,
            port: remote.port,
        }
    }
}

impl Converge for AclAdapter<'_> {
    fn drift(&self, observed: &AclState, desired: &AclSpec) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if observed.host != desired.host {
            fields.push("host");
        }
        if observed.port != desired.port {
            fields.push("port");
        }
        fields
    }

    fn describe(&self, observed: &AclState) -> Vec<(&'static str, String)> {
        vec![
            ("host", observed.host.clone()),
            ("port", observed.port.to_string()),
        ]
    }
}
