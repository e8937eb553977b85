//! Cert-manager resource - certificates requested from an issuer

use declarative::{
    IdentityScheme, LegacyFormat, ResourceAdapter, ResourceKey, Slot, split_exact,
};
use rpaas_client::{Backend, CertManager};
use serde::{Deserialize, Serialize};

use super::{ApiFailure, Converge, Kind, Spec, instance_of};

/// Identifier layout for cert-manager requests.
///
/// An empty certificate name matches whatever the issuer produced.
pub const SCHEME: IdentityScheme = IdentityScheme {
    kind: "cert_manager",
    slots: &[Slot::required("issuer"), Slot::wildcard("certificate_name")],
    legacy: &[LegacyFormat {
        shape: "<service> <instance> <issuer>",
        parse: legacy_spaced,
    }],
};

fn legacy_spaced(id: &str) -> Option<ResourceKey> {
    let parts = split_exact(id, " ", 3)?;
    Some(ResourceKey::new(parts[0], parts[1]).with(parts[2]))
}

/// A cert-manager request as declared in the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertManagerSpec {
    pub service_name: String,
    pub instance: String,
    pub issuer: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub certificate_name: String,
    pub dns_names: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ip_addresses: Vec<String>,
}

impl Spec for CertManagerSpec {
    const KIND: Kind = Kind::CertManager;

    fn validate(&self) -> anyhow::Result<()> {
        super::require_instance(&self.service_name, &self.instance)?;
        if self.issuer.is_empty() {
            anyhow::bail!("issuer must not be empty");
        }
        if self.dns_names.is_empty() {
            anyhow::bail!("dns_names must list at least one name");
        }
        if let Some(blank) = self.dns_names.iter().find(|n| n.trim().is_empty()) {
            anyhow::bail!("dns_names contains an empty entry {blank:?}");
        }
        Ok(())
    }
}

/// Cert-manager request read back from the API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertManagerState {
    pub issuer: String,
    pub certificate_name: String,
    pub dns_names: Vec<String>,
    pub ip_addresses: Vec<String>,
}

pub struct CertManagerAdapter<'a> {
    api: &'a dyn Backend,
}

impl<'a> CertManagerAdapter<'a> {
    pub fn new(api: &'a dyn Backend) -> Self {
        Self { api }
    }
}

impl ResourceAdapter for CertManagerAdapter<'_> {
    type Desired = CertManagerSpec;
    type Payload = CertManager;
    type Remote = CertManager;
    type Observed = CertManagerState;
    type Error = ApiFailure;

    fn scheme(&self) -> &'static IdentityScheme {
        &SCHEME
    }

    fn key(&self, desired: &CertManagerSpec) -> ResourceKey {
        ResourceKey::new(&desired.service_name, &desired.instance)
            .with(&desired.issuer)
            .with(&desired.certificate_name)
    }

    fn payload(&self, key: &ResourceKey, desired: &CertManagerSpec) -> declarative::Result<CertManager> {
        Ok(CertManager {
            issuer: key.discriminator(0).to_string(),
            name: key.discriminator(1).to_string(),
            dns_names: desired.dns_names.clone(),
            ip_addresses: desired.ip_addresses.clone(),
        })
    }

    fn mutate(&self, key: &ResourceKey, payload: &CertManager) -> Result<(), ApiFailure> {
        Ok(self.api.update_cert_manager(&instance_of(key), payload)?)
    }

    fn list(&self, key: &ResourceKey) -> Result<Vec<CertManager>, ApiFailure> {
        Ok(self.api.list_cert_managers(&instance_of(key))?)
    }

    fn discriminators(&self, remote: &CertManager) -> Vec<String> {
        vec![remote.issuer.clone(), remote.name.clone()]
    }

    fn delete(&self, key: &ResourceKey) -> Result<(), ApiFailure> {
        Ok(self.api.delete_cert_manager(
            &instance_of(key),
            key.discriminator(0),
            key.discriminator(1),
        )?)
    }

    fn observe(
        &self,
        _key: &ResourceKey,
        remote: CertManager,
        _desired: Option<&CertManagerSpec>,
    ) -> CertManagerState {
        CertManagerState {
            issuer: remote.issuer,
            certificate_name: remote.name,
            dns_names: remote.dns_names,
            ip_addresses: remote.ip_addresses,
        }
    }
}

impl Converge for CertManagerAdapter<'_> {
    fn drift(&self, observed: &CertManagerState, desired: &CertManagerSpec) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if observed.issuer != desired.issuer {
            fields.push("issuer");
        }
        if !desired.certificate_name.is_empty()
            && observed.certificate_name != desired.certificate_name
        {
            fields.push("certificate_name");
        }
        if observed.dns_names != desired.dns_names {
            fields.push("dns_names");
        }
        if observed.ip_addresses != desired.ip_addresses {
            fields.push("ip_addresses");
        }
        fields
    }

    fn describe(&self, observed: &CertManagerState) -> Vec<(&'static str, String)> {
        let mut out = vec![("issuer", observed.issuer.clone())];
        if !observed.certificate_name.is_empty() {
            out.push(("certificate_name", observed.certificate_name.clone()));
        }
        out.push(("dns_names", observed.dns_names.join(", ")));
        if !observed.ip_addresses.is_empty() {
            out.push(("ip_addresses", observed.ip_addresses.join(", ")));
        }
        out
    }
}
