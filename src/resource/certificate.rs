//! Certificate resource - TLS certificates uploaded to an instance
//!
//! The API never returns certificate bodies, so the only observable state
//! is whether a certificate with the name exists. Content changes are
//! caught by comparing the configuration digest kept in state.

use std::fmt;

use declarative::{
    IdentityScheme, LegacyFormat, ResourceAdapter, ResourceKey, Slot, split_exact,
};
use rpaas_client::{Backend, CertificateInfo, UpdateCertificate};
use serde::{Deserialize, Serialize};

use super::{ApiFailure, Converge, Kind, Spec, instance_of};

/// Identifier layout for certificates
pub const SCHEME: IdentityScheme = IdentityScheme {
    kind: "certificate",
    slots: &[Slot::required("name")],
    legacy: &[LegacyFormat {
        shape: "<service> <instance> <name>",
        parse: legacy_spaced,
    }],
};

fn legacy_spaced(id: &str) -> Option<ResourceKey> {
    let parts = split_exact(id, " ", 3)?;
    Some(ResourceKey::new(parts[0], parts[1]).with(parts[2]))
}

/// A certificate as declared in the manifest
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateSpec {
    pub service_name: String,
    pub instance: String,
    pub name: String,
    /// PEM-encoded certificate chain
    pub certificate: String,
    /// PEM-encoded private key
    pub key: String,
}

impl fmt::Debug for CertificateSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateSpec")
            .field("service_name", &self.service_name)
            .field("instance", &self.instance)
            .field("name", &self.name)
            .field("certificate", &format_args!("{} bytes", self.certificate.len()))
            .field("key", &"<redacted>")
            .finish()
    }
}

impl Spec for CertificateSpec {
    const KIND: Kind = Kind::Certificate;

    fn validate(&self) -> anyhow::Result<()> {
        super::require_instance(&self.service_name, &self.instance)?;
        if self.name.is_empty() {
            anyhow::bail!("name must not be empty");
        }
        if self.certificate.trim().is_empty() {
            anyhow::bail!("certificate must not be empty");
        }
        if self.key.trim().is_empty() {
            anyhow::bail!("key must not be empty");
        }
        Ok(())
    }
}

/// Certificate summary read back from the API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateState {
    pub name: String,
    pub dns_names: Vec<String>,
    pub valid_until: String,
}

pub struct CertificateAdapter<'a> {
    api: &'a dyn Backend,
}

impl<'a> CertificateAdapter<'a> {
    pub fn new(api: &'a dyn Backend) -> Self {
        Self { api }
    }
}

impl ResourceAdapter for CertificateAdapter<'_> {
    type Desired = CertificateSpec;
    type Payload = UpdateCertificate;
    type Remote = CertificateInfo;
    type Observed = CertificateState;
    type Error = ApiFailure;

    fn scheme(&self) -> &'static IdentityScheme {
        &SCHEME
    }

    fn key(&self, desired: &CertificateSpec) -> ResourceKey {
        ResourceKey::new(&desired.service_name, &desired.instance).with(&desired.name)
    }

    fn payload(&self, key: &ResourceKey, desired: &CertificateSpec) -> declarative::Result<UpdateCertificate> {
        Ok(UpdateCertificate {
            name: key.discriminator(0).to_string(),
            certificate: desired.certificate.clone(),
            key: desired.key.clone(),
        })
    }

    fn mutate(&self, key: &ResourceKey, payload: &UpdateCertificate) -> Result<(), ApiFailure> {
        Ok(self.api.update_certificate(&instance_of(key), payload)?)
    }

    fn list(&self, key: &ResourceKey) -> Result<Vec<CertificateInfo>, ApiFailure> {
        Ok(self.api.info(&instance_of(key))?.certificates)
    }

    fn discriminators(&self, remote: &CertificateInfo) -> Vec<String> {
        vec![remote.name.clone()]
    }

    fn delete(&self, key: &ResourceKey) -> Result<(), ApiFailure> {
        Ok(self.api.delete_certificate(&instance_of(key), key.discriminator(0))?)
    }

    fn observe(
        &self,
        _key: &ResourceKey,
        remote: CertificateInfo,
        _desired: Option<&CertificateSpec>,
    ) -> CertificateState {
        CertificateState {
            name: remote.name,
            dns_names: remote.dns_names,
            valid_until: remote.valid_until,
        }
    }
}

impl Converge for CertificateAdapter<'_> {
    fn drift(&self, observed: &CertificateState, desired: &CertificateSpec) -> Vec<&'static str> {
        if observed.name == desired.name {
            Vec::new()
        } else {
            vec!["name"]
        }
    }

    fn describe(&self, observed: &CertificateState) -> Vec<(&'static str, String)> {
        let mut out = vec![("name", observed.name.clone())];
        if !observed.dns_names.is_empty() {
            out.push(("dns_names", observed.dns_names.join(", ")));
        }
        if !observed.valid_until.is_empty() {
            out.push(("valid_until", observed.valid_until.clone()));
        }
        out
    }
}
