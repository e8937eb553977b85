//! Block resource - NGINX configuration fragments

use declarative::{
    IdentityScheme, LegacyFormat, ResourceAdapter, ResourceKey, Slot, split_exact,
};
use rpaas_client::{Backend, Block};
use serde::{Deserialize, Serialize};

use super::{ApiFailure, Converge, Kind, Spec, instance_of, legacy_instance_pair};

/// Injection points the API accepts
pub const BLOCK_NAMES: [&str; 5] = ["root", "http", "server", "lua-server", "lua-worker"];

/// Identifier layout for blocks
pub const SCHEME: IdentityScheme = IdentityScheme {
    kind: "block",
    slots: &[Slot::optional("server_name"), Slot::required("name")],
    legacy: &[
        LegacyFormat {
            shape: "<service>/<instance>/<name>",
            parse: legacy_named,
        },
        LegacyFormat {
            shape: "<service>/<instance>",
            parse: legacy_instance_pair,
        },
    ],
};

fn legacy_named(id: &str) -> Option<ResourceKey> {
    let parts = split_exact(id, "/", 3)?;
    Some(ResourceKey::new(parts[0], parts[1]).with("").with(parts[2]))
}

/// A block as declared in the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSpec {
    pub service_name: String,
    pub instance: String,
    pub name: String,
    /// Restrict the block to one server
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub server_name: String,
    pub content: String,
    #[serde(default)]
    pub extend: bool,
}

impl Spec for BlockSpec {
    const KIND: Kind = Kind::Block;

    fn validate(&self) -> anyhow::Result<()> {
        super::require_instance(&self.service_name, &self.instance)?;
        if !BLOCK_NAMES.contains(&self.name.as_str()) {
            anyhow::bail!(
                "invalid block name '{}' (expected one of: {})",
                self.name,
                BLOCK_NAMES.join(", ")
            );
        }
        if self.extend && self.server_name.is_empty() {
            log::warn!("block {}: extend has no effect without server_name", self.name);
        }
        Ok(())
    }
}

/// Block fields read back from the API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockState {
    pub name: String,
    pub server_name: String,
    pub content: String,
    pub extend: bool,
}

pub struct BlockAdapter<'a> {
    api: &'a dyn Backend,
}

impl<'a> BlockAdapter<'a> {
    pub fn new(api: &'a dyn Backend) -> Self {
        Self { api }
    }
}

impl ResourceAdapter for BlockAdapter<'_> {
    type Desired = BlockSpec;
    type Payload = Block;
    type Remote = Block;
    type Observed = BlockState;
    type Error = ApiFailure;

    fn scheme(&self) -> &'static IdentityScheme {
        &SCHEME
    }

    fn key(&self, desired: &BlockSpec) -> ResourceKey {
        ResourceKey::new(&desired.service_name, &desired.instance)
            .with(&desired.server_name)
            .with(&desired.name)
    }

    fn payload(&self, key: &ResourceKey, desired: &BlockSpec) -> declarative::Result<Block> {
        Ok(Block {
            name: key.discriminator(1).to_string(),
            server_name: key.discriminator(0).to_string(),
            content: desired.content.clone(),
            extend: desired.extend,
        })
    }

    fn mutate(&self, key: &ResourceKey, payload: &Block) -> Result<(), ApiFailure> {
        Ok(self.api.update_block(&instance_of(key), payload)?)
    }

    fn list(&self, key: &ResourceKey) -> Result<Vec<Block>, ApiFailure> {
        Ok(self.api.list_blocks(&instance_of(key))?)
    }

    fn discriminators(&self, remote: &Block) -> Vec<String> {
        vec![remote.server_name.clone(), remote.name.clone()]
    }

    fn delete(&self, key: &ResourceKey) -> Result<(), ApiFailure> {
        Ok(self.api.delete_block(
            &instance_of(key),
            key.discriminator(0),
            key.discriminator(1),
        )?)
    }

    fn observe(&self, _key: &ResourceKey, remote: Block, _desired: Option<&BlockSpec>) -> BlockState {
        BlockState {
            name: remote.name,
            server_name: remote.server_name,
            content: remote.content,
            extend: remote.extend,
        }
    }
}

impl Converge for BlockAdapter<'_> {
    fn drift(&self, observed: &BlockState, desired: &BlockSpec) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if observed.name != desired.name {
            fields.push("name");
        }
        if observed.server_name != desired.server_name {
            fields.push("server_name");
        }
        if observed.content != desired.content {
            fields.push("content");
        }
        if observed.extend != desired.extend {
            fields.push("extend");
        }
        fields
    }

    fn describe(&self, observed: &BlockState) -> Vec<(&'static str, String)> {
        let mut out = vec![("name", observed.name.clone())];
        if !observed.server_name.is_empty() {
            out.push(("server_name", observed.server_name.clone()));
        }
        out.push(("content", crate::ui::payload_size(observed.content.len())));
        out.push(("extend", observed.extend.to_string()));
        out
    }
}
