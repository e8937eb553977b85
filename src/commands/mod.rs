//! Command implementations
//!
//! Every command works on a [`Workspace`]: the manifest and the state file
//! it resolved, plus the environment snapshot they were resolved from.

pub mod apply;
pub mod destroy;
pub mod import;
pub mod plan;
pub mod refresh;
pub mod show;

use anyhow::{Context as AnyhowContext, Result};
use std::path::PathBuf;

use crate::Context;
use crate::config::{Environment, ProviderConfig};
use crate::manifest::{Address, Manifest};
use crate::paths;
use crate::state::ProviderState;
use rpaas_client::Backend;

/// Manifest and state for one invocation
pub struct Workspace {
    pub env: Environment,
    pub manifest_path: PathBuf,
    pub state_path: PathBuf,
    pub manifest: Manifest,
    pub state: ProviderState,
}

impl Workspace {
    /// Resolve paths and load both files.
    ///
    /// With `require_manifest` a missing manifest is an error; otherwise it
    /// counts as empty.
    pub fn open(ctx: &Context, require_manifest: bool) -> Result<Self> {
        Self::open_in(ctx, Environment::capture(), require_manifest)
    }

    pub fn open_in(ctx: &Context, env: Environment, require_manifest: bool) -> Result<Self> {
        let manifest_path = paths::manifest_file(&env, ctx.manifest.as_deref())?;
        let state_path = paths::state_file(&env, ctx.state.as_deref())?;

        let manifest = if require_manifest {
            Manifest::load(&manifest_path)?
        } else {
            Manifest::load_or_default(&manifest_path)?
        };
        let state = ProviderState::load(&state_path)?;

        log::debug!(
            "Manifest {}, state {} ({} records)",
            manifest_path.display(),
            state_path.display(),
            state.resources.len()
        );

        Ok(Self {
            env,
            manifest_path,
            state_path,
            manifest,
            state,
        })
    }

    /// Resolve provider settings and build the API client
    pub fn connect(&self, ctx: &Context) -> Result<(ProviderConfig, Box<dyn Backend>)> {
        let config = ProviderConfig::resolve(&ctx.overrides, &self.manifest.provider, &self.env)?;
        log::debug!("{config:?}");
        let api = rpaas_client::connect(&config.client_config())
            .context("Failed to create RPaaS client")?;
        Ok((config, api))
    }

    /// Stamp and write the state file
    pub fn save_state(&mut self) -> Result<()> {
        self.state.touch(&self.state_path)
    }
}

/// Parse an optional `--target`
pub fn parse_target(target: Option<&str>) -> Result<Option<Address>> {
    target
        .map(|t| t.parse().with_context(|| format!("Invalid target '{t}'")))
        .transpose()
}
