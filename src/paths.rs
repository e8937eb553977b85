//! Centralized path resolution for rpaasctl
//!
//! # Environment Variables
//!
//! - `RPAAS_CONFIG_DIR` - Override config directory (where `rpaas.toml` lives)
//! - `RPAAS_STATE_DIR` - Override state directory (where `state.toml` lives)
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `RPAAS_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/rpaas` (if set)
//! 3. Platform default:
//!    - Windows: `%APPDATA%\rpaas`
//!    - macOS/Linux: `~/.config/rpaas`
//!
//! For state_dir():
//! 1. `RPAAS_STATE_DIR` environment variable
//! 2. `XDG_STATE_HOME/rpaas` (if set)
//! 3. Platform default:
//!    - Windows: `%LOCALAPPDATA%\rpaas`
//!    - macOS/Linux: `~/.local/state/rpaas`
//!
//! Every lookup goes through an [`Environment`] snapshot taken once at
//! startup.

use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::config::Environment;

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "RPAAS_CONFIG_DIR";

/// Environment variable for state directory override
pub const ENV_STATE_DIR: &str = "RPAAS_STATE_DIR";

/// Default manifest file name
pub const MANIFEST_FILE: &str = "rpaas.toml";

/// Default state file name
pub const STATE_FILE: &str = "state.toml";

const APP_DIR: &str = "rpaas";

/// Get the rpaasctl config directory path
pub fn config_dir(env: &Environment) -> Result<PathBuf> {
    if let Some(dir) = env.var(ENV_CONFIG_DIR) {
        let path = expand(dir);
        log::debug!("Using config dir from {}: {}", ENV_CONFIG_DIR, path.display());
        return Ok(path);
    }

    if let Some(xdg_config) = env.var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join(APP_DIR);
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    #[cfg(windows)]
    {
        if let Some(app_data) = dirs::config_dir() {
            let path = app_data.join(APP_DIR);
            log::debug!("Using Windows config dir: {}", path.display());
            return Ok(path);
        }
    }

    let home = env.home().context("Could not determine home directory")?;
    let path = home.join(".config").join(APP_DIR);
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Get the rpaasctl state directory path
pub fn state_dir(env: &Environment) -> Result<PathBuf> {
    if let Some(dir) = env.var(ENV_STATE_DIR) {
        let path = expand(dir);
        log::debug!("Using state dir from {}: {}", ENV_STATE_DIR, path.display());
        return Ok(path);
    }

    if let Some(xdg_state) = env.var("XDG_STATE_HOME") {
        let path = PathBuf::from(xdg_state).join(APP_DIR);
        log::debug!("Using XDG_STATE_HOME: {}", path.display());
        return Ok(path);
    }

    #[cfg(windows)]
    {
        if let Some(local_app_data) = dirs::data_local_dir() {
            let path = local_app_data.join(APP_DIR);
            log::debug!("Using Windows state dir: {}", path.display());
            return Ok(path);
        }
    }

    let home = env.home().context("Could not determine home directory")?;
    let path = home.join(".local").join("state").join(APP_DIR);
    log::debug!("Using default state dir: {}", path.display());
    Ok(path)
}

/// Manifest path: `--manifest` when given, else `<config_dir>/rpaas.toml`
pub fn manifest_file(env: &Environment, flag: Option<&str>) -> Result<PathBuf> {
    match flag {
        Some(path) => Ok(expand(path)),
        None => Ok(config_dir(env)?.join(MANIFEST_FILE)),
    }
}

/// State path: `--state` when given, else `<state_dir>/state.toml`
pub fn state_file(env: &Environment, flag: Option<&str>) -> Result<PathBuf> {
    match flag {
        Some(path) => Ok(expand(path)),
        None => Ok(state_dir(env)?.join(STATE_FILE)),
    }
}

/// File written by the tsuru client under `~/.tsuru`
pub fn tsuru_file(env: &Environment, name: &str) -> Option<PathBuf> {
    env.home().map(|home| home.join(".tsuru").join(name))
}

/// Expand ~ and environment variables in a path string.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}
