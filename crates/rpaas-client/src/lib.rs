//! # rpaas-client
//!
//! Blocking client for the RPaaS management API.
//!
//! Calls go through the tsuru service proxy by default, or straight to the
//! RPaaS API when tsuru is bypassed. Non-2xx answers become
//! [`Error::UnexpectedStatus`] with the body kept verbatim.
//!
//! ## Example
//!
//! ```no_run
//! use rpaas_client::{ClientConfig, Instance, connect};
//!
//! let api = connect(&ClientConfig::tsuru("https://tsuru.example.com", "token"))?;
//! for route in api.list_routes(&Instance::new("rpaasv2-be", "my-rpaas"))? {
//!     println!("{}", route.path);
//! }
//! # Ok::<(), rpaas_client::Error>(())
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod types;

pub use backend::{Backend, InstanceData, MockBackend};
pub use config::{ClientConfig, DEFAULT_TIMEOUT, Target};
pub use error::{Error, ErrorCategory, Result};
pub use types::{
    AclEntry, Autoscale, Block, CertManager, CertificateInfo, ExtraFile, Instance, InstanceInfo,
    Route, ScheduledWindow, UpdateCertificate,
};

use backend::http::HttpBackend;

/// Create an HTTP backend for `config`.
pub fn connect(config: &ClientConfig) -> Result<Box<dyn Backend>> {
    Ok(Box::new(HttpBackend::new(config)?))
}
