//! # Declarative
//!
//! A framework for reconciling declared resources against a remote API.
//!
//! The crate knows nothing about any particular API. Each resource kind
//! plugs in through a small adapter; the crate supplies everything the kinds
//! have in common.
//!
//! ## Core Concepts
//!
//! - **ResourceKey**: the natural identity of a remote object (service,
//!   instance, per-kind discriminators)
//! - **IdentityScheme**: how a kind encodes its key into a durable
//!   identifier, and which legacy shapes it still accepts
//! - **Drift resolution**: locating the object a key names in a fresh
//!   remote listing, backfilling keys written by older releases
//! - **Retry policy**: retrying calls rejected because the instance is
//!   locked by a concurrent operation, bounded by a deadline
//! - **Reconciler**: create, read, update and delete over an adapter
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{Observation, Reconciler};
//!
//! let reconciler = Reconciler::new(&route_adapter);
//!
//! // first apply
//! let managed = reconciler.create(&desired)?;
//! state.insert(address, managed.id);
//!
//! // later runs; legacy identifiers come back migrated
//! match reconciler.read(&state[address], Some(&desired))? {
//!     Observation::Managed(m) if m.migrated => state.insert(address, m.id),
//!     Observation::Managed(_) => {}
//!     Observation::Gone => { state.remove(address); }
//! }
//! ```

pub mod adapter;
pub mod error;
pub mod identity;
pub mod reconciler;
pub mod resolve;
pub mod retry;
pub mod types;

// Re-export main types at crate root
pub use adapter::ResourceAdapter;
pub use error::{Error, ErrorCategory, Result};
pub use identity::{
    DELIMITER, Decoded, Generation, IdentityScheme, LegacyFormat, Presence, ResourceKey, Slot,
    SlotKind, split_bounded, split_exact,
};
pub use reconciler::Reconciler;
pub use resolve::{RemoteMatch, fill_from_hint, resolve};
pub use retry::{LOCK_CONFLICT_MARKER, RemoteFailure, RetryPolicy, with_retry};
pub use types::{
    ApplyResult, DEFAULT_TIMEOUT, ExecuteSummary, Managed, Observation, Operation,
    RetryDecision, Timeouts,
};
