//! Execution engine for rpaasctl
//!
//! The engine orchestrates:
//! 1. Planning - join manifest and state, read every stateful record back
//! 2. Diffing - show what will be created, updated or removed
//! 3. Executing - carry out the plan in parallel and report state updates

pub mod differ;
pub mod dispatch;
pub mod executor;
pub mod planner;

pub use dispatch::Session;
pub use executor::{ExecuteOptions, Execution, Outcome, RecordUpdate, execute};
pub use planner::{Action, Change, Item};
