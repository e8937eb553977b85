//! Core types for declarative resource reconciliation

use crate::identity::ResourceKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Default budget for each lifecycle operation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20 * 60);

/// Lifecycle operation of a managed record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Read => write!(f, "read"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// Per-operation deadlines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeouts {
    pub create: Duration,
    pub read: Duration,
    pub update: Duration,
    pub delete: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            create: DEFAULT_TIMEOUT,
            read: DEFAULT_TIMEOUT,
            update: DEFAULT_TIMEOUT,
            delete: DEFAULT_TIMEOUT,
        }
    }
}

impl Timeouts {
    /// Same deadline for every operation
    pub fn uniform(deadline: Duration) -> Self {
        Self {
            create: deadline,
            read: deadline,
            update: deadline,
            delete: deadline,
        }
    }

    /// Deadline for an operation
    pub fn for_operation(&self, op: Operation) -> Duration {
        match op {
            Operation::Create => self.create,
            Operation::Read => self.read,
            Operation::Update => self.update,
            Operation::Delete => self.delete,
        }
    }
}

/// Classification of a failed remote call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// The instance is locked by a concurrent operation
    Retryable,
    /// Anything else
    Permanent,
}

/// A record confirmed to exist remotely
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Managed<O> {
    /// Canonical identifier to persist
    pub id: String,
    /// Fully resolved key
    pub key: ResourceKey,
    /// Fields populated from the remote object
    pub observed: O,
    /// Whether `id` differs from the identifier the operation started from
    pub migrated: bool,
}

/// Outcome of reading a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation<O> {
    /// The remote object exists
    Managed(Managed<O>),
    /// The remote object no longer exists; the identifier must be cleared
    Gone,
}

impl<O> Observation<O> {
    /// Check if the record was found
    pub fn is_managed(&self) -> bool {
        matches!(self, Self::Managed(_))
    }

    /// Convert into the managed record, if any
    pub fn managed(self) -> Option<Managed<O>> {
        match self {
            Self::Managed(m) => Some(m),
            Self::Gone => None,
        }
    }
}

/// Result of applying a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplyResult {
    /// No changes needed
    NoChange,
    /// Resource was created
    Created,
    /// Resource was modified
    Modified,
    /// Resource was removed
    Removed,
    /// Apply failed
    Failed { error: String },
}

/// Summary of execution results
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecuteSummary {
    pub created: usize,
    pub modified: usize,
    pub removed: usize,
    /// Changes left undone because the run was not confirmed
    pub skipped: usize,
    pub failed: usize,
    pub no_change: usize,
}

impl ExecuteSummary {
    /// Total number of actual changes made
    pub fn total_changes(&self) -> usize {
        self.created + self.modified + self.removed
    }

    /// Check if execution was fully successful (no failures)
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Total number of records processed
    pub fn total(&self) -> usize {
        self.created + self.modified + self.removed + self.skipped + self.failed + self.no_change
    }

    /// Add a result to the summary
    pub fn add_result(&mut self, result: &ApplyResult) {
        match result {
            ApplyResult::NoChange => self.no_change += 1,
            ApplyResult::Created => self.created += 1,
            ApplyResult::Modified => self.modified += 1,
            ApplyResult::Removed => self.removed += 1,
            ApplyResult::Failed { .. } => self.failed += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeouts_per_operation() {
        let timeouts = Timeouts {
            create: Duration::from_secs(40 * 60),
            update: Duration::from_secs(80 * 60),
            ..Timeouts::default()
        };
        assert_eq!(timeouts.for_operation(Operation::Create), Duration::from_secs(2400));
        assert_eq!(timeouts.for_operation(Operation::Update), Duration::from_secs(4800));
        assert_eq!(timeouts.for_operation(Operation::Delete), DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_summary_counts() {
        let mut summary = ExecuteSummary::default();
        summary.add_result(&ApplyResult::Created);
        summary.add_result(&ApplyResult::Modified);
        summary.add_result(&ApplyResult::NoChange);
        summary.add_result(&ApplyResult::Failed {
            error: "locked".into(),
        });

        assert_eq!(summary.total_changes(), 2);
        assert_eq!(summary.total(), 4);
        assert!(!summary.is_success());
    }

    #[test]
    fn test_observation_gone() {
        let gone: Observation<()> = Observation::Gone;
        assert!(!gone.is_managed());
        assert!(gone.managed().is_none());
    }
}
