//! Execution engine - carry out a plan against the API

use anyhow::{Context as AnyhowContext, Result};
use colored::Colorize;
use declarative::{ApplyResult, ExecuteSummary};
use rayon::prelude::*;
use std::sync::{Arc, Mutex};

use crate::manifest::{Address, TimeoutOverrides};
use crate::progress;
use crate::resource::Converge;
use crate::state::ProviderState;

use super::differ::{PlanCounts, display_plan};
use super::dispatch::{Session, Visit, describe_error, dispatch};
use super::planner::{Action, Change};

/// Options for execution
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Don't make changes, just show what would happen
    pub dry_run: bool,
    /// Number of parallel jobs
    pub jobs: usize,
    /// Skip confirmation prompts
    pub yes: bool,
    /// Verbose output
    pub verbose: bool,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            jobs: 4,
            yes: false,
            verbose: false,
        }
    }
}

/// How state changes after a record was processed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordUpdate {
    /// Leave the stored record alone
    Keep,
    /// Created or updated with this configuration
    Applied { id: String, digest: String },
    /// Read back; the identifier may have been migrated
    Refreshed { id: String },
    /// Drop the record
    Remove,
}

/// Result of processing one change
#[derive(Debug, Clone)]
pub struct Outcome {
    pub address: Address,
    pub result: ApplyResult,
    pub record: RecordUpdate,
}

impl Outcome {
    /// Write this outcome into state
    pub fn record_into(&self, state: &mut ProviderState) {
        let key = self.address.to_string();
        match &self.record {
            RecordUpdate::Keep => {}
            RecordUpdate::Applied { id, digest } => {
                state.mark_applied(&key, self.address.kind, id, digest.clone());
            }
            RecordUpdate::Refreshed { id } => state.mark_refreshed(&key, self.address.kind, id),
            RecordUpdate::Remove => {
                state.remove(&key);
            }
        }
    }
}

/// Everything an execution produced
#[derive(Debug, Default)]
pub struct Execution {
    pub outcomes: Vec<Outcome>,
    pub summary: ExecuteSummary,
}

/// Show the plan, confirm, and carry it out
pub fn execute(session: &Session<'_>, changes: &[Change], opts: &ExecuteOptions) -> Result<Execution> {
    display_plan(changes, opts.verbose);
    let pending = PlanCounts::of(changes).pending();

    if pending > 0 && opts.dry_run {
        println!();
        println!("  {} Dry run - no changes made", "ℹ".blue());
        return Ok(Execution::default());
    }

    if pending > 0 && !opts.yes && !confirm_proceed()? {
        println!();
        println!("  {} Aborted", "✗".red());
        return Ok(Execution {
            outcomes: Vec::new(),
            summary: ExecuteSummary {
                skipped: pending,
                ..Default::default()
            },
        });
    }

    if pending > 0 {
        println!();
        println!("  {} Applying {} changes...", "→".cyan(), pending);
    }

    let outcomes = execute_parallel(session, changes, opts.jobs)?;

    let mut summary = ExecuteSummary::default();
    for outcome in &outcomes {
        summary.add_result(&outcome.result);
        if let ApplyResult::Failed { error } = &outcome.result {
            log::error!("{}: {error}", outcome.address);
        }
    }

    if pending > 0 || summary.failed > 0 {
        print_failures(&outcomes);
        print_summary(&summary);
    }

    Ok(Execution { outcomes, summary })
}

/// Carry out every change on a pool of `jobs` threads
pub fn execute_parallel(session: &Session<'_>, changes: &[Change], jobs: usize) -> Result<Vec<Outcome>> {
    let pending = changes.iter().filter(|c| c.action.is_change()).count();
    let pb = progress::bar(pending as u64, "Applying");
    let results: Arc<Mutex<Vec<Outcome>>> = Arc::new(Mutex::new(Vec::new()));

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.max(1))
        .build()
        .context("Failed to create apply thread pool")?;

    pool.install(|| {
        changes.par_iter().for_each(|change| {
            let outcome = carry_out(session, change);

            if change.action.is_change() {
                let symbol = match &outcome.result {
                    ApplyResult::NoChange => "○",
                    ApplyResult::Created | ApplyResult::Modified | ApplyResult::Removed => "✓",
                    ApplyResult::Failed { .. } => "✗",
                };
                pb.set_message(format!("{} {}", symbol, change.address));
                pb.inc(1);
            }

            push_result(&results, outcome);
        });
    });

    pb.finish_and_clear();

    let mut outcomes = into_results(results)?;
    outcomes.sort_by(|a, b| a.address.cmp(&b.address));
    Ok(outcomes)
}

/// Process one change. Failures are reported in the outcome, never raised.
pub fn carry_out(session: &Session<'_>, change: &Change) -> Outcome {
    let outcome = |result, record| Outcome {
        address: change.address.clone(),
        result,
        record,
    };

    match &change.action {
        Action::NoChange => match &change.id {
            Some(id) => outcome(ApplyResult::NoChange, RecordUpdate::Refreshed { id: id.clone() }),
            None => outcome(ApplyResult::NoChange, RecordUpdate::Keep),
        },
        Action::Forget => {
            log::info!("{} no longer exists; dropping it from state", change.address);
            outcome(ApplyResult::NoChange, RecordUpdate::Remove)
        }
        Action::Failed { error } => outcome(
            ApplyResult::Failed {
                error: error.clone(),
            },
            RecordUpdate::Keep,
        ),
        Action::Create | Action::Recreate | Action::Update { .. } | Action::Delete => {
            let desired = change.declared.as_ref().map(|d| &d.desired);
            let timeouts = change
                .declared
                .as_ref()
                .map(|d| d.timeouts)
                .unwrap_or_default();
            let (result, record) = dispatch(
                session.api,
                change.kind(),
                desired,
                Mutate {
                    session,
                    change,
                    timeouts,
                },
            );
            outcome(result, record)
        }
    }
}

struct Mutate<'s, 'a> {
    session: &'s Session<'a>,
    change: &'s Change,
    timeouts: TimeoutOverrides,
}

impl Mutate<'_, '_> {
    /// What to keep when a call fails
    fn on_failure(&self, error: String) -> (ApplyResult, RecordUpdate) {
        let record = match (&self.change.id, self.change.migrated) {
            (Some(id), true) => RecordUpdate::Refreshed { id: id.clone() },
            _ => RecordUpdate::Keep,
        };
        (ApplyResult::Failed { error }, record)
    }

    fn digest(&self) -> Result<String> {
        self.change
            .declared
            .as_ref()
            .context("no configuration for this address")?
            .desired
            .digest()
    }
}

impl Visit for Mutate<'_, '_> {
    type Output = (ApplyResult, RecordUpdate);

    fn visit<A: Converge>(self, adapter: &A, desired: Option<&A::Desired>) -> Self::Output {
        let reconciler = self.session.reconciler(adapter, &self.timeouts);
        let address = &self.change.address;

        if self.change.action == Action::Delete {
            let Some(id) = &self.change.id else {
                return (ApplyResult::NoChange, RecordUpdate::Remove);
            };
            return match reconciler.delete(id) {
                Ok(()) => (ApplyResult::Removed, RecordUpdate::Remove),
                Err(e) => self.on_failure(describe_error(&e)),
            };
        }

        let Some(desired) = desired else {
            return self.on_failure(format!("{address} has no configuration"));
        };
        let digest = match self.digest() {
            Ok(digest) => digest,
            Err(e) => return self.on_failure(format!("{e:#}")),
        };

        let (result, applied) = match (&self.change.action, &self.change.id) {
            (Action::Update { .. }, Some(id)) => (ApplyResult::Modified, reconciler.update(id, desired)),
            _ => (ApplyResult::Created, reconciler.create(desired)),
        };

        match applied {
            Ok(managed) => (result, RecordUpdate::Applied { id: managed.id, digest }),
            Err(e) => self.on_failure(describe_error(&e)),
        }
    }
}

fn push_result<T>(results: &Arc<Mutex<Vec<T>>>, result: T) {
    match results.lock() {
        Ok(mut locked) => locked.push(result),
        Err(poisoned) => poisoned.into_inner().push(result),
    }
}

fn into_results<T>(results: Arc<Mutex<Vec<T>>>) -> Result<Vec<T>> {
    let mutex = Arc::try_unwrap(results)
        .map_err(|_| anyhow::anyhow!("Failed to collect apply results: shared result state"))?;

    match mutex.into_inner() {
        Ok(collected) => Ok(collected),
        Err(poisoned) => Ok(poisoned.into_inner()),
    }
}

/// Confirm with user
pub fn confirm_proceed() -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt("Continue?")
        .default(true)
        .interact()?;

    Ok(confirmed)
}

fn print_failures(outcomes: &[Outcome]) {
    let failed: Vec<_> = outcomes
        .iter()
        .filter_map(|o| match &o.result {
            ApplyResult::Failed { error } => Some((&o.address, error)),
            _ => None,
        })
        .collect();
    if failed.is_empty() {
        return;
    }

    println!();
    for (address, error) in failed {
        println!("  {} {}: {}", "✗".red(), address.to_string().bold(), error);
    }
}

/// Print final summary
pub fn print_summary(summary: &ExecuteSummary) {
    println!();
    if summary.is_success() {
        println!(
            "  {} Configuration applied successfully!",
            "✓".green().bold()
        );
    } else {
        println!(
            "  {} Configuration applied with errors",
            "⚠".yellow().bold()
        );
    }

    if summary.created > 0 {
        println!("    • {} resources created", summary.created);
    }
    if summary.modified > 0 {
        println!("    • {} resources modified", summary.modified);
    }
    if summary.removed > 0 {
        println!("    • {} resources removed", summary.removed);
    }
    if summary.skipped > 0 {
        println!("    • {} resources skipped", summary.skipped);
    }
    if summary.failed > 0 {
        println!("    • {} {} failed", summary.failed, "resources".red());
    }
}
