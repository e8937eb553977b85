//! `refresh` - read every managed record back

use anyhow::{Result, bail};
use colored::Colorize;

use super::Workspace;
use crate::Context;
use crate::engine::{Action, Change, Session, planner};
use crate::state::ProviderState;
use crate::ui;

/// Counts reported after a refresh
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub refreshed: usize,
    pub migrated: usize,
    pub dropped: usize,
    pub failed: usize,
}

pub fn run(ctx: &Context, jobs: usize) -> Result<()> {
    let mut ws = Workspace::open(ctx, false)?;
    let items: Vec<_> = planner::items(ws.manifest.declared()?, &ws.state, None)?
        .into_iter()
        .filter(|item| item.record.is_some())
        .collect();

    if items.is_empty() {
        ui::info("No managed records to refresh.");
        return Ok(());
    }

    let (_, api) = ws.connect(ctx)?;
    let session = Session::new(api.as_ref());
    let changes = planner::inspect_all(&session, &items, jobs)?;

    let report = record(&mut ws.state, &changes);
    ws.save_state()?;

    for change in &changes {
        if let Action::Failed { error } = &change.action {
            println!("  {} {}: {}", "✗".red(), change.address.to_string().bold(), error);
        }
    }
    if !ctx.quiet {
        ui::success(&format!(
            "{} refreshed, {} identifiers migrated, {} dropped",
            report.refreshed, report.migrated, report.dropped
        ));
    }

    if report.failed > 0 {
        bail!("{} records could not be read", report.failed);
    }
    Ok(())
}

/// Apply read results to state: keep migrated identifiers, drop gone
/// records, and leave failed ones untouched
pub fn record(state: &mut ProviderState, changes: &[Change]) -> RefreshReport {
    let mut report = RefreshReport::default();
    for change in changes {
        let key = change.address.to_string();
        match (&change.action, &change.id) {
            (Action::Recreate | Action::Forget, _) => {
                log::info!("{key} no longer exists remotely");
                state.remove(&key);
                report.dropped += 1;
            }
            (Action::Failed { .. }, _) => report.failed += 1,
            (_, Some(id)) => {
                state.mark_refreshed(&key, change.kind(), id);
                report.refreshed += 1;
                if change.migrated {
                    report.migrated += 1;
                }
            }
            (_, None) => {}
        }
    }
    report
}
