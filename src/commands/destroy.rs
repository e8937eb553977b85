//! `destroy` - delete managed records

use anyhow::{Result, bail};

use super::{Workspace, parse_target};
use crate::Context;
use crate::engine::{ExecuteOptions, Session, execute, planner};
use crate::ui;

pub fn run(ctx: &Context, target: Option<&str>, jobs: usize, yes: bool) -> Result<()> {
    let mut ws = Workspace::open(ctx, false)?;
    let target = parse_target(target)?;
    let items = planner::items(ws.manifest.declared()?, &ws.state, target.as_ref())?;
    let changes = planner::teardown(&items);

    if changes.is_empty() {
        ui::info("No managed records to destroy.");
        return Ok(());
    }

    let (_, api) = ws.connect(ctx)?;
    let session = Session::new(api.as_ref());
    let opts = ExecuteOptions {
        dry_run: false,
        jobs,
        yes,
        verbose: ctx.verbose > 0,
    };
    let execution = execute(&session, &changes, &opts)?;

    if !execution.outcomes.is_empty() {
        for outcome in &execution.outcomes {
            outcome.record_into(&mut ws.state);
        }
        ws.save_state()?;
    }

    if !execution.summary.is_success() {
        bail!("{} records could not be deleted", execution.summary.failed);
    }
    Ok(())
}
