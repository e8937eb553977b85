//! `apply` - make the remote configuration match the manifest

use anyhow::{Result, bail};

use super::{Workspace, parse_target};
use crate::Context;
use crate::engine::{ExecuteOptions, Session, execute, planner};
use crate::ui;

pub fn run(ctx: &Context, target: Option<&str>, jobs: usize, yes: bool, dry_run: bool) -> Result<()> {
    let mut ws = Workspace::open(ctx, true)?;
    let target = parse_target(target)?;
    let items = planner::items(ws.manifest.declared()?, &ws.state, target.as_ref())?;

    if items.is_empty() {
        ui::info("Nothing is declared or managed yet.");
        return Ok(());
    }

    let (config, api) = ws.connect(ctx)?;
    if !ctx.quiet {
        ui::dim(&format!("Reading {} records from {}", items.len(), config.endpoint()));
    }

    let session = Session::new(api.as_ref());
    let changes = planner::inspect_all(&session, &items, jobs)?;

    let opts = ExecuteOptions {
        dry_run,
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
        log::info!("State written to {}", ws.state_path.display());
    }

    if !execution.summary.is_success() {
        bail!("{} of {} records failed", execution.summary.failed, execution.summary.total());
    }
    Ok(())
}
