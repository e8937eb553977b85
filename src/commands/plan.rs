//! `plan` - preview what apply would change

use anyhow::Result;

use super::{Workspace, parse_target};
use crate::Context;
use crate::engine::differ::display_plan;
use crate::engine::{Session, planner};
use crate::ui;

pub fn run(ctx: &Context, target: Option<&str>, jobs: usize) -> Result<()> {
    let ws = Workspace::open(ctx, false)?;
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
    display_plan(&changes, ctx.verbose > 0);

    Ok(())
}
