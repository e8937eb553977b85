//! `show` - print the state file

use anyhow::Result;
use std::collections::BTreeMap;

use super::Workspace;
use crate::Context;
use crate::resource::Kind;
use crate::state::ResourceRecord;
use crate::ui;

pub fn run(ctx: &Context) -> Result<()> {
    let ws = Workspace::open(ctx, false)?;

    ui::header("rpaasctl state");
    ui::kv("file", &ws.state_path.display().to_string());
    ui::kv("updated", &ui::timestamp(&ws.state.last_updated));

    if ws.state.resources.is_empty() {
        println!();
        ui::info("No managed records.");
        return Ok(());
    }

    let mut by_kind: BTreeMap<Kind, Vec<(&String, &ResourceRecord)>> = BTreeMap::new();
    for (address, record) in &ws.state.resources {
        by_kind.entry(record.kind).or_default().push((address, record));
    }

    for (kind, records) in by_kind {
        ui::section(kind.title());
        for (address, record) in records {
            println!("  {address}");
            ui::kv("  id", &record.id);
            if let Some(applied) = record.last_applied {
                ui::kv("  applied", &ui::timestamp(&applied));
            }
            if let Some(refreshed) = record.last_refreshed {
                ui::kv("  refreshed", &ui::timestamp(&refreshed));
            }
            if record.digest.is_none() {
                ui::dim("  (imported, not yet applied)");
            }
        }
    }
    Ok(())
}
