//! `import` - adopt an existing remote object

use anyhow::{Context as AnyhowContext, Result, bail};

use super::Workspace;
use crate::Context;
use crate::engine::{Session, planner};
use crate::manifest::Address;
use crate::ui;

pub fn run(ctx: &Context, address: &str, id: &str) -> Result<()> {
    let mut ws = Workspace::open(ctx, false)?;
    let address: Address = address
        .parse()
        .with_context(|| format!("Invalid address '{address}'"))?;

    if let Some(existing) = ws.state.get(&address.to_string()) {
        bail!(
            "{address} is already managed as {:?}; destroy it or remove it from state first",
            existing.id
        );
    }

    let declared = ws.manifest.declared()?;
    let declared = declared.iter().find(|d| d.address == address);
    if declared.is_none() {
        ui::warn(&format!(
            "{address} is not declared in {}; the next apply will delete it",
            ws.manifest_path.display()
        ));
    }

    let (_, api) = ws.connect(ctx)?;
    let session = Session::new(api.as_ref());
    let change = planner::adopt(&session, &address, declared, id)?;
    let Some(canonical) = &change.id else {
        bail!("{address} was found but returned no identifier");
    };

    ws.state.mark_refreshed(&address.to_string(), address.kind, canonical);
    ws.save_state()?;

    ui::success(&format!("Imported {address}"));
    ui::kv("id", canonical);
    if change.migrated {
        ui::dim(&format!("(rewritten from {id:?})"));
    }
    for (field, value) in &change.observed {
        ui::kv(field, value);
    }
    Ok(())
}
