//! Plan display

use colored::{ColoredString, Colorize};
use std::collections::BTreeMap;

use super::planner::{Action, Change};
use crate::resource::Kind;

/// Counts shown in the plan footer
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PlanCounts {
    pub create: usize,
    pub update: usize,
    pub delete: usize,
    pub unchanged: usize,
    pub failed: usize,
}

impl PlanCounts {
    pub fn of(changes: &[Change]) -> Self {
        let mut counts = Self::default();
        for change in changes {
            match change.action {
                Action::Create | Action::Recreate => counts.create += 1,
                Action::Update { .. } => counts.update += 1,
                Action::Delete => counts.delete += 1,
                Action::NoChange | Action::Forget => counts.unchanged += 1,
                Action::Failed { .. } => counts.failed += 1,
            }
        }
        counts
    }

    pub fn pending(&self) -> usize {
        self.create + self.update + self.delete
    }
}

fn symbol(action: &Action) -> ColoredString {
    match action {
        Action::Create | Action::Recreate => "+".green(),
        Action::Update { .. } => "~".yellow(),
        Action::Delete => "-".red(),
        Action::Forget => "○".dimmed(),
        Action::NoChange => "=".dimmed(),
        Action::Failed { .. } => "✗".red(),
    }
}

fn describe(change: &Change) -> String {
    let mut text = match &change.action {
        Action::Create => "(not created)".to_string(),
        Action::Recreate => "(gone remotely, will recreate)".to_string(),
        Action::Update { fields } if fields.is_empty() => "(configuration changed)".to_string(),
        Action::Update { fields } => fields.join(", "),
        Action::Delete => "(will remove)".to_string(),
        Action::Forget => "(already gone, dropping from state)".to_string(),
        Action::NoChange => String::new(),
        Action::Failed { error } => error.clone(),
    };
    if change.migrated {
        text.push_str(" [identifier migrated]");
    }
    text
}

/// Display the plan in a box grouped by kind.
///
/// Unchanged records are listed only when `verbose` is set.
pub fn display_plan(changes: &[Change], verbose: bool) {
    let counts = PlanCounts::of(changes);
    if counts.pending() == 0 && counts.failed == 0 && !verbose {
        println!();
        println!("  {} No changes needed", "✓".green());
        return;
    }

    let mut by_kind: BTreeMap<Kind, Vec<&Change>> = BTreeMap::new();
    for change in changes {
        let listed = verbose || !matches!(change.action, Action::NoChange);
        if listed {
            by_kind.entry(change.kind()).or_default().push(change);
        }
    }

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Execution Plan".bold()
    );
    println!("│");

    for (kind, kind_changes) in &by_kind {
        println!("│ {}", kind.title().bold());

        for change in kind_changes {
            let line = describe(change);
            let line = match change.action {
                Action::Failed { .. } => line.red(),
                _ => line.dimmed(),
            };
            println!("│   {} {:<30} {}", symbol(&change.action), change.address.to_string(), line);

            if verbose {
                for (field, value) in &change.observed {
                    println!("│       {}: {}", field.dimmed(), value);
                }
            }
        }
        println!("│");
    }

    println!("├─────────────────────────────────────────────────────┤");
    println!(
        "│ Summary: {} changes ({} to create, {} to update, {} to remove)",
        counts.pending().to_string().bold(),
        counts.create.to_string().green(),
        counts.update.to_string().yellow(),
        counts.delete.to_string().red()
    );
    if counts.failed > 0 {
        println!(
            "│          {} records could not be read",
            counts.failed.to_string().red()
        );
    }
    println!("└─────────────────────────────────────────────────────┘");
}
