use clap::{Parser, Subcommand};
use clap_complete::Shell;

#[derive(Parser)]
#[command(name = "rpaasctl")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Keep RPaaS instance configuration in line with a manifest", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Manifest file (default: <config dir>/rpaas.toml)
    #[arg(long, global = true, value_name = "FILE")]
    pub manifest: Option<String>,

    /// State file (default: <state dir>/state.toml)
    #[arg(long, global = true, value_name = "FILE")]
    pub state: Option<String>,

    /// Tsuru API address, overriding the manifest and TSURU_TARGET
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Tsuru API token, overriding the manifest and TSURU_TOKEN
    #[arg(long, global = true)]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Preview what apply would change
    Plan(PlanArgs),

    /// Make the remote configuration match the manifest
    Apply(ApplyArgs),

    /// Read every managed record back, migrating old identifiers
    Refresh {
        /// Parallel reads
        #[arg(short, long, default_value = "4")]
        jobs: u16,
    },

    /// Adopt an existing remote object
    Import {
        /// Address to store it under (kind.label)
        address: String,

        /// Identifier of the remote object, in any format this tool ever wrote
        id: String,
    },

    /// Delete managed records
    Destroy(DestroyArgs),

    /// Show the state file
    Show,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser)]
pub struct PlanArgs {
    /// Only plan one address (kind.label)
    #[arg(short, long)]
    pub target: Option<String>,

    /// Parallel reads
    #[arg(short, long, default_value = "4")]
    pub jobs: u16,
}

#[derive(Parser)]
pub struct ApplyArgs {
    /// Only apply one address (kind.label)
    #[arg(short, long)]
    pub target: Option<String>,

    /// Parallel jobs
    #[arg(short, long, default_value = "4")]
    pub jobs: u16,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Show what would change without applying
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Parser)]
pub struct DestroyArgs {
    /// Only destroy one address (kind.label)
    #[arg(short, long)]
    pub target: Option<String>,

    /// Parallel jobs
    #[arg(short, long, default_value = "4")]
    pub jobs: u16,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}
