mod cli;
mod commands;
mod config;
mod engine;
mod manifest;
mod paths;
mod progress;
mod resource;
mod state;
mod ui;

#[cfg(test)]
mod lifecycle_tests;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use config::Overrides;
use std::io;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    /// `--manifest` path, if given
    pub manifest: Option<String>,
    /// `--state` path, if given
    pub state: Option<String>,
    /// Provider settings given on the command line
    pub overrides: Overrides,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        manifest: cli.manifest,
        state: cli.state,
        overrides: Overrides {
            host: cli.host,
            token: cli.token,
        },
    };

    match cli.command {
        Command::Plan(args) => commands::plan::run(&ctx, args.target.as_deref(), args.jobs as usize),
        Command::Apply(args) => commands::apply::run(
            &ctx,
            args.target.as_deref(),
            args.jobs as usize,
            args.yes,
            args.dry_run,
        ),
        Command::Refresh { jobs } => commands::refresh::run(&ctx, jobs as usize),
        Command::Import { address, id } => commands::import::run(&ctx, &address, &id),
        Command::Destroy(args) => {
            commands::destroy::run(&ctx, args.target.as_deref(), args.jobs as usize, args.yes)
        }
        Command::Show => commands::show::run(&ctx),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "rpaasctl", &mut io::stdout());
            Ok(())
        }
    }
}
