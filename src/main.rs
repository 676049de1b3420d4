mod cli;
mod commands;
mod config;
mod engine;
mod progress;
mod state;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;
use std::path::PathBuf;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    /// Project root directory
    pub project: PathBuf,
    /// `--param` values in the order given
    pub params: Vec<(String, String)>,
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

    let params = cli.params();
    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        project: cli.project,
        params,
    };

    match cli.command {
        Command::Stacks => commands::stacks::run(&ctx),
        Command::Validate { stack, .. } => commands::validate::run(&ctx, stack.as_deref()),
        Command::Plan(args) => commands::plan::run(&ctx, &args),
        Command::Graph { stack, format, .. } => commands::graph::run(&ctx, &stack, format),
        Command::Apply(args) => commands::apply::run(&ctx, &args),
        Command::Outputs { stack } => commands::outputs::run(&ctx, &stack),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "stackplan", &mut io::stdout());
            Ok(())
        }
    }
}
