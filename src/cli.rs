use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

use crate::config::parse_param;

#[derive(Parser)]
#[command(name = "stackplan")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Resolve, validate, plan and apply declarative infrastructure stacks", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Project directory
    #[arg(short = 'C', long, global = true, default_value = ".", env = "STACKPLAN_PROJECT")]
    pub project: PathBuf,

    #[command(flatten)]
    pub params: ParamArgs,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// `--param` values before the subcommand, then those after it
    pub fn params(&self) -> Vec<(String, String)> {
        let mut params = self.params.params.clone();
        if let Some(local) = self.command.params() {
            params.extend(local.params.iter().cloned());
        }
        params
    }
}

/// Parameters accepted both before and after the subcommand
#[derive(Args, Clone, Default)]
pub struct ParamArgs {
    /// Set a parameter (repeatable), e.g. --param stage=prod
    #[arg(long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
    pub params: Vec<(String, String)>,
}

#[derive(Subcommand)]
pub enum Command {
    /// List the project's stacks in dependency order
    Stacks,

    /// Resolve and validate stacks without planning
    Validate {
        /// Only this stack and the stacks it references
        stack: Option<String>,

        #[command(flatten)]
        params: ParamArgs,
    },

    /// Show the provisioning plan
    Plan(PlanArgs),

    /// Show the resource dependency graph of a stack
    Graph {
        stack: String,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: GraphFormat,

        #[command(flatten)]
        params: ParamArgs,
    },

    /// Apply stacks with the local provisioner
    Apply(ApplyArgs),

    /// Show the applied outputs of a stack
    Outputs { stack: String },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl Command {
    fn params(&self) -> Option<&ParamArgs> {
        match self {
            Self::Validate { params, .. } | Self::Graph { params, .. } => Some(params),
            Self::Plan(args) => Some(&args.params),
            Self::Apply(args) => Some(&args.params),
            Self::Stacks | Self::Outputs { .. } | Self::Completions { .. } => None,
        }
    }
}

// ============================================================================
// Plan
// ============================================================================

#[derive(Parser)]
pub struct PlanArgs {
    /// Only this stack and the stacks it references
    pub stack: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: PlanFormat,

    /// Also write the JSON plan to this file
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Show a diff against a previously written JSON plan
    #[arg(long, value_name = "FILE")]
    pub compare: Option<PathBuf>,

    #[command(flatten)]
    pub params: ParamArgs,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum PlanFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum GraphFormat {
    Text,
    Dot,
}

// ============================================================================
// Apply
// ============================================================================

#[derive(Parser)]
pub struct ApplyArgs {
    /// Only this stack and the stacks it references
    pub stack: Option<String>,

    /// Show what would change without applying
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Don't ask for confirmation
    #[arg(short, long)]
    pub yes: bool,

    /// Resources of one batch applied in parallel
    #[arg(short, long, default_value = "4")]
    pub jobs: u16,

    #[command(flatten)]
    pub params: ParamArgs,
}
