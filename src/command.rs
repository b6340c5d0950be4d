use clap::{Parser, Subcommand};

use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
#[command(
    propagate_version = true,
    infer_long_args = true,
    infer_subcommands = true,
    flatten_help = true
)]
#[command(help_template = HELP_TEMPLATE)]
pub struct Options {
    #[command(subcommand)]
    pub command: Commands,
    #[command(flatten)]
    pub common: CommonOptions,
}

#[derive(Clone, Debug, Parser)]
pub struct CommonOptions {
    /// Path to settings file
    #[arg(global = true, short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase log level (will be overridden by --log-level).
    #[arg(global = true, short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(global = true, long, value_name = "LEVEL")]
    pub log_level: Option<log::LevelFilter>,
}

#[derive(Clone, Debug, Subcommand)]
pub enum Commands {
    Run(RunOptions),
    Validate,
    ExampleConfig,
}

#[derive(Clone, Debug, Parser)]
#[command(about = "Trim the configured target directories")]
pub struct RunOptions {
    /// Workspace to clean, `ROOT` or `ROOT -> TARGET`.
    ///
    /// May be given multiple times; overrides the workspaces from the
    /// settings file.
    #[arg(short, long, value_name = "SPEC")]
    pub workspace: Vec<String>,

    /// Prune by last-modified time (7 day retention) instead of by
    /// package name.
    #[arg(long)]
    pub check_timestamp: bool,
}
