use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "Vistra Developers",
    version,
    about = "Vistra CLI - Inspect and build Vistra project archives.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the node tree of an archive with load-status and dirty markers.
    Inspect(InspectArgs),
    /// Build an archive from a directory tree (files become leaves,
    /// subdirectories become groups).
    Pack(PackArgs),
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Path to the archive to inspect.
    #[arg(value_name = "ARCHIVE")]
    pub archive: PathBuf,

    /// Also decode every leaf payload and report its size.
    #[arg(short, long)]
    pub load: bool,
}

#[derive(Args, Debug)]
pub struct PackArgs {
    /// Directory to pack.
    #[arg(value_name = "DIR")]
    pub input: PathBuf,

    /// Path of the archive to write.
    #[arg(value_name = "ARCHIVE")]
    pub output: PathBuf,
}
