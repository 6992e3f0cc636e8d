use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Follow a review target: pick the upstream revision and files a review
/// change tracks, preview the resulting delta and apply it.
#[derive(Parser)]
#[command(name = "reviewtarget")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (defaults to ~/.reviewtarget/config.json)
    #[arg(long, global = true, env = "REVIEWTARGET_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Edits to the review target and files, applied on top of what the change
/// currently records.
#[derive(Args, Debug, Clone, Default)]
pub struct EditArgs {
    /// New review target (branch, tag or commit)
    #[arg(short, long, conflicts_with = "follow")]
    pub target: Option<String>,

    /// Review-Files pattern; repeat for multiple lines (gitignore syntax)
    #[arg(short, long = "files")]
    pub files: Vec<String>,

    /// Use the current version of the follow branch as target
    #[arg(long)]
    pub follow: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the review target and files recorded on a change
    Status {
        /// Change id (number, `project~number` or Change-Id)
        change: String,
    },
    /// Dry run: list the files an edit would add, update or remove
    Preview {
        change: String,

        #[command(flatten)]
        edit: EditArgs,
    },
    /// Dry run, then create the new patch set
    Apply {
        change: String,

        #[command(flatten)]
        edit: EditArgs,
    },
    /// Dry run against a local git checkout instead of the server
    Local {
        /// Repository (auto-detects git root if absent)
        #[arg(short = 'r', long)]
        repo: Option<PathBuf>,

        /// Destination branch of the change (defaults to the checked out branch)
        #[arg(short, long)]
        branch: Option<String>,

        /// Print the commit message the new patch set would carry
        #[arg(long)]
        message: bool,

        #[command(flatten)]
        edit: EditArgs,
    },
    /// Compact a sorted list of paths read from stdin (or a file)
    Compact {
        /// File with one path per line
        input: Option<PathBuf>,
    },
}
