use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Aggregate course, student, webinar and insider counts from upstream sources
#[derive(Parser)]
#[command(name = "course-stats")]
#[command(version, about = "Fetch and aggregate course statistics", long_about = None)]
pub struct Cli {
    /// Config file (defaults to course-stats.toml in the user config dir)
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch every source once and print the aggregated counts as JSON
    Run {
        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
    },
    /// List configured sources
    Sources,
    /// Classify the sections of a saved course-detail payload
    Classify {
        /// JSON file with a course-detail response
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}
