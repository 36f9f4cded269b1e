//! CLI argument definitions using clap derive macros.
//!
//! Tuning flags are optional so a config file can fill them; unset values
//! fall back to the config file and then to built-in defaults.

use std::path::PathBuf;

use clap::Parser;

/// Per-item HTTP timeout used when neither the CLI nor the config sets one.
pub const DEFAULT_CLI_TIMEOUT_MS: u64 = 5_000;

/// Fetch every URL in a list file into a folder.
///
/// Each line of the input file holds one URL. Every URL is fetched with
/// bounded concurrency and retried on transient failures, and the body is
/// saved under the URL's last path segment.
#[derive(Parser, Debug, Clone)]
#[command(name = "batch-fetch")]
#[command(author, version, about)]
pub struct Args {
    /// File with one URL per line
    #[arg(short = 'i', long = "input-file", value_name = "FILE")]
    pub input_file: PathBuf,

    /// Existing folder the fetched files are written to
    #[arg(short = 'o', long = "output-folder", value_name = "DIR")]
    pub output_folder: Option<PathBuf>,

    /// Maximum concurrent fetches (1-100)
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: Option<u8>,

    /// Maximum attempts per URL, first try included (1-10)
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u8).range(1..=10))]
    pub max_attempts: Option<u8>,

    /// Per-request timeout in milliseconds (default 5000)
    #[arg(long, value_name = "MS", value_parser = clap::value_parser!(u64).range(1..=600_000))]
    pub timeout_ms: Option<u64>,

    /// Base retry backoff in milliseconds
    #[arg(long, value_name = "MS", value_parser = clap::value_parser!(u64).range(0..=600_000))]
    pub backoff_base_ms: Option<u64>,

    /// Maximum retry backoff in milliseconds
    #[arg(long, value_name = "MS", value_parser = clap::value_parser!(u64).range(0..=600_000))]
    pub backoff_max_ms: Option<u64>,

    /// Give up on unfinished URLs after this many seconds
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..=86_400))]
    pub job_timeout_secs: Option<u64>,

    /// Keep files that already exist instead of overwriting them
    #[arg(long)]
    pub skip_existing: bool,

    /// Print the final report as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Read defaults from this config file instead of the default location
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Disable the progress bar
    #[arg(long)]
    pub no_progress: bool,
}
