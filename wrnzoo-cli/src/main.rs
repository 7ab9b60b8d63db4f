//! wrnzoo CLI: decode, discover and profile wide-residual-network weight files.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};
use wrnzoo_core::{Granularity, Superclass};

/// wrnzoo: model identity, label hierarchy and profiling tools for CIFAR-100 WRNs
#[derive(Parser, Debug)]
#[command(name = "wrnzoo", version, about, long_about = None)]
struct Cli {
    /// Workspace directory (config, models, datasets, evaluations)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Decode weight filenames into their hyperparameters
    Parse {
        /// Weight file names or paths
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Build the canonical weight filename for a set of hyperparameters
    Encode {
        #[arg(long)]
        granularity: Granularity,
        /// Superclass index, name, or "all"
        #[arg(long, default_value = "all")]
        superclass: Superclass,
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        crop: u32,
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        kernel: u32,
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        width: u32,
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        depth: u32,
        /// Write the superclass name instead of its index
        #[arg(long)]
        named: bool,
    },
    /// Find weight files and append one profile row per decodable model
    Scan {
        /// Models directory (defaults to the configured one)
        #[arg(long)]
        root: Option<PathBuf>,
        /// Only file names containing this substring
        #[arg(long)]
        pattern: Option<String>,
        #[arg(long)]
        superclass: Option<Superclass>,
        #[arg(long)]
        granularity: Option<Granularity>,
        /// Maximum number of models (defaults to evaluation.limit; 0 for no limit)
        #[arg(long)]
        limit: Option<usize>,
        /// Profile CSV (defaults to <evaluations>/model_profiles.csv)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Show where a model's datasets, evaluations and embeddings live
    Layout {
        /// Weight file name or path
        name: String,
    },
    /// List class names
    Classes {
        /// Restrict to one granularity
        #[arg(long)]
        granularity: Option<Granularity>,
    },
    /// Map fine labels to coarse labels
    Remap {
        #[arg(required = true, allow_negative_numbers = true)]
        fine: Vec<i64>,
    },
    /// Write the configured architecture grid as profile rows
    ProfileGrid {
        /// CSV file stem under the evaluations directory
        #[arg(long)]
        filename: Option<String>,
    },
    /// Draw a stratified validation subset from a JSON array of fine targets
    SampleValidation {
        /// JSON file holding the training targets
        targets: PathBuf,
        /// JSON file receiving the sampled indices
        output: PathBuf,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Create a default configuration file in the workspace
    Init,
    /// Print the effective configuration
    Show,
}

fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    // JSON file layer for structured logging
    let log_dir = directories::ProjectDirs::from("dev", "wrnzoo", "wrnzoo")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "wrnzoo.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = commands::resolve_workspace(&cli.workspace)?;

    commands::handle_command(cli.command, &workspace)
}
