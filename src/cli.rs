use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::allocator::DEFAULT_ALPHA;

#[derive(Parser, Debug)]
#[command(
    name = "covqa",
    version,
    about = "Coverage and reliability QC for the speech annotation pipeline"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Aggregate a dataset JSONL into per-cell coverage counts
    Summarize(SummarizeArgs),
    /// Nightly coverage job: snapshot build, rotation, and low-coverage alerts
    Coverage(CoverageArgs),
    /// Draw the next stratification cell from the deficit-weighted distribution
    Allocate(AllocateArgs),
    /// Nightly inter-rater reliability job over double-pass annotations
    Irr(IrrArgs),
    /// Inspect the persisted coverage and reliability artifacts
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SummarizeArgs {
    #[arg(long, default_value = ".cache/covqa")]
    pub data_root: PathBuf,

    /// Dataset JSONL with per-clip annotation records
    #[arg(long)]
    pub dataset_path: PathBuf,

    /// Defaults to <data-root>/coverage_summary.json
    #[arg(long)]
    pub out_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct CoverageArgs {
    #[arg(long, default_value = ".cache/covqa")]
    pub data_root: PathBuf,

    /// Defaults to <data-root>/coverage_summary.json
    #[arg(long)]
    pub summary_path: Option<PathBuf>,

    /// Defaults to <data-root>/coverage_targets.json
    #[arg(long)]
    pub targets_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct AllocateArgs {
    #[arg(long, default_value = ".cache/covqa")]
    pub data_root: PathBuf,

    /// Defaults to <data-root>/coverage_snapshot.json
    #[arg(long)]
    pub snapshot_path: Option<PathBuf>,

    /// Deficit emphasis exponent; non-positive values fall back to the default
    #[arg(long, default_value_t = DEFAULT_ALPHA)]
    pub alpha: f64,

    /// Seed the draw for reproducible allocation
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct IrrArgs {
    #[arg(long, default_value = ".cache/covqa")]
    pub data_root: PathBuf,

    /// Per-clip pass output directories; defaults to <data-root>/annotations
    #[arg(long)]
    pub annotations_root: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = ".cache/covqa")]
    pub data_root: PathBuf,
}
