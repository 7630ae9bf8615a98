use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// How a single `--file` is decoded
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LayoutArg {
    /// RCM `product.xml` layout
    RcmProduct,
    /// RCM `noiseLevels_<POLE>.xml` layout
    RcmNoise,
    /// The whole document as one dataset
    Generic,
}

#[derive(Parser)]
#[command(name = "safetree", version, about = "Inspect SAR product metadata as a tree of datasets")]
pub struct CliArgs {
    /// Product directory (RCM or Sentinel-1 SAFE)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Directory containing product subdirectories (batch mode)
    #[arg(long)]
    pub input_dir: Option<PathBuf>,

    /// Decode one XML file of the product, given relative to --input
    #[arg(short, long)]
    pub file: Option<String>,

    /// Layout applied to --file
    #[arg(long, value_enum, default_value_t = LayoutArg::Generic)]
    pub layout: LayoutArg,

    /// Upper bound on layout rules evaluated concurrently
    #[arg(long)]
    pub parallelism: Option<usize>,

    /// Reader options as JSON
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Print a JSON summary instead of text
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Enable logging (filtered by RUST_LOG, debug by default)
    #[arg(long, default_value_t = false)]
    pub log: bool,

    /// Batch mode: continue with other products when one fails
    #[arg(long, default_value_t = false)]
    pub batch: bool,
}
