use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "rawshift")]
#[command(author, version, about = "Convert images and camera RAW files")]
pub struct Cli {
    /// Files to convert
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Target format (jpg, png, webp, avif, ico, svg, ...)
    #[arg(short, long)]
    pub to: Option<String>,

    /// Encode quality between 0 and 1
    #[arg(short, long)]
    pub quality: Option<f32>,

    /// Use the general engine first, even for RAW files
    #[arg(long)]
    pub no_fast_path: bool,

    /// Output directory
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, env = "RAWSHIFT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print a JSON report to stdout
    #[arg(long)]
    pub json: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}
