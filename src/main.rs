use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;

use vessel_unet::logger::JsonlLogger;
use vessel_unet::trainer::{run_train, RunPaths};
use vessel_unet::TrainConfig;

#[derive(Parser, Debug)]
#[command(name = "vessel-unet", about = "UNet segmentation training harness")]
struct TrainArgs {
    /// Path to the YAML training configuration.
    #[arg(long, default_value = "unet_drive.yml")]
    config: PathBuf,
}

fn main() -> Result<()> {
    let args = TrainArgs::parse();
    let cfg = TrainConfig::load(&args.config)?;
    let mut logger =
        JsonlLogger::create(Path::new("logs")).context("failed to create scalar log")?;
    run_train(&cfg, &RunPaths::default(), &mut logger)?;
    Ok(())
}
