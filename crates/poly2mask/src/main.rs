use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use multimask::{resolve, run, RunParams};

/// Burn building-footprint GeoJSON labels into multi-class training masks.
///
/// Labels and chips are paired by file stem; each pair produces one
/// single-band uint8 GeoTIFF with classes background/footprint/boundary/
/// contact. Existing masks are left alone, so an interrupted run can simply
/// be restarted.
#[derive(Parser, Debug)]
#[command(name = "poly2mask", version)]
struct Args {
    /// Directory of GeoJSON label files, one FeatureCollection per chip.
    #[arg(long)]
    in_poly_dir: PathBuf,

    /// Directory of GeoTIFF imagery chips with stems matching the labels.
    #[arg(long)]
    in_chip_dir: PathBuf,

    /// Output directory for the encoded masks (created if missing).
    #[arg(long)]
    out_mask_dir: PathBuf,

    /// Width of the boundary class around each footprint, in meters.
    #[arg(long, default_value_t = 0.5)]
    boundary_width: f64,

    /// Pixels closer than this to two distinct footprints become contact,
    /// in meters.
    #[arg(long, default_value_t = 0.75)]
    contact_spacing: f64,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    fs::create_dir_all(&args.out_mask_dir).with_context(|| {
        format!(
            "failed to create output directory {}",
            args.out_mask_dir.display()
        )
    })?;

    let pairs = resolve(&args.in_poly_dir, &args.in_chip_dir, &args.out_mask_dir)
        .context("failed to pair labels with chips")?;
    info!("{} chip/label pairs to process", pairs.len());

    let params = RunParams {
        boundary_width_m: args.boundary_width,
        contact_spacing_m: args.contact_spacing,
    };
    run(&pairs, &params);

    Ok(())
}
