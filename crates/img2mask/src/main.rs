mod config;
mod georef;
mod model;
mod predict;

use std::fs;
use std::time::Instant;

use anyhow::{ensure, Context, Result};
use clap::Parser;
use log::info;

use crate::config::Config;
use crate::model::Model;

fn main() -> Result<()> {
    env_logger::init();
    let config = Config::parse();
    ensure!(
        (0.0..=1.0).contains(&config.confidence),
        "confidence must be in [0, 1], got {}",
        config.confidence
    );

    info!("using checkpoint {}", config.checkpoint.display());
    let mut model = Model::load(&config.checkpoint)?;

    fs::create_dir_all(&config.prediction_dir).with_context(|| {
        format!(
            "failed to create prediction directory {}",
            config.prediction_dir.display()
        )
    })?;

    let start = Instant::now();
    let predicted = predict::predict_dir(
        &mut model,
        &config.input_dir,
        &config.prediction_dir,
        config.confidence,
    )?;
    info!(
        "predicted {predicted} masks at confidence {} in {:.1}s",
        config.confidence,
        start.elapsed().as_secs_f64()
    );

    let start = Instant::now();
    let stamped = georef::georeference_dir(&config.prediction_dir)?;
    info!(
        "georeferenced {stamped} masks in {:.1}s",
        start.elapsed().as_secs_f64()
    );

    // Keep only the georeferenced outputs.
    georef::remove_intermediates(&config.prediction_dir)?;

    Ok(())
}
