use clap::Parser;
use std::path::PathBuf;

/// `img2mask` - building-footprint prediction over a directory of tiles.
///
/// Reads a trained checkpoint, runs it over plain PNG imagery tiles and
/// writes georeferenced binary masks (EPSG:3857) next to nothing else: the
/// plain intermediates are removed once stamping succeeds.
#[derive(Parser, Debug)]
#[command(name = "img2mask", version)]
pub struct Config {
    /// Path to the ONNX model checkpoint.
    #[arg(long)]
    pub checkpoint: PathBuf,

    /// Directory of 256x256 RGB PNG tiles named `{z}-{x}-{y}.png`.
    #[arg(long)]
    pub input_dir: PathBuf,

    /// Output directory for the prediction masks (created if missing).
    #[arg(long)]
    pub prediction_dir: PathBuf,

    /// Probability a pixel must exceed to count as building, in [0, 1].
    #[arg(long, default_value_t = 0.5)]
    pub confidence: f32,
}
