use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MaskError>;

/// Errors surfaced by the mask-encoding pipeline.
///
/// Pairing and directory errors are configuration-level and abort a run
/// before any pair is processed; the remaining variants are raised per pair
/// and recovered at the batch boundary.
#[derive(Debug, Error)]
pub enum MaskError {
    #[error("directory does not exist: {0}")]
    MissingDir(PathBuf),

    #[error("no label/chip pairs found (labels: {labels}, chips: {chips})")]
    NoPairs { labels: PathBuf, chips: PathBuf },

    #[error("{path}: label collection has no usable CRS")]
    MissingCrs { path: PathBuf },

    #[error("cannot reproject EPSG:{from} -> EPSG:{to}: {reason}")]
    Reprojection { from: u32, to: u32, reason: String },

    #[error("EPSG:{0} has no known projection definition")]
    UnsupportedCrs(u32),

    #[error("{path}: {reason}")]
    BadRaster { path: PathBuf, reason: String },

    #[error("{path}: {reason}")]
    BadLabel { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Tiff(#[from] tiff::TiffError),
}
