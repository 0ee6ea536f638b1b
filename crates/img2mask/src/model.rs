//! Checkpoint loading and modality dispatch.
//!
//! The modality is decided once, at load time, from the checkpoint's
//! declared format, and drives which prediction path runs. The set is
//! closed: a checkpoint that declares none of the known modalities is
//! rejected up front instead of producing an empty output directory.

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use log::info;
use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider};
use ort::session::Session;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModalityError {
    #[error("detector checkpoints emit box proposals, not masks; prediction is unsupported")]
    DetectorUnsupported,

    #[error("unrecognized model modality {0:?}")]
    Unrecognized(String),
}

/// The closed set of checkpoint modalities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    /// Per-pixel class scores over fixed-size input batches.
    DenseClassifier,
    /// Box proposals; recognized but unsupported for mask prediction.
    Detector,
    /// Instance-mask stacks, one forward pass per image.
    PromptableSegmenter,
}

/// How a modality consumes its inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Fixed-size chunks through one forward pass each.
    Batched,
    /// One image per forward pass.
    Streamed,
}

impl ModelKind {
    /// Map a checkpoint's declared format string onto a modality.
    pub fn classify(declared: &str) -> Result<ModelKind, ModalityError> {
        let s = declared.to_ascii_lowercase();
        let matches_any = |tokens: &[&str]| tokens.iter().any(|t| s.contains(t));

        if matches_any(&["dense", "classifier", "unet", "ramp"]) {
            Ok(ModelKind::DenseClassifier)
        } else if matches_any(&["fastsam", "promptable", "sam"]) {
            Ok(ModelKind::PromptableSegmenter)
        } else if matches_any(&["detector", "yolo"]) {
            Ok(ModelKind::Detector)
        } else {
            Err(ModalityError::Unrecognized(declared.to_string()))
        }
    }

    /// Total dispatch over the modality set.
    ///
    /// The detector variant fails here, loudly, rather than no-opping.
    pub fn route(self) -> Result<Route, ModalityError> {
        match self {
            ModelKind::DenseClassifier => Ok(Route::Batched),
            ModelKind::PromptableSegmenter => Ok(Route::Streamed),
            ModelKind::Detector => Err(ModalityError::DetectorUnsupported),
        }
    }
}

/// A loaded checkpoint: the ONNX Runtime session plus its modality.
pub struct Model {
    pub session: Session,
    pub kind: ModelKind,
}

impl Model {
    /// Load a checkpoint, preferring CUDA with CPU fallback.
    pub fn load(checkpoint: &Path) -> Result<Model> {
        let start = Instant::now();
        let session = Session::builder()?
            .with_execution_providers([
                CUDAExecutionProvider::default().build(),
                CPUExecutionProvider::default().build(),
            ])?
            .commit_from_file(checkpoint)
            .with_context(|| format!("failed to load checkpoint {}", checkpoint.display()))?;

        let declared = declared_format(&session, checkpoint);
        let kind = ModelKind::classify(&declared)?;
        info!(
            "loaded {} as {kind:?} in {:.1}s",
            checkpoint.display(),
            start.elapsed().as_secs_f64()
        );

        Ok(Model { session, kind })
    }
}

/// The checkpoint's declared format: the ONNX metadata key `model_kind`,
/// with the filename stem as fallback for undecorated exports.
fn declared_format(session: &Session, checkpoint: &Path) -> String {
    if let Ok(metadata) = session.metadata() {
        if let Ok(Some(kind)) = metadata.custom("model_kind") {
            return kind;
        }
    }
    checkpoint
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}
