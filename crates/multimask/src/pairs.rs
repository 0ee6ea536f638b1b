//! Pairing label files with their imagery chips.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::debug;
use walkdir::WalkDir;

use crate::error::{MaskError, Result};

/// One unit of batch work: a chip, its label file, and the mask destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChipLabelPair {
    pub chip: PathBuf,
    pub label: PathBuf,
    pub mask: PathBuf,
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.iter().any(|want| e.eq_ignore_ascii_case(want)))
        .unwrap_or(false)
}

fn require_dir(path: &Path) -> Result<()> {
    if !path.is_dir() {
        return Err(MaskError::MissingDir(path.to_path_buf()));
    }
    Ok(())
}

fn files_with_extensions(dir: &Path, extensions: &[&str]) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| has_extension(path, extensions))
        .collect()
}

/// Destination mask path for a chip: `<out_mask_dir>/<chip stem>.mask.tif`.
///
/// A pure function of its arguments, so repeated runs derive identical
/// paths and resumption can key on file existence.
pub fn mask_filepath(out_mask_dir: &Path, chip_path: &Path) -> PathBuf {
    let stem = chip_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    out_mask_dir.join(format!("{stem}.mask.tif"))
}

/// Pair every label file in `label_dir` with the chip in `chip_dir` sharing
/// its file stem, ordered by label path.
///
/// Labels without a matching chip are excluded. An empty result is a
/// configuration error: nothing downstream can make progress from it.
pub fn resolve(
    label_dir: &Path,
    chip_dir: &Path,
    out_mask_dir: &Path,
) -> Result<Vec<ChipLabelPair>> {
    require_dir(label_dir)?;
    require_dir(chip_dir)?;

    let mut chips: BTreeMap<String, PathBuf> = BTreeMap::new();
    for chip in files_with_extensions(chip_dir, &["tif", "tiff"]) {
        if let Some(stem) = chip.file_stem().and_then(|s| s.to_str()) {
            chips.entry(stem.to_string()).or_insert(chip);
        }
    }

    let mut pairs = Vec::new();
    for label in files_with_extensions(label_dir, &["geojson", "json"]) {
        let Some(stem) = label.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        match chips.get(stem) {
            Some(chip) => pairs.push(ChipLabelPair {
                chip: chip.clone(),
                label,
                mask: mask_filepath(out_mask_dir, chip),
            }),
            None => debug!("no chip for label {}", label.display()),
        }
    }

    if pairs.is_empty() {
        return Err(MaskError::NoPairs {
            labels: label_dir.to_path_buf(),
            chips: chip_dir.to_path_buf(),
        });
    }
    Ok(pairs)
}
