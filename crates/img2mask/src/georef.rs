//! Stamping spatial reference onto plain prediction masks.
//!
//! Prediction tiles follow the slippy-map naming convention `{z}-{x}-{y}`,
//! which pins their EPSG:3857 bounds exactly; the stamped GeoTIFF carries
//! that transform. Once every mask is stamped, the plain PNGs and any
//! sidecar metadata files are deleted so only georeferenced outputs remain.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::debug;

use multimask::{write_mask, Crs, GeoTransform, Tile};

/// Half the web-mercator world span, meters.
const WEB_MERCATOR_ORIGIN: f64 = 20_037_508.342_789_244;

/// EPSG:3857 bounds `(min_x, min_y, max_x, max_y)` of slippy tile
/// `(x, y)` at zoom `z`.
pub fn tile_bounds_3857(z: u32, x: u32, y: u32) -> (f64, f64, f64, f64) {
    let tiles_per_axis = (1u64 << z) as f64;
    let span = 2.0 * WEB_MERCATOR_ORIGIN / tiles_per_axis;

    let min_x = -WEB_MERCATOR_ORIGIN + x as f64 * span;
    let max_y = WEB_MERCATOR_ORIGIN - y as f64 * span;
    (min_x, max_y - span, min_x + span, max_y)
}

/// Parse a `{z}-{x}-{y}` tile stem.
pub fn parse_tile_name(stem: &str) -> Option<(u32, u32, u32)> {
    let mut parts = stem.split('-');
    let z = parts.next()?.parse().ok()?;
    let x = parts.next()?.parse().ok()?;
    let y = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((z, x, y))
}

/// Stamp every PNG mask in `dir` into a sibling EPSG:3857 GeoTIFF.
pub fn georeference_dir(dir: &Path) -> Result<usize> {
    let mut stamped = 0usize;
    for png in pngs_in(dir)? {
        let stem = png
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        let (z, x, y) = parse_tile_name(&stem)
            .with_context(|| format!("{}: tile name is not {{z}}-{{x}}-{{y}}", png.display()))?;

        let img = image::open(&png)
            .with_context(|| format!("cannot read {}", png.display()))?
            .to_luma8();
        let (width, height) = (img.width() as usize, img.height() as usize);

        let (min_x, min_y, max_x, max_y) = tile_bounds_3857(z, x, y);
        let tile = Tile {
            width,
            height,
            transform: GeoTransform {
                origin_x: min_x,
                origin_y: max_y,
                pixel_width: (max_x - min_x) / width as f64,
                pixel_height: -(max_y - min_y) / height as f64,
            },
            crs: Crs::WEB_MERCATOR,
        };

        let data: Vec<u8> = img.into_raw().iter().map(|&v| (v > 0) as u8).collect();
        let out = dir.join(format!("{stem}.tif"));
        write_mask(&out, &tile, &data)?;
        debug!("stamped {}", out.display());
        stamped += 1;
    }
    Ok(stamped)
}

/// Delete the plain PNG intermediates and any sidecar metadata files,
/// leaving only the georeferenced outputs.
pub fn remove_intermediates(dir: &Path) -> Result<usize> {
    let mut removed = 0usize;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let name = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        if name.ends_with(".png") || name.ends_with(".xml") {
            fs::remove_file(&path)
                .with_context(|| format!("cannot remove {}", path.display()))?;
            removed += 1;
        }
    }
    Ok(removed)
}

fn pngs_in(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("cannot read {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(|e| e.eq_ignore_ascii_case("png"))
                    .unwrap_or(false)
        })
        .collect();
    paths.sort();
    Ok(paths)
}
