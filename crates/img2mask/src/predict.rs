//! The prediction paths: batched dense classification and streamed
//! instance segmentation, both thresholded into binary masks.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, ensure, Context, Result};
use image::GrayImage;
use log::debug;
use ndarray::{Array2, Array4, ArrayView3, ArrayView4};
use ort::value::TensorRef;

use crate::model::{Model, Route};

/// Images per forward pass on the batched route.
pub const BATCH_SIZE: usize = 8;

/// Expected tile edge length, pixels.
pub const IMAGE_SIZE: usize = 256;

/// Ceil-division chunk count: the remainder chunk still runs.
pub fn chunk_count(total: usize, batch: usize) -> usize {
    total.div_ceil(batch)
}

/// Strictly-greater threshold: a probability exactly at `confidence` is
/// not a building.
#[inline]
pub fn binarize(value: f32, confidence: f32) -> u8 {
    (value > confidence) as u8
}

/// Per-pixel maximum across an `(instances, H, W)` mask stack: "is any
/// instance present here".
pub fn instance_max(stack: ArrayView3<f32>) -> Array2<f32> {
    let (_, height, width) = stack.dim();
    Array2::from_shape_fn((height, width), |(y, x)| {
        stack
            .slice(ndarray::s![.., y, x])
            .iter()
            .copied()
            .fold(f32::NEG_INFINITY, f32::max)
    })
}

/// Prediction mask destination: the input's stem, PNG, in `output_dir`.
pub fn output_path(output_dir: &Path, input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    output_dir.join(format!("{stem}.png"))
}

/// Run the loaded model over every PNG tile in `input_dir`.
pub fn predict_dir(
    model: &mut Model,
    input_dir: &Path,
    output_dir: &Path,
    confidence: f32,
) -> Result<usize> {
    let images = list_png(input_dir)?;
    debug!("{} input tiles in {}", images.len(), input_dir.display());

    match model.kind.route()? {
        Route::Batched => predict_batched(model, &images, output_dir, confidence),
        Route::Streamed => predict_streamed(model, &images, output_dir, confidence),
    }
}

fn list_png(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("cannot read input directory {}", dir.display()))?
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

/// Load a chunk of tiles as an `(N, 256, 256, 3)` float batch in [0, 1].
fn load_image_batch(paths: &[PathBuf]) -> Result<Array4<f32>> {
    let mut batch = Array4::zeros((paths.len(), IMAGE_SIZE, IMAGE_SIZE, 3));
    for (i, path) in paths.iter().enumerate() {
        let img = image::open(path)
            .with_context(|| format!("cannot read {}", path.display()))?
            .to_rgb8();
        ensure!(
            img.width() as usize == IMAGE_SIZE && img.height() as usize == IMAGE_SIZE,
            "{}: expected {IMAGE_SIZE}x{IMAGE_SIZE}, got {}x{}",
            path.display(),
            img.width(),
            img.height()
        );
        for (x, y, pixel) in img.enumerate_pixels() {
            for c in 0..3 {
                batch[[i, y as usize, x as usize, c]] = pixel.0[c] as f32 / 255.0;
            }
        }
    }
    Ok(batch)
}

fn save_mask(mask: &[u8], width: usize, height: usize, path: &Path) -> Result<()> {
    let pixels: Vec<u8> = mask.iter().map(|&v| v * 255).collect();
    let img = GrayImage::from_raw(width as u32, height as u32, pixels)
        .context("mask buffer does not match its dimensions")?;
    img.save(path)
        .with_context(|| format!("cannot write {}", path.display()))?;
    Ok(())
}

fn run_forward(model: &mut Model, batch: &Array4<f32>) -> Result<(Vec<usize>, Vec<f32>)> {
    let input_name = model.session.inputs[0].name.clone();
    let tensor = TensorRef::from_array_view(batch)?;
    let outputs = model.session.run(ort::inputs![input_name.as_str() => tensor])?;
    let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;
    Ok((
        shape.iter().map(|&d| d as usize).collect(),
        data.to_vec(),
    ))
}

/// Dense classifier: fixed-size chunks, argmax over the class axis, then
/// the confidence threshold on the argmax channel.
fn predict_batched(
    model: &mut Model,
    images: &[PathBuf],
    output_dir: &Path,
    confidence: f32,
) -> Result<usize> {
    debug!(
        "dense classifier: {} tiles in {} chunks",
        images.len(),
        chunk_count(images.len(), BATCH_SIZE)
    );

    let mut written = 0usize;
    for chunk in images.chunks(BATCH_SIZE) {
        let batch = load_image_batch(chunk)?;
        let (dims, data) = run_forward(model, &batch)?;

        let [n, height, width, classes] = dims[..] else {
            bail!("unexpected classifier output shape {dims:?}");
        };
        ensure!(n == chunk.len(), "classifier returned {n} maps for {} inputs", chunk.len());
        let scores = ArrayView4::from_shape((n, height, width, classes), &data)?;

        for (idx, path) in chunk.iter().enumerate() {
            let mut mask = vec![0u8; height * width];
            for y in 0..height {
                for x in 0..width {
                    let mut best = 0usize;
                    let mut best_score = f32::NEG_INFINITY;
                    for k in 0..classes {
                        let v = scores[[idx, y, x, k]];
                        if v > best_score {
                            best_score = v;
                            best = k;
                        }
                    }
                    mask[y * width + x] = binarize(best as f32, confidence);
                }
            }
            save_mask(&mask, width, height, &output_path(output_dir, path))?;
            written += 1;
        }
    }
    Ok(written)
}

/// Promptable segmenter: one tile per pass, a stack of instance masks out,
/// collapsed by per-pixel max before thresholding.
fn predict_streamed(
    model: &mut Model,
    images: &[PathBuf],
    output_dir: &Path,
    confidence: f32,
) -> Result<usize> {
    let mut written = 0usize;
    for path in images {
        let batch = load_image_batch(std::slice::from_ref(path))?;
        let (dims, data) = run_forward(model, &batch)?;

        let (instances, height, width) = match dims[..] {
            [1, m, h, w] => (m, h, w),
            [m, h, w] => (m, h, w),
            ref other => bail!("unexpected segmenter output shape {other:?}"),
        };
        let stack = ArrayView3::from_shape((instances, height, width), &data)?;
        let flat = instance_max(stack);

        let mask: Vec<u8> = flat.iter().map(|&v| binarize(v, confidence)).collect();
        save_mask(&mask, width, height, &output_path(output_dir, path))?;
        written += 1;
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn remainder_chunks_still_count() {
        assert_eq!(chunk_count(0, 8), 0);
        assert_eq!(chunk_count(8, 8), 1);
        assert_eq!(chunk_count(9, 8), 2);
        assert_eq!(chunk_count(16, 8), 2);
        assert_eq!(chunk_count(17, 8), 3);
    }

    #[test]
    fn threshold_is_strictly_greater() {
        assert_eq!(binarize(0.5, 0.5), 0);
        assert_eq!(binarize(0.5 + f32::EPSILON, 0.5), 1);
        assert_eq!(binarize(1.0, 0.5), 1);
        assert_eq!(binarize(0.0, 0.0), 0);
    }

    #[test]
    fn instance_max_takes_the_best_instance_per_pixel() {
        let mut stack = Array3::zeros((2, 2, 2));
        stack[[0, 0, 0]] = 0.9;
        stack[[1, 0, 0]] = 0.2;
        stack[[1, 1, 1]] = 0.7;

        let flat = instance_max(stack.view());
        assert_eq!(flat[[0, 0]], 0.9);
        assert_eq!(flat[[1, 1]], 0.7);
        assert_eq!(flat[[0, 1]], 0.0);
    }

    #[test]
    fn output_name_follows_the_input_stem() {
        assert_eq!(
            output_path(Path::new("/preds"), Path::new("/tiles/18-1234-567.png")),
            PathBuf::from("/preds/18-1234-567.png")
        );
    }
}
