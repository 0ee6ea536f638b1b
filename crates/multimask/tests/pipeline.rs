// End-to-end batch runs over temporary directories: chips are written with
// the crate's own GeoTIFF writer, labels as plain GeoJSON files.

use std::fs;
use std::path::{Path, PathBuf};

use multimask::{
    read_mask, resolve, run, write_mask, Crs, GeoTransform, RunParams, RunStats, Tile,
    CLASS_BACKGROUND, CLASS_FOOTPRINT,
};

/// 16x16 geodetic chip at 0.1 deg/px anchored at (10.0, 50.0).
fn chip_tile() -> Tile {
    Tile {
        width: 16,
        height: 16,
        transform: GeoTransform {
            origin_x: 10.0,
            origin_y: 50.0,
            pixel_width: 0.1,
            pixel_height: -0.1,
        },
        crs: Crs::WGS84,
    }
}

fn write_chip(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    let tile = chip_tile();
    write_mask(&path, &tile, &vec![0u8; tile.width * tile.height]).unwrap();
    path
}

fn feature_collection(features: &str) -> String {
    format!(r#"{{"type":"FeatureCollection","features":[{features}]}}"#)
}

/// A square footprint covering pixel cols/rows 4..12 of the chip grid.
fn square_feature() -> &'static str {
    r#"{"type":"Feature","properties":{},"geometry":{"type":"Polygon","coordinates":
        [[[10.4,49.6],[11.2,49.6],[11.2,48.8],[10.4,48.8],[10.4,49.6]]]}}"#
}

fn null_feature() -> &'static str {
    r#"{"type":"Feature","properties":{},"geometry":null}"#
}

struct Fixture {
    _root: tempfile::TempDir,
    labels: PathBuf,
    chips: PathBuf,
    masks: PathBuf,
}

/// Three paired chips; the third label holds only a null geometry.
fn fixture() -> Fixture {
    let root = tempfile::tempdir().unwrap();
    let labels = root.path().join("labels");
    let chips = root.path().join("chips");
    let masks = root.path().join("masks");
    for dir in [&labels, &chips, &masks] {
        fs::create_dir_all(dir).unwrap();
    }

    for name in ["a", "b", "c"] {
        write_chip(&chips, &format!("{name}.tif"));
    }
    fs::write(labels.join("a.geojson"), feature_collection(square_feature())).unwrap();
    fs::write(labels.join("b.geojson"), feature_collection(square_feature())).unwrap();
    fs::write(labels.join("c.geojson"), feature_collection(null_feature())).unwrap();

    Fixture {
        _root: root,
        labels,
        chips,
        masks,
    }
}

#[test]
fn batch_encodes_every_pair_including_null_geometry() {
    let fx = fixture();
    let pairs = resolve(&fx.labels, &fx.chips, &fx.masks).unwrap();
    assert_eq!(pairs.len(), 3);

    let stats = run(&pairs, &RunParams::default());
    assert_eq!(
        stats,
        RunStats {
            written: 3,
            skipped: 0,
            failed: 0
        }
    );

    // The square label burned a footprint with the chip's georeferencing.
    let (tile, data) = read_mask(&fx.masks.join("a.mask.tif")).unwrap();
    assert_eq!(tile, chip_tile());
    assert_eq!(data[8 * 16 + 8], CLASS_FOOTPRINT);

    // The null-geometry pair still produced a valid all-background mask.
    let (tile, data) = read_mask(&fx.masks.join("c.mask.tif")).unwrap();
    assert_eq!(tile.shape(), (16, 16));
    assert!(data.iter().all(|&v| v == CLASS_BACKGROUND));
}

#[test]
fn second_run_skips_everything() {
    let fx = fixture();
    let pairs = resolve(&fx.labels, &fx.chips, &fx.masks).unwrap();

    let first = run(&pairs, &RunParams::default());
    assert_eq!(first.written, 3);

    let second = run(&pairs, &RunParams::default());
    assert_eq!(
        second,
        RunStats {
            written: 0,
            skipped: 3,
            failed: 0
        }
    );
}

#[test]
fn preexisting_mask_is_never_rewritten() {
    let fx = fixture();
    // Simulate a prior partial run: pair "b" already has an output file.
    let sentinel = b"left over from an earlier run";
    fs::write(fx.masks.join("b.mask.tif"), sentinel).unwrap();

    let pairs = resolve(&fx.labels, &fx.chips, &fx.masks).unwrap();
    let stats = run(&pairs, &RunParams::default());
    assert_eq!(
        stats,
        RunStats {
            written: 2,
            skipped: 1,
            failed: 0
        }
    );

    // Existence alone marks completion; the file was not validated or touched.
    assert_eq!(fs::read(fx.masks.join("b.mask.tif")).unwrap(), sentinel);
}

#[test]
fn failing_pair_is_isolated_from_the_batch() {
    let fx = fixture();
    // Corrupt one label after pairing: its pair fails, the others complete.
    let pairs = resolve(&fx.labels, &fx.chips, &fx.masks).unwrap();
    fs::write(fx.labels.join("b.geojson"), b"{ not json").unwrap();

    let stats = run(&pairs, &RunParams::default());
    assert_eq!(
        stats,
        RunStats {
            written: 2,
            skipped: 0,
            failed: 1
        }
    );
    assert!(fx.masks.join("a.mask.tif").is_file());
    assert!(!fx.masks.join("b.mask.tif").is_file());
    assert!(fx.masks.join("c.mask.tif").is_file());
}
