//! GeoTIFF header parsing and single-band mask writing.
//!
//! Built on the `tiff` crate; the georeferencing tags are handled here:
//!
//! - ModelPixelScale (33550) + ModelTiepoint (33922), or an axis-aligned
//!   ModelTransformation (34264), carry the affine transform.
//! - The GeoKey directory (34735) carries the model type and EPSG code.
//!
//! Rotated/sheared rasters are rejected; chips are expected north-up. Written
//! masks never carry a nodata sentinel: every pixel holds a class.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;

use crate::crs::Crs;
use crate::error::{MaskError, Result};
use crate::tile::{GeoTransform, Tile};

const TAG_MODEL_PIXEL_SCALE: u16 = 33550;
const TAG_MODEL_TIEPOINT: u16 = 33922;
const TAG_MODEL_TRANSFORMATION: u16 = 34264;
const TAG_GEO_KEY_DIRECTORY: u16 = 34735;

const KEY_GT_MODEL_TYPE: u16 = 1024;
const KEY_GT_RASTER_TYPE: u16 = 1025;
const KEY_GEOGRAPHIC_TYPE: u16 = 2048;
const KEY_PROJECTED_CS_TYPE: u16 = 3072;

const MODEL_TYPE_PROJECTED: u32 = 1;
const MODEL_TYPE_GEOGRAPHIC: u32 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;

#[cold]
fn bad(path: &Path, reason: impl Into<String>) -> MaskError {
    MaskError::BadRaster {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Read shape, affine transform and CRS from a GeoTIFF header.
pub fn read_header(path: &Path) -> Result<Tile> {
    let file = BufReader::new(File::open(path)?);
    let mut dec = Decoder::new(file)?;
    let (width, height) = dec.dimensions()?;

    let transform = read_transform(&mut dec, path)?;
    let crs = read_crs(&mut dec, path)?;

    Ok(Tile {
        width: width as usize,
        height: height as usize,
        transform,
        crs,
    })
}

fn read_transform<R: std::io::Read + std::io::Seek>(
    dec: &mut Decoder<R>,
    path: &Path,
) -> Result<GeoTransform> {
    let scale = dec.find_tag(Tag::Unknown(TAG_MODEL_PIXEL_SCALE))?;
    if let Some(scale) = scale {
        let scale = scale.into_f64_vec()?;
        if scale.len() < 2 || scale[0] == 0.0 || scale[1] == 0.0 {
            return Err(bad(path, "degenerate ModelPixelScale"));
        }

        let tie = dec
            .find_tag(Tag::Unknown(TAG_MODEL_TIEPOINT))?
            .ok_or_else(|| bad(path, "ModelPixelScale without ModelTiepoint"))?
            .into_f64_vec()?;
        if tie.len() < 6 {
            return Err(bad(path, "truncated ModelTiepoint"));
        }

        // Tiepoint maps raster (i, j) onto world (x, y); shift back to pixel (0, 0).
        return Ok(GeoTransform {
            origin_x: tie[3] - tie[0] * scale[0],
            origin_y: tie[4] + tie[1] * scale[1],
            pixel_width: scale[0],
            pixel_height: -scale[1],
        });
    }

    if let Some(matrix) = dec.find_tag(Tag::Unknown(TAG_MODEL_TRANSFORMATION))? {
        let m = matrix.into_f64_vec()?;
        if m.len() < 16 {
            return Err(bad(path, "truncated ModelTransformation"));
        }
        if m[1] != 0.0 || m[4] != 0.0 {
            return Err(bad(path, "rotated rasters are not supported"));
        }
        return Ok(GeoTransform {
            origin_x: m[3],
            origin_y: m[7],
            pixel_width: m[0],
            pixel_height: m[5],
        });
    }

    Err(bad(path, "no georeferencing transform tags"))
}

fn read_crs<R: std::io::Read + std::io::Seek>(dec: &mut Decoder<R>, path: &Path) -> Result<Crs> {
    let dir = dec
        .find_tag(Tag::Unknown(TAG_GEO_KEY_DIRECTORY))?
        .ok_or_else(|| bad(path, "no GeoKey directory; not a GeoTIFF"))?
        .into_u32_vec()?;
    if dir.len() < 4 || dir.len() % 4 != 0 {
        return Err(bad(path, "malformed GeoKey directory"));
    }

    let mut model_type = None;
    let mut geographic_code = None;
    let mut projected_code = None;

    // Entries are (key id, tag location, count, value) quadruples after the
    // 4-short header; only inline (location 0) values are relevant here.
    for entry in dir[4..].chunks_exact(4) {
        let (key, location, value) = (entry[0], entry[1], entry[3]);
        if location != 0 {
            continue;
        }
        match key as u16 {
            KEY_GT_MODEL_TYPE => model_type = Some(value),
            KEY_GEOGRAPHIC_TYPE => geographic_code = Some(value),
            KEY_PROJECTED_CS_TYPE => projected_code = Some(value),
            _ => {}
        }
    }

    match model_type {
        Some(MODEL_TYPE_PROJECTED) => projected_code
            .map(Crs::from_epsg)
            .ok_or_else(|| bad(path, "projected model without ProjectedCSType key")),
        Some(MODEL_TYPE_GEOGRAPHIC) => geographic_code
            .map(Crs::from_epsg)
            .ok_or_else(|| bad(path, "geographic model without GeographicType key")),
        Some(other) => Err(bad(path, format!("unsupported GeoTIFF model type {other}"))),
        None => Err(bad(path, "GeoKey directory without model type")),
    }
}

/// Write a single-band uint8 mask with the given tile's georeferencing.
///
/// `data` is the `(1, H, W)` mask in row-major order. No nodata sentinel is
/// written.
pub fn write_mask(path: &Path, tile: &Tile, data: &[u8]) -> Result<()> {
    assert_eq!(
        data.len(),
        tile.width * tile.height,
        "mask data does not match tile shape"
    );

    let file = BufWriter::new(File::create(path)?);
    let mut enc = TiffEncoder::new(file)?;
    let mut image = enc.new_image::<colortype::Gray8>(tile.width as u32, tile.height as u32)?;

    let t = &tile.transform;
    let epsg = tile.crs.epsg() as u16;
    let geo_keys: [u16; 16] = if tile.crs.is_metric() {
        [
            1, 1, 0, 3,
            KEY_GT_MODEL_TYPE, 0, 1, MODEL_TYPE_PROJECTED as u16,
            KEY_GT_RASTER_TYPE, 0, 1, RASTER_PIXEL_IS_AREA,
            KEY_PROJECTED_CS_TYPE, 0, 1, epsg,
        ]
    } else {
        [
            1, 1, 0, 3,
            KEY_GT_MODEL_TYPE, 0, 1, MODEL_TYPE_GEOGRAPHIC as u16,
            KEY_GT_RASTER_TYPE, 0, 1, RASTER_PIXEL_IS_AREA,
            KEY_GEOGRAPHIC_TYPE, 0, 1, epsg,
        ]
    };

    {
        let dir = image.encoder();
        dir.write_tag(
            Tag::Unknown(TAG_MODEL_PIXEL_SCALE),
            &[t.pixel_width.abs(), t.pixel_height.abs(), 0.0][..],
        )?;
        dir.write_tag(
            Tag::Unknown(TAG_MODEL_TIEPOINT),
            &[0.0, 0.0, 0.0, t.origin_x, t.origin_y, 0.0][..],
        )?;
        dir.write_tag(Tag::Unknown(TAG_GEO_KEY_DIRECTORY), &geo_keys[..])?;
    }

    image.write_data(data)?;
    Ok(())
}

/// Read a single-band uint8 mask back, with its georeferencing.
pub fn read_mask(path: &Path) -> Result<(Tile, Vec<u8>)> {
    let tile = read_header(path)?;

    let file = BufReader::new(File::open(path)?);
    let mut dec = Decoder::new(file)?;
    match dec.read_image()? {
        DecodingResult::U8(data) => Ok((tile, data)),
        _ => Err(bad(path, "expected a uint8 mask band")),
    }
}
