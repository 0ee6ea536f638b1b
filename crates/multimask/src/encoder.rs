//! The multimask encoder: one chip/label pair in, one sparse mask out.
//!
//! Classification policy per pixel center:
//!
//! - *footprint*: inside any footprint polygon;
//! - *boundary*: within `boundary_width` of a polygon ring, outside every
//!   footprint;
//! - *contact*: within `contact_spacing` of the rings of two or more
//!   distinct polygons.
//!
//! The one-hot channels are collapsed with footprint > boundary > contact
//! precedence, so each pixel ends up with exactly one class.

use geo_types::Polygon;
use rstar::{RTree, RTreeObject, AABB};

use crate::batch::ParamAnnouncer;
use crate::error::Result;
use crate::geotiff;
use crate::pairs::ChipLabelPair;
use crate::raster::{fill_polygon, mark_ring_band, ring_band, Mask, PixelRing};
use crate::tile::Tile;
use crate::units::{reconcile, ReconciledUnits, RunParams};
use crate::vector::PolygonSet;
use crate::{CLASS_BACKGROUND, CLASS_BOUNDARY, CLASS_CONTACT, CLASS_FOOTPRINT};

/// Channel-per-class raster planes, all `(H, W)`.
#[derive(Debug, Clone)]
pub struct OneHotMask {
    pub footprint: Mask,
    pub boundary: Mask,
    pub contact: Mask,
}

impl OneHotMask {
    pub fn zeros(width: usize, height: usize) -> Self {
        Self {
            footprint: Mask::zeros(width, height),
            boundary: Mask::zeros(width, height),
            contact: Mask::zeros(width, height),
        }
    }

    /// Collapse to a single sparse plane, most specific class first.
    pub fn to_sparse(&self) -> Mask {
        let mut sparse = Mask::zeros(self.footprint.width, self.footprint.height);
        for i in 0..sparse.data.len() {
            sparse.data[i] = if self.footprint.data[i] != 0 {
                CLASS_FOOTPRINT
            } else if self.boundary.data[i] != 0 {
                CLASS_BOUNDARY
            } else if self.contact.data[i] != 0 {
                CLASS_CONTACT
            } else {
                CLASS_BACKGROUND
            };
        }
        sparse
    }
}

/// Encode one pair and write the sparse mask to `pair.mask`.
///
/// The mask reuses the chip's shape, transform and CRS, with a single uint8
/// band and no nodata sentinel. An empty polygon set is not an error: it
/// produces a valid all-background mask.
pub fn encode(pair: &ChipLabelPair, params: &RunParams, announcer: &mut ParamAnnouncer) -> Result<()> {
    let tile = Tile::from_geotiff(&pair.chip)?;
    let mut labels = PolygonSet::read_geojson(&pair.label)?;

    if labels.crs != Some(tile.crs) {
        labels.reproject(tile.crs)?;
    }

    let units = reconcile(&tile, params);
    announcer.announce(&tile, &units);

    let polys = labels.explode();
    let onehot = rasterize_onehot(&tile, &polys, &units);
    let sparse = onehot.to_sparse();

    // Row-major single band is already the (1, H, W) layout the writer wants.
    geotiff::write_mask(&pair.mask, &tile, &sparse.data)?;
    Ok(())
}

struct PolyEnvelope {
    id: usize,
    env: AABB<[f64; 2]>,
}

impl RTreeObject for PolyEnvelope {
    type Envelope = AABB<[f64; 2]>;

    #[inline]
    fn envelope(&self) -> Self::Envelope {
        self.env
    }
}

fn ring_to_pixels(tile: &Tile, ring: &geo_types::LineString<f64>) -> PixelRing {
    ring.coords()
        .map(|c| tile.transform.world_to_pixel(c.x, c.y))
        .collect()
}

fn pixel_rings(tile: &Tile, poly: &Polygon<f64>) -> Vec<PixelRing> {
    let mut rings = Vec::with_capacity(1 + poly.interiors().len());
    rings.push(ring_to_pixels(tile, poly.exterior()));
    for hole in poly.interiors() {
        rings.push(ring_to_pixels(tile, hole));
    }
    rings
}

/// Envelope of a polygon's pixel rings, padded by the contact reach.
fn padded_envelope(rings: &[PixelRing], pad: f64) -> Option<AABB<[f64; 2]>> {
    let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
    let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for &(x, y) in rings.iter().flatten() {
        min_x = min_x.min(x);
        max_x = max_x.max(x);
        min_y = min_y.min(y);
        max_y = max_y.max(y);
    }
    if !(min_x.is_finite() && min_y.is_finite() && max_x.is_finite() && max_y.is_finite()) {
        return None;
    }
    Some(AABB::from_corners(
        [min_x - pad, min_y - pad],
        [max_x + pad, max_y + pad],
    ))
}

/// Burn a polygon set into the three one-hot channels.
///
/// Widths arrive reconciled: meters for metric tiles (converted to pixels
/// here against the finer resolution axis, without truncation), already
/// whole pixels otherwise.
pub fn rasterize_onehot(
    tile: &Tile,
    polys: &[Polygon<f64>],
    units: &ReconciledUnits,
) -> OneHotMask {
    let (width, height) = (tile.width, tile.height);
    let mut onehot = OneHotMask::zeros(width, height);

    let pixel_polys: Vec<Vec<PixelRing>> = polys.iter().map(|p| pixel_rings(tile, p)).collect();

    let (boundary_px, contact_px) = if units.metric {
        let (res_x, res_y) = tile.transform.resolution();
        let res = res_x.min(res_y);
        (units.boundary_width / res, units.contact_spacing / res)
    } else {
        (units.boundary_width, units.contact_spacing)
    };

    for rings in &pixel_polys {
        fill_polygon(&mut onehot.footprint, rings, 1);
    }

    for rings in &pixel_polys {
        mark_ring_band(&mut onehot.boundary, rings, boundary_px, 1);
    }
    // Boundary is the zone outside the footprints.
    for (b, f) in onehot.boundary.data.iter_mut().zip(&onehot.footprint.data) {
        if *f != 0 {
            *b = 0;
        }
    }

    // Contact needs two distinct polygons in reach; an R-tree over padded
    // envelopes prunes the band pass to polygons that have a neighbor at all.
    if pixel_polys.len() >= 2 && contact_px > 0.0 {
        let envelopes: Vec<PolyEnvelope> = pixel_polys
            .iter()
            .enumerate()
            .filter_map(|(id, rings)| {
                padded_envelope(rings, contact_px).map(|env| PolyEnvelope { id, env })
            })
            .collect();
        let tree = RTree::bulk_load(
            envelopes
                .iter()
                .map(|e| PolyEnvelope { id: e.id, env: e.env })
                .collect(),
        );

        let mut counts = vec![0u8; width * height];
        let mut stamp = vec![u32::MAX; width * height];

        for envelope in &envelopes {
            let has_neighbor = tree
                .locate_in_envelope_intersecting(&envelope.env)
                .any(|other| other.id != envelope.id);
            if !has_neighbor {
                continue;
            }

            let id = envelope.id as u32;
            ring_band(width, height, &pixel_polys[envelope.id], contact_px, |x, y| {
                let i = y * width + x;
                // One vote per polygon, however many segments cover the pixel.
                if stamp[i] != id {
                    stamp[i] = id;
                    counts[i] = counts[i].saturating_add(1);
                }
            });
        }

        for (c, n) in onehot.contact.data.iter_mut().zip(&counts) {
            if *n >= 2 {
                *c = 1;
            }
        }
    }

    onehot
}
