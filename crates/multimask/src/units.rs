//! Reconciling meter-valued run parameters against a tile's unit system.

use crate::tile::Tile;

/// User-supplied widths for a batch run, in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunParams {
    pub boundary_width_m: f64,
    pub contact_spacing_m: f64,
}

impl Default for RunParams {
    fn default() -> Self {
        Self {
            boundary_width_m: 0.5,
            contact_spacing_m: 0.75,
        }
    }
}

/// Widths reconciled for one tile: meters when the tile's CRS is metric,
/// otherwise whole pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconciledUnits {
    pub boundary_width: f64,
    pub contact_spacing: f64,
    pub metric: bool,
}

/// Convert run parameters into the tile's working units.
///
/// Projected tiles keep meter units untouched; resolution does not enter.
/// Geodetic tiles get `meters / min(res_x, res_y)` truncated to whole
/// pixels: dividing by the finer axis never under-counts the physical
/// distance when the two axes sample the ground unevenly.
///
/// Resolution can differ tile to tile, so this runs once per tile.
pub fn reconcile(tile: &Tile, params: &RunParams) -> ReconciledUnits {
    if tile.crs.is_metric() {
        return ReconciledUnits {
            boundary_width: params.boundary_width_m,
            contact_spacing: params.contact_spacing_m,
            metric: true,
        };
    }

    let (res_x, res_y) = tile.transform.resolution();
    let res = res_x.min(res_y);
    ReconciledUnits {
        boundary_width: (params.boundary_width_m / res).floor(),
        contact_spacing: (params.contact_spacing_m / res).floor(),
        metric: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::Crs;
    use crate::tile::GeoTransform;

    fn tile(crs: Crs, res: f64) -> Tile {
        Tile {
            width: 256,
            height: 256,
            transform: GeoTransform {
                origin_x: 0.0,
                origin_y: 0.0,
                pixel_width: res,
                pixel_height: -res,
            },
            crs,
        }
    }

    #[test]
    fn metric_crs_passes_meters_through() {
        let units = reconcile(&tile(Crs::from_epsg(32636), 0.3), &RunParams::default());
        assert!(units.metric);
        assert_eq!(units.boundary_width, 0.5);
        assert_eq!(units.contact_spacing, 0.75);
    }

    #[test]
    fn geodetic_crs_converts_to_whole_pixels() {
        let params = RunParams {
            boundary_width_m: 0.5,
            contact_spacing_m: 0.75,
        };

        let units = reconcile(&tile(Crs::WGS84, 0.1), &params);
        assert!(!units.metric);
        assert_eq!(units.boundary_width, 5.0);
        assert_eq!(units.contact_spacing, 7.0);
    }

    #[test]
    fn conversion_truncates_instead_of_rounding() {
        let params = RunParams {
            boundary_width_m: 0.5,
            contact_spacing_m: 0.75,
        };
        let units = reconcile(&tile(Crs::WGS84, 0.3), &params);
        assert_eq!(units.boundary_width, 1.0);
        assert_eq!(units.contact_spacing, 2.0);
    }

    #[test]
    fn minimum_axis_resolution_wins() {
        let mut t = tile(Crs::WGS84, 0.1);
        t.transform.pixel_height = -0.25;
        let units = reconcile(&t, &RunParams::default());
        assert_eq!(units.boundary_width, 5.0);
    }
}
