//! Coordinate reference systems for chips and label collections.
//!
//! Chips and labels carry EPSG-coded reference systems. The pipeline only
//! needs two judgements about a CRS: whether its units are meters (projected)
//! or degrees (geodetic), and how to move coordinates between two systems.
//! Reprojection is delegated to proj4rs; the supported EPSG families are the
//! ones aerial chip corpora actually use (WGS84/NAD83/ETRS89 geodetic, web
//! mercator, UTM).

use crate::error::{MaskError, Result};

/// An EPSG-coded coordinate reference system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crs {
    epsg: u32,
}

impl Crs {
    /// WGS84 geodetic (GeoJSON's default reference system).
    pub const WGS84: Crs = Crs { epsg: 4326 };

    /// Web-mercator, the reference system of slippy-map tiles.
    pub const WEB_MERCATOR: Crs = Crs { epsg: 3857 };

    pub fn from_epsg(epsg: u32) -> Self {
        Self { epsg }
    }

    pub fn epsg(&self) -> u32 {
        self.epsg
    }

    /// Parse a CRS identifier as found in GeoJSON `crs` members:
    /// `EPSG:4326`, `urn:ogc:def:crs:EPSG::32636`, or the OGC CRS84 alias.
    pub fn parse(name: &str) -> Option<Crs> {
        let name = name.trim();
        if name.eq_ignore_ascii_case("urn:ogc:def:crs:OGC:1.3:CRS84")
            || name.eq_ignore_ascii_case("CRS84")
        {
            return Some(Crs::WGS84);
        }
        // Both `EPSG:code` and `urn:ogc:def:crs:EPSG::code` end in the code.
        let code = name.rsplit(':').next()?;
        code.parse::<u32>().ok().map(Crs::from_epsg)
    }

    /// Whether coordinates are angular degrees rather than linear meters.
    ///
    /// Geodetic systems seen in footprint corpora are the 4xxx geographic-2D
    /// family; anything else is treated as projected/metric.
    pub fn is_geographic(&self) -> bool {
        matches!(self.epsg, 4326 | 4269 | 4258 | 4283 | 4617)
    }

    pub fn is_metric(&self) -> bool {
        !self.is_geographic()
    }

    fn proj_def(&self) -> Result<String> {
        match self.epsg {
            4326 => Ok("+proj=longlat +datum=WGS84 +no_defs".to_string()),
            4269 | 4258 => Ok("+proj=longlat +ellps=GRS80 +no_defs".to_string()),
            3857 => Ok(
                "+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 +x_0=0 +y_0=0 \
                 +k=1 +units=m +nadgrids=@null +no_defs"
                    .to_string(),
            ),
            32601..=32660 => Ok(format!(
                "+proj=utm +zone={} +datum=WGS84 +units=m +no_defs",
                self.epsg - 32600
            )),
            32701..=32760 => Ok(format!(
                "+proj=utm +zone={} +south +datum=WGS84 +units=m +no_defs",
                self.epsg - 32700
            )),
            code => Err(MaskError::UnsupportedCrs(code)),
        }
    }
}

/// Reproject `(x, y)` coordinate pairs from one CRS to another, in place.
///
/// Geodetic endpoints are degree-valued on the outside; the radian
/// convention of proj4rs is kept internal to this function.
pub fn reproject_coords(from: Crs, to: Crs, coords: &mut [(f64, f64)]) -> Result<()> {
    if from == to {
        return Ok(());
    }

    let src = proj4rs::proj::Proj::from_proj_string(&from.proj_def()?).map_err(|e| {
        MaskError::Reprojection {
            from: from.epsg(),
            to: to.epsg(),
            reason: e.to_string(),
        }
    })?;
    let dst = proj4rs::proj::Proj::from_proj_string(&to.proj_def()?).map_err(|e| {
        MaskError::Reprojection {
            from: from.epsg(),
            to: to.epsg(),
            reason: e.to_string(),
        }
    })?;

    for coord in coords.iter_mut() {
        let mut point = if from.is_geographic() {
            (coord.0.to_radians(), coord.1.to_radians(), 0.0)
        } else {
            (coord.0, coord.1, 0.0)
        };

        proj4rs::transform::transform(&src, &dst, &mut point).map_err(|e| {
            MaskError::Reprojection {
                from: from.epsg(),
                to: to.epsg(),
                reason: e.to_string(),
            }
        })?;

        *coord = if to.is_geographic() {
            (point.0.to_degrees(), point.1.to_degrees())
        } else {
            (point.0, point.1)
        };
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geodetic_codes_are_not_metric() {
        assert!(!Crs::WGS84.is_metric());
        assert!(!Crs::from_epsg(4269).is_metric());
        assert!(Crs::WEB_MERCATOR.is_metric());
        assert!(Crs::from_epsg(32636).is_metric());
    }

    #[test]
    fn parses_common_crs_names() {
        assert_eq!(Crs::parse("EPSG:4326"), Some(Crs::WGS84));
        assert_eq!(
            Crs::parse("urn:ogc:def:crs:EPSG::32636"),
            Some(Crs::from_epsg(32636))
        );
        assert_eq!(Crs::parse("urn:ogc:def:crs:OGC:1.3:CRS84"), Some(Crs::WGS84));
        assert_eq!(Crs::parse("not a crs"), None);
    }

    #[test]
    fn wgs84_to_web_mercator_round_numbers() {
        let mut pts = vec![(0.0, 0.0), (90.0, 0.0)];
        reproject_coords(Crs::WGS84, Crs::WEB_MERCATOR, &mut pts).unwrap();

        assert!(pts[0].0.abs() < 1e-6 && pts[0].1.abs() < 1e-6);
        // A quarter of the equator east of Greenwich.
        assert!((pts[1].0 - 10_018_754.17).abs() < 1.0);
        assert!(pts[1].1.abs() < 1e-6);
    }

    #[test]
    fn round_trip_preserves_coordinates() {
        let original = (33.5, 49.99);
        let mut pts = vec![original];
        reproject_coords(Crs::WGS84, Crs::from_epsg(32636), &mut pts).unwrap();
        reproject_coords(Crs::from_epsg(32636), Crs::WGS84, &mut pts).unwrap();

        assert!((pts[0].0 - original.0).abs() < 1e-6);
        assert!((pts[0].1 - original.1).abs() < 1e-6);
    }

    #[test]
    fn unknown_epsg_is_rejected() {
        let mut pts = vec![(0.0, 0.0)];
        let err = reproject_coords(Crs::from_epsg(9999), Crs::WGS84, &mut pts);
        assert!(matches!(err, Err(MaskError::UnsupportedCrs(9999))));
    }
}
