//! GeoJSON footprint collections.
//!
//! One label file holds one FeatureCollection of building polygons for one
//! chip. Null and empty geometries are dropped at load time; non-areal
//! geometries are ignored. Per GeoJSON, a collection without a `crs` member
//! is WGS84; a `crs` member naming an unknown system leaves the set without
//! a usable CRS, which only becomes an error once reprojection is needed.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use geo_types::{Coord, LineString, MultiPolygon, Polygon};
use log::debug;
use serde::Deserialize;

use crate::crs::{reproject_coords, Crs};
use crate::error::{MaskError, Result};

#[derive(Debug, Deserialize)]
struct GeoJsonRoot {
    #[serde(default)]
    crs: Option<CrsSpec>,
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct CrsSpec {
    #[serde(default)]
    properties: Option<CrsProps>,
}

#[derive(Debug, Deserialize)]
struct CrsProps {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default)]
    geometry: Option<GeomSpec>,
}

#[derive(Debug, Deserialize)]
struct GeomSpec {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    coordinates: serde_json::Value,
}

/// The footprint polygons associated with one chip.
#[derive(Debug, Clone)]
pub struct PolygonSet {
    pub path: PathBuf,
    pub crs: Option<Crs>,
    geoms: Vec<MultiPolygon<f64>>,
}

impl PolygonSet {
    /// Load a FeatureCollection, dropping null/empty geometries.
    pub fn read_geojson(path: &Path) -> Result<PolygonSet> {
        let file = BufReader::new(File::open(path)?);
        let root: GeoJsonRoot =
            serde_json::from_reader(file).map_err(|e| MaskError::BadLabel {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let crs = match root.crs {
            // No crs member at all: GeoJSON defaults to WGS84.
            None => Some(Crs::WGS84),
            Some(spec) => spec
                .properties
                .and_then(|p| p.name)
                .and_then(|name| Crs::parse(&name)),
        };

        let mut geoms = Vec::new();
        let mut dropped = 0usize;
        for feature in root.features {
            let Some(geom) = feature.geometry else {
                dropped += 1;
                continue;
            };
            match parse_geometry(&geom, path)? {
                Some(mp) => geoms.push(mp),
                None => dropped += 1,
            }
        }
        if dropped > 0 {
            debug!("{}: dropped {dropped} null/empty geometries", path.display());
        }

        Ok(PolygonSet {
            path: path.to_path_buf(),
            crs,
            geoms,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.geoms.is_empty()
    }

    pub fn len(&self) -> usize {
        self.geoms.len()
    }

    /// Reproject every coordinate into `target`, in place.
    pub fn reproject(&mut self, target: Crs) -> Result<()> {
        let source = self.crs.ok_or_else(|| MaskError::MissingCrs {
            path: self.path.clone(),
        })?;
        if source == target {
            return Ok(());
        }

        for mp in &mut self.geoms {
            let mut reprojected = Vec::with_capacity(mp.0.len());
            for poly in &mp.0 {
                let exterior = reproject_ring(poly.exterior(), source, target)?;
                let interiors = poly
                    .interiors()
                    .iter()
                    .map(|ring| reproject_ring(ring, source, target))
                    .collect::<Result<Vec<_>>>()?;
                reprojected.push(Polygon::new(exterior, interiors));
            }
            *mp = MultiPolygon(reprojected);
        }
        self.crs = Some(target);
        Ok(())
    }

    /// Flatten multi-part geometries into independent single-part polygons.
    ///
    /// Parts are not grouped back by their source feature, so two parts of
    /// one original multipolygon score contact against each other exactly
    /// like two separate buildings do.
    pub fn explode(&self) -> Vec<Polygon<f64>> {
        self.geoms
            .iter()
            .flat_map(|mp| mp.0.iter().cloned())
            .collect()
    }
}

fn reproject_ring(ring: &LineString<f64>, from: Crs, to: Crs) -> Result<LineString<f64>> {
    let mut pts: Vec<(f64, f64)> = ring.coords().map(|c| (c.x, c.y)).collect();
    reproject_coords(from, to, &mut pts)?;
    Ok(pts.into_iter().map(|(x, y)| Coord { x, y }).collect())
}

fn parse_geometry(geom: &GeomSpec, path: &Path) -> Result<Option<MultiPolygon<f64>>> {
    match geom.kind.as_str() {
        "Polygon" => {
            let rings: Vec<Vec<Vec<f64>>> = from_coords(&geom.coordinates, path)?;
            Ok(build_polygon(&rings, path)?.map(|p| MultiPolygon(vec![p])))
        }
        "MultiPolygon" => {
            let parts: Vec<Vec<Vec<Vec<f64>>>> = from_coords(&geom.coordinates, path)?;
            let mut polys = Vec::new();
            for rings in &parts {
                if let Some(p) = build_polygon(rings, path)? {
                    polys.push(p);
                }
            }
            if polys.is_empty() {
                Ok(None)
            } else {
                Ok(Some(MultiPolygon(polys)))
            }
        }
        // Footprint labels are areal; anything else carries no mask signal.
        other => {
            debug!("{}: ignoring {other} geometry", path.display());
            Ok(None)
        }
    }
}

fn from_coords<T: serde::de::DeserializeOwned>(value: &serde_json::Value, path: &Path) -> Result<T> {
    serde_json::from_value(value.clone()).map_err(|e| MaskError::BadLabel {
        path: path.to_path_buf(),
        reason: format!("malformed coordinates: {e}"),
    })
}

fn build_polygon(rings: &[Vec<Vec<f64>>], path: &Path) -> Result<Option<Polygon<f64>>> {
    let Some(exterior) = rings.first() else {
        return Ok(None); // empty coordinates: an empty geometry
    };
    let exterior = build_ring(exterior, path)?;
    let interiors = rings[1..]
        .iter()
        .map(|r| build_ring(r, path))
        .collect::<Result<Vec<_>>>()?;
    Ok(Some(Polygon::new(exterior, interiors)))
}

fn build_ring(positions: &[Vec<f64>], path: &Path) -> Result<LineString<f64>> {
    let mut coords = Vec::with_capacity(positions.len());
    for pos in positions {
        if pos.len() < 2 {
            return Err(MaskError::BadLabel {
                path: path.to_path_buf(),
                reason: "coordinate position with fewer than 2 values".to_string(),
            });
        }
        coords.push(Coord {
            x: pos[0],
            y: pos[1],
        });
    }
    // Close the ring if the source left it open.
    if let (Some(first), Some(last)) = (coords.first().copied(), coords.last().copied()) {
        if first != last {
            coords.push(first);
        }
    }
    Ok(LineString(coords))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_label(json: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.geojson");
        File::create(&path)
            .unwrap()
            .write_all(json.as_bytes())
            .unwrap();
        (dir, path)
    }

    #[test]
    fn null_and_empty_geometries_are_dropped() {
        let (_dir, path) = write_label(
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","geometry":null,"properties":{}},
                {"type":"Feature","geometry":{"type":"Polygon","coordinates":[]},"properties":{}},
                {"type":"Feature","geometry":{"type":"Polygon","coordinates":
                    [[[0.0,0.0],[1.0,0.0],[1.0,1.0],[0.0,1.0],[0.0,0.0]]]},"properties":{}}
            ]}"#,
        );
        let set = PolygonSet::read_geojson(&path).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.crs, Some(Crs::WGS84));
    }

    #[test]
    fn multipolygons_explode_into_parts() {
        let (_dir, path) = write_label(
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","geometry":{"type":"MultiPolygon","coordinates":[
                    [[[0.0,0.0],[1.0,0.0],[1.0,1.0],[0.0,0.0]]],
                    [[[5.0,5.0],[6.0,5.0],[6.0,6.0],[5.0,5.0]]]
                ]},"properties":{}}
            ]}"#,
        );
        let set = PolygonSet::read_geojson(&path).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.explode().len(), 2);
    }

    #[test]
    fn explicit_crs_member_is_honored() {
        let (_dir, path) = write_label(
            r#"{"type":"FeatureCollection",
                "crs":{"type":"name","properties":{"name":"urn:ogc:def:crs:EPSG::32636"}},
                "features":[]}"#,
        );
        let set = PolygonSet::read_geojson(&path).unwrap();
        assert_eq!(set.crs, Some(Crs::from_epsg(32636)));
        assert!(set.is_empty());
    }

    #[test]
    fn unknown_crs_blocks_reprojection() {
        let (_dir, path) = write_label(
            r#"{"type":"FeatureCollection",
                "crs":{"type":"name","properties":{"name":"garbage"}},
                "features":[]}"#,
        );
        let mut set = PolygonSet::read_geojson(&path).unwrap();
        assert_eq!(set.crs, None);
        assert!(matches!(
            set.reproject(Crs::WEB_MERCATOR),
            Err(MaskError::MissingCrs { .. })
        ));
    }

    #[test]
    fn reprojection_moves_coordinates() {
        let (_dir, path) = write_label(
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","geometry":{"type":"Polygon","coordinates":
                    [[[0.0,0.0],[0.001,0.0],[0.001,0.001],[0.0,0.001],[0.0,0.0]]]},"properties":{}}
            ]}"#,
        );
        let mut set = PolygonSet::read_geojson(&path).unwrap();
        set.reproject(Crs::WEB_MERCATOR).unwrap();
        assert_eq!(set.crs, Some(Crs::WEB_MERCATOR));

        let polys = set.explode();
        let c = polys[0].exterior().0[1];
        assert!((c.x - 111.32).abs() < 0.1); // 0.001 degrees of longitude in meters
    }
}
