use super::{BOUNDARY_NUDGE_DEGREES, Classification, RegionClassifier, RegionId, RetryPolicy};
use crate::coords::{Coordinate, wrap_longitude};
use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::HashSet;

/// Points closer than this (in degrees) to a ring edge count as on the boundary.
const EDGE_EPSILON: f64 = 1e-10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Hit {
    Inside,
    Boundary,
    Outside,
}

/// One ring, as (lon, lat) vertices in degrees. The closing vertex may or may not repeat the first.
#[derive(Debug, Clone)]
struct Ring {
    vertices: Vec<(f64, f64)>,
}

impl Ring {
    fn edges(&self) -> impl Iterator<Item = ((f64, f64), (f64, f64))> + '_ {
        let n = self.vertices.len();
        (0..n).map(move |i| (self.vertices[i], self.vertices[(i + 1) % n]))
    }

    fn hit(&self, x: f64, y: f64) -> Hit {
        // An edge along a pole is the rim of the map, not a border with another region.
        if self
            .edges()
            .any(|((xi, yi), (xj, yj))| is_polar_edge(yi, yj) && on_segment(x, y, xi, yi, xj, yj))
        {
            return Hit::Inside;
        }

        let mut inside = false;
        for ((xi, yi), (xj, yj)) in self.edges() {
            if on_segment(x, y, xi, yi, xj, yj) {
                return Hit::Boundary;
            }

            if (yi > y) != (yj > y) {
                let x_cross = xi + (y - yi) * (xj - xi) / (yj - yi);
                if x < x_cross {
                    inside = !inside;
                }
            }
        }
        if inside { Hit::Inside } else { Hit::Outside }
    }
}

fn is_polar_edge(yi: f64, yj: f64) -> bool {
    yi == yj && yi.abs() == 90.0
}

fn on_segment(x: f64, y: f64, xi: f64, yi: f64, xj: f64, yj: f64) -> bool {
    if x < xi.min(xj) - EDGE_EPSILON
        || x > xi.max(xj) + EDGE_EPSILON
        || y < yi.min(yj) - EDGE_EPSILON
        || y > yi.max(yj) + EDGE_EPSILON
    {
        return false;
    }
    let cross = (xj - xi) * (y - yi) - (yj - yi) * (x - xi);
    let len = ((xj - xi).powi(2) + (yj - yi).powi(2)).sqrt();
    if len == 0.0 {
        return (x - xi).abs() <= EDGE_EPSILON && (y - yi).abs() <= EDGE_EPSILON;
    }
    cross.abs() / len <= EDGE_EPSILON
}

/// An exterior ring with optional holes.
#[derive(Debug, Clone)]
struct Polygon {
    exterior: Ring,
    holes: Vec<Ring>,
    bbox: (f64, f64, f64, f64),
}

impl Polygon {
    fn new(rings: Vec<Ring>) -> Option<Self> {
        let mut rings = rings.into_iter();
        let exterior = rings.next()?;
        if exterior.vertices.len() < 3 {
            return None;
        }
        let mut bbox = (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
        for &(x, y) in &exterior.vertices {
            bbox.0 = bbox.0.min(x);
            bbox.1 = bbox.1.min(y);
            bbox.2 = bbox.2.max(x);
            bbox.3 = bbox.3.max(y);
        }
        Some(Self {
            exterior,
            holes: rings.collect(),
            bbox,
        })
    }

    fn hit(&self, x: f64, y: f64) -> Hit {
        let (x0, y0, x1, y1) = self.bbox;
        if x < x0 - EDGE_EPSILON || x > x1 + EDGE_EPSILON || y < y0 - EDGE_EPSILON || y > y1 + EDGE_EPSILON {
            return Hit::Outside;
        }
        match self.exterior.hit(x, y) {
            Hit::Inside => {}
            other => return other,
        }
        for hole in &self.holes {
            match hole.hit(x, y) {
                Hit::Outside => {}
                Hit::Boundary => return Hit::Boundary,
                Hit::Inside => return Hit::Outside,
            }
        }
        Hit::Inside
    }
}

/// A named region made of one or more polygons.
#[derive(Debug, Clone)]
pub struct PolygonRegion {
    pub id: RegionId,
    pub name: String,
    pub abbrev: String,
    polygons: Vec<Polygon>,
}

impl PolygonRegion {
    fn hit(&self, coord: Coordinate) -> Hit {
        let mut boundary = false;
        for polygon in &self.polygons {
            match polygon.hit(coord.lon, coord.lat) {
                Hit::Inside => return Hit::Inside,
                Hit::Boundary => boundary = true,
                Hit::Outside => {}
            }
        }
        if boundary { Hit::Boundary } else { Hit::Outside }
    }
}

/// A set of polygonal regions such as the IPCC AR6 reference regions.
///
/// Points on a region boundary, or outside every region, are undefined; the
/// lookup is retried once with a [`BOUNDARY_NUDGE_DEGREES`] nudge.
#[derive(Debug, Clone)]
pub struct PolygonRegions {
    regions: Vec<PolygonRegion>,
}

#[derive(Deserialize)]
struct FeatureCollection {
    features: Vec<Feature>,
}

#[derive(Deserialize)]
struct Feature {
    #[serde(default)]
    properties: Option<serde_json::Map<String, serde_json::Value>>,
    geometry: Geometry,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum Geometry {
    Polygon { coordinates: Vec<Vec<Vec<f64>>> },
    MultiPolygon { coordinates: Vec<Vec<Vec<Vec<f64>>>> },
}

fn parse_ring(raw: Vec<Vec<f64>>) -> Result<Ring> {
    let vertices = raw
        .into_iter()
        .map(|pos| match pos.as_slice() {
            [lon, lat, ..] => Ok((wrap_ring_longitude(*lon), *lat)),
            _ => Err(Error::InvalidConfig(
                "GeoJSON position with fewer than 2 values".to_string(),
            )),
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Ring { vertices })
}

/// Ring vertices keep +180 as is, so regions touching the antimeridian stay closed.
fn wrap_ring_longitude(lon: f64) -> f64 {
    if lon == 180.0 { lon } else { wrap_longitude(lon) }
}

fn property_str(props: &serde_json::Map<String, serde_json::Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| props.get(*k).and_then(|v| v.as_str()).map(str::to_string))
}

impl PolygonRegions {
    /// Parse a GeoJSON `FeatureCollection`, one feature per region.
    ///
    /// The region id is the integer `number` property when present, and the
    /// feature's position in the collection otherwise.
    pub fn from_geojson_str(text: &str) -> Result<Self> {
        let collection: FeatureCollection = serde_json::from_str(text)
            .map_err(|e| Error::InvalidConfig(format!("malformed GeoJSON regions: {e}")))?;

        let mut seen = HashSet::new();
        let mut regions = Vec::with_capacity(collection.features.len());
        for (index, feature) in collection.features.into_iter().enumerate() {
            let props = feature.properties.unwrap_or_default();
            let id = match props.get("number").and_then(|v| v.as_i64()) {
                Some(n) => RegionId::try_from(n).map_err(|_| {
                    Error::InvalidConfig(format!("region number {n} is out of range"))
                })?,
                None => index as RegionId,
            };
            if id < 0 {
                return Err(Error::InvalidConfig(format!("negative region number {id}")));
            }
            if !seen.insert(id) {
                return Err(Error::InvalidConfig(format!("duplicate region number {id}")));
            }

            let raw_polygons = match feature.geometry {
                Geometry::Polygon { coordinates } => vec![coordinates],
                Geometry::MultiPolygon { coordinates } => coordinates,
            };
            let mut polygons = Vec::with_capacity(raw_polygons.len());
            for raw in raw_polygons {
                let rings = raw.into_iter().map(parse_ring).collect::<Result<Vec<_>>>()?;
                let polygon = Polygon::new(rings).ok_or_else(|| {
                    Error::InvalidConfig(format!("region {id} has a degenerate polygon"))
                })?;
                polygons.push(polygon);
            }

            regions.push(PolygonRegion {
                id,
                name: property_str(&props, &["Name", "name"]).unwrap_or_else(|| format!("region {id}")),
                abbrev: property_str(&props, &["Acronym", "abbrev"]).unwrap_or_default(),
                polygons,
            });
        }

        if regions.is_empty() {
            return Err(Error::InvalidConfig("GeoJSON contains no regions".to_string()));
        }
        Ok(Self { regions })
    }

    pub fn regions(&self) -> &[PolygonRegion] {
        &self.regions
    }
}

impl RegionClassifier for PolygonRegions {
    fn scheme(&self) -> &'static str {
        "ar6"
    }

    fn classify(&self, coord: Coordinate) -> Classification {
        self.regions
            .iter()
            .find(|r| r.hit(coord) == Hit::Inside)
            .map(|r| Classification::Region(r.id))
            .unwrap_or(Classification::Undefined)
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::Nudge {
            delta: BOUNDARY_NUDGE_DEGREES,
        }
    }
}
