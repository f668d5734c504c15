//! Geographic coordinates of grid columns and unit normalization.

use crate::error::{Error, Result};
use std::fmt;

const POLE_TOLERANCE: f64 = 1e-9;

/// A grid column position in degrees.
///
/// Latitude lies in [-90, 90] and longitude in [-180, 180) once built through
/// [`Coordinate::from_raw`] or [`Coordinate::new`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    /// Validate a coordinate already expressed in degrees, wrapping longitude.
    pub fn new(lat: f64, lon: f64) -> Result<Self> {
        if !lat.is_finite() || lat.abs() > 90.0 + POLE_TOLERANCE {
            return Err(Error::InvalidLatitude(lat));
        }
        // Radian round trips can overshoot the pole by an ulp or two.
        let lat = lat.clamp(-90.0, 90.0);
        if !lon.is_finite() {
            return Err(Error::InvalidLongitude(lon));
        }
        Ok(Self {
            lat,
            lon: wrap_longitude(lon),
        })
    }

    /// Convert a raw stored coordinate pair to degrees and validate it.
    pub fn from_raw(lat: f64, lon: f64, units: AngleUnits) -> Result<Self> {
        match units {
            AngleUnits::Degrees => Self::new(lat, lon),
            AngleUnits::Radians => Self::new(lat.to_degrees(), lon.to_degrees()),
        }
    }

    /// The coordinate shifted by `delta` degrees on both axes.
    ///
    /// Latitude saturates at the poles and longitude is wrapped again.
    pub fn nudged(self, delta: f64) -> Self {
        Self {
            lat: (self.lat + delta).clamp(-90.0, 90.0),
            lon: wrap_longitude(self.lon + delta),
        }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(lat = {}, lon = {})", self.lat, self.lon)
    }
}

/// Map any longitude in degrees to [-180, 180).
pub fn wrap_longitude(lon: f64) -> f64 {
    (lon + 180.0).rem_euclid(360.0) - 180.0
}

/// Units of the `lat`/`lon` variables stored in an input dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AngleUnits {
    Degrees,
    Radians,
}

impl AngleUnits {
    /// Interpret a CF `units` attribute (`degrees_north`, `radians`, ...).
    pub fn from_cf_units(units: &str) -> Option<Self> {
        let u = units.trim().to_ascii_lowercase();
        if u.starts_with("degree") || u == "deg" {
            Some(AngleUnits::Degrees)
        } else if u.starts_with("radian") || u == "rad" {
            Some(AngleUnits::Radians)
        } else {
            None
        }
    }
}

/// The columns of a grid, in file order, along with the name of their dimension.
#[derive(Debug, Clone)]
pub struct CoordinateSet {
    pub dim_name: String,
    pub coords: Vec<Coordinate>,
}

impl CoordinateSet {
    /// Build a set from raw stored values, converting units and validating each pair.
    pub fn from_raw(
        dim_name: impl Into<String>,
        lat: &[f64],
        lon: &[f64],
        units: AngleUnits,
    ) -> Result<Self> {
        let dim_name = dim_name.into();
        if lat.len() != lon.len() {
            return Err(Error::schema(format!(
                "lat has {} entries but lon has {} along '{}'",
                lat.len(),
                lon.len(),
                dim_name
            )));
        }

        let coords = lat
            .iter()
            .zip(lon)
            .map(|(&la, &lo)| Coordinate::from_raw(la, lo, units))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { dim_name, coords })
    }

    pub fn len(&self) -> usize {
        self.coords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }
}
