//! Region classification schemes.
//!
//! A classifier maps one coordinate (in degrees) to an integer region label.
//! Polygon-based schemes may fail to place points that sit exactly on a
//! region boundary; for those the lookup is retried once at a slightly
//! perturbed position, see [`RetryPolicy`].

mod global;
mod polygon;
mod zonal;

pub use global::GlobalRegion;
pub use polygon::{PolygonRegion, PolygonRegions};
pub use zonal::{ZONAL_BAND_NAMES, ZonalBands};

use crate::coords::Coordinate;
use crate::error::{Error, Result};

/// Integer label of a region inside a mask.
pub type RegionId = i32;

/// Outcome of a single lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Region(RegionId),
    Undefined,
}

/// What to do when a lookup returns [`Classification::Undefined`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetryPolicy {
    /// Undefined is final.
    Never,
    /// Shift latitude and longitude by `delta` degrees and look up once more.
    Nudge { delta: f64 },
}

/// The nudge used for the AR6 polygon lookup.
pub const BOUNDARY_NUDGE_DEGREES: f64 = 0.01;

pub trait RegionClassifier: Sync {
    /// Short scheme name, stored as an attribute of the mask.
    fn scheme(&self) -> &'static str;

    fn classify(&self, coord: Coordinate) -> Classification;

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::Never
    }
}

/// Classify `coord`, applying the classifier's retry policy.
///
/// Returns [`Error::Unclassifiable`] when both attempts come back undefined.
pub fn classify_with_retry<C>(classifier: &C, coord: Coordinate) -> Result<RegionId>
where
    C: RegionClassifier + ?Sized,
{
    if let Classification::Region(id) = classifier.classify(coord) {
        return Ok(id);
    }

    let retry = match classifier.retry_policy() {
        RetryPolicy::Never => coord,
        RetryPolicy::Nudge { delta } => {
            let nudged = coord.nudged(delta);
            tracing::warn!(
                "no region found at {}; retrying at {} (perturbed by {} degrees)",
                coord,
                nudged,
                delta
            );
            if let Classification::Region(id) = classifier.classify(nudged) {
                tracing::info!("perturbed lookup placed {} in region {}", coord, id);
                return Ok(id);
            }
            nudged
        }
    };

    Err(Error::Unclassifiable {
        lat: coord.lat,
        lon: coord.lon,
        retry_lat: retry.lat,
        retry_lon: retry.lon,
    })
}
