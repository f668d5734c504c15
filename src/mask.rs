//! Region masks: construction from coordinates, and the label renumbering
//! used by region-reduced fields.

use crate::coords::Coordinate;
use crate::error::{Error, Result};
use crate::regions::{RegionClassifier, RegionId, classify_with_retry};
use rayon::prelude::*;

/// One region label per grid column, in column order.
///
/// Labels are non-negative but not necessarily contiguous.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionMask {
    labels: Vec<RegionId>,
}

impl RegionMask {
    pub fn new(labels: Vec<RegionId>) -> Result<Self> {
        if let Some((i, l)) = labels.iter().enumerate().find(|(_, l)| **l < 0) {
            return Err(Error::InvalidMask(format!(
                "column {i} has label {l}; masks may not contain negative labels"
            )));
        }
        Ok(Self { labels })
    }

    /// Build a mask from stored values, which may be floating point.
    pub fn from_stored(values: &[f64]) -> Result<Self> {
        let labels = values
            .iter()
            .enumerate()
            .map(|(i, &v)| {
                if v.is_finite() && v.fract() == 0.0 && v >= 0.0 && v <= RegionId::MAX as f64 {
                    Ok(v as RegionId)
                } else {
                    Err(Error::InvalidMask(format!(
                        "column {i} holds {v}, which is not a non-negative integer label"
                    )))
                }
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { labels })
    }

    pub fn labels(&self) -> &[RegionId] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Length of the region axis of aggregated output: `max(label) + 1`.
    pub fn num_regions(&self) -> usize {
        self.labels.iter().max().map(|&m| m as usize + 1).unwrap_or(0)
    }

    /// Distinct labels in ascending order.
    pub fn distinct_labels(&self) -> Vec<RegionId> {
        let mut labels = self.labels.clone();
        labels.sort_unstable();
        labels.dedup();
        labels
    }
}

/// Classify every coordinate, keeping input order.
///
/// Fails as a whole on the first coordinate that cannot be classified after
/// the classifier's retry policy.
pub fn build_mask<C>(coords: &[Coordinate], classifier: &C) -> Result<RegionMask>
where
    C: RegionClassifier + ?Sized,
{
    let labels = coords
        .par_iter()
        .map(|&c| classify_with_retry(classifier, c))
        .collect::<Result<Vec<_>>>()?;
    RegionMask::new(labels)
}

/// Dense renumbering of the labels present in a mask.
///
/// Labels are sorted ascending and each is assigned its rank. Region-reduced
/// statistics are stored in that order, so this is what maps their entries
/// back onto the grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionIndexMapping {
    labels: Vec<RegionId>,
}

impl RegionIndexMapping {
    pub fn from_mask(mask: &RegionMask) -> Self {
        Self {
            labels: mask.distinct_labels(),
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[RegionId] {
        &self.labels
    }

    pub fn index_of(&self, label: RegionId) -> Option<usize> {
        self.labels.binary_search(&label).ok()
    }

    /// Gather a densely indexed per-region vector onto every column of `mask`.
    pub fn expand(&self, mask: &RegionMask, reduced: &[f64]) -> Result<Vec<f64>> {
        if reduced.len() != self.len() {
            return Err(Error::schema(format!(
                "reduced field has {} entries but the mask has {} distinct labels",
                reduced.len(),
                self.len()
            )));
        }
        mask.labels()
            .iter()
            .map(|&l| {
                self.index_of(l).map(|i| reduced[i]).ok_or_else(|| {
                    Error::InvalidMask(format!("label {l} is not part of the mapping"))
                })
            })
            .collect()
    }

    /// Centroid of each region's columns, in dense index order.
    ///
    /// Longitudes are averaged on the unit circle so regions straddling the
    /// antimeridian get a sensible centre.
    pub fn representatives(&self, mask: &RegionMask, coords: &[Coordinate]) -> Result<Vec<Coordinate>> {
        if coords.len() != mask.len() {
            return Err(Error::schema(format!(
                "mask has {} columns but {} coordinates were given",
                mask.len(),
                coords.len()
            )));
        }

        let mut sums = vec![(0.0f64, 0.0f64, 0.0f64, 0usize); self.len()];
        for (&label, c) in mask.labels().iter().zip(coords) {
            let Some(i) = self.index_of(label) else {
                continue;
            };
            let (lon_sin, lon_cos) = c.lon.to_radians().sin_cos();
            let s = &mut sums[i];
            s.0 += c.lat;
            s.1 += lon_sin;
            s.2 += lon_cos;
            s.3 += 1;
        }

        sums.into_iter()
            .map(|(lat, s, c, n)| {
                let n = n.max(1) as f64;
                Coordinate::new(lat / n, s.atan2(c).to_degrees())
            })
            .collect()
    }
}

/// Expand a region-reduced vector to one value per column.
///
/// Vectors with one entry per distinct label use the dense
/// [`RegionIndexMapping`] convention. Vectors of length `max(label) + 1` are
/// indexed by the label itself, which is how region means are laid out. The
/// two conventions coincide when labels are contiguous from 0.
pub fn expand_region_values(mask: &RegionMask, values: &[f64]) -> Result<Vec<f64>> {
    let mapping = RegionIndexMapping::from_mask(mask);
    if values.len() == mapping.len() {
        return mapping.expand(mask, values);
    }
    if values.len() == mask.num_regions() {
        return Ok(mask.labels().iter().map(|&l| values[l as usize]).collect());
    }
    Err(Error::schema(format!(
        "reduced field has {} entries; expected {} (one per distinct label) or {} (max label + 1)",
        values.len(),
        mapping.len(),
        mask.num_regions()
    )))
}
