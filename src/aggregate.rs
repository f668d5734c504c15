//! Area-weighted regional reductions.
//!
//! [`RegionReducer`] collapses the column dimension of a field into one entry
//! per region label, either as a weighted sum or a weighted mean, optionally
//! ignoring values outside a validity range. [`vertical_contraction`]
//! collapses the level dimension and is meant to run before it.
//!
//! A region that receives no contribution (no columns, or every value
//! excluded) yields NaN. Zero would be indistinguishable from a genuine
//! zero-valued region.

use crate::error::{Error, Result};
use crate::field::Field;
use crate::layout::{FieldLayout, LEVEL_DIMS, MAX_RESULT_RANK};
use crate::mask::{RegionIndexMapping, RegionMask};

/// How contributions within a region are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduction {
    /// `sum(f * w) / sum(w)`
    Mean,
    /// `sum(f * w)`
    Integral,
}

/// Inclusive validity range; values outside it are skipped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidBounds {
    pub lower: f64,
    pub upper: f64,
}

impl ValidBounds {
    pub fn new(lower: f64, upper: f64) -> Result<Self> {
        if lower.is_nan() || upper.is_nan() || lower > upper {
            return Err(Error::usage(format!(
                "invalid validity bounds [{lower}, {upper}]"
            )));
        }
        Ok(Self { lower, upper })
    }

    pub fn contains(&self, v: f64) -> bool {
        v >= self.lower && v <= self.upper
    }
}

/// A mask plus per-column weights, ready to reduce fields defined on the same columns.
///
/// By default the region axis spans every label in `[0, max(label) + 1)`.
/// [`RegionReducer::dense`] switches to one entry per distinct label, in
/// [`RegionIndexMapping`] order.
#[derive(Debug, Clone)]
pub struct RegionReducer<'a> {
    mask: &'a RegionMask,
    column_dim: String,
    weight: &'a [f64],
    region_dim: String,
    /// Output slot of each column.
    slots: Vec<usize>,
    nslots: usize,
}

impl<'a> RegionReducer<'a> {
    pub fn new(
        mask: &'a RegionMask,
        column_dim: impl Into<String>,
        weight: &'a [f64],
        region_dim: impl Into<String>,
    ) -> Result<Self> {
        let column_dim = column_dim.into();
        if weight.len() != mask.len() {
            return Err(Error::schema(format!(
                "weight has {} entries but the mask has {} along '{}'",
                weight.len(),
                mask.len(),
                column_dim
            )));
        }
        if let Some((i, w)) = weight.iter().enumerate().find(|(_, w)| !w.is_finite() || **w < 0.0) {
            return Err(Error::schema(format!(
                "weight entry {i} is {w}; weights must be finite and non-negative"
            )));
        }
        Ok(Self {
            mask,
            column_dim,
            weight,
            region_dim: region_dim.into(),
            slots: mask.labels().iter().map(|&l| l as usize).collect(),
            nslots: mask.num_regions(),
        })
    }

    /// Use the dense label ordering for the region axis.
    pub fn dense(mut self) -> Self {
        let mapping = RegionIndexMapping::from_mask(self.mask);
        self.slots = self
            .mask
            .labels()
            .iter()
            .map(|&l| mapping.index_of(l).unwrap_or_default())
            .collect();
        self.nslots = mapping.len();
        self
    }

    pub fn with_region_dim(mut self, region_dim: impl Into<String>) -> Self {
        self.region_dim = region_dim.into();
        self
    }

    /// Length of the region axis of the results.
    pub fn num_regions(&self) -> usize {
        self.nslots
    }

    /// Weighted reduction of every value of `field`.
    pub fn masked_integral(&self, field: &Field, reduction: Reduction) -> Result<Field> {
        self.reduce(field, reduction, None)
    }

    /// Like [`Self::masked_integral`], but values outside `bounds` (and NaN)
    /// are left out of both the weighted sum and the weight sum.
    pub fn bounded_masked_integral(
        &self,
        field: &Field,
        reduction: Reduction,
        bounds: ValidBounds,
    ) -> Result<Field> {
        self.reduce(field, reduction, Some(bounds))
    }

    /// Total weight per region, NaN for regions without columns.
    pub fn region_weights(&self) -> Vec<f64> {
        let mut totals = vec![0.0; self.num_regions()];
        let mut counts = vec![0usize; self.num_regions()];
        for (&slot, &w) in self.slots.iter().zip(self.weight) {
            totals[slot] += w;
            counts[slot] += 1;
        }
        totals
            .into_iter()
            .zip(counts)
            .map(|(t, n)| if n == 0 { f64::NAN } else { t })
            .collect()
    }

    fn reduce(
        &self,
        field: &Field,
        reduction: Reduction,
        bounds: Option<ValidBounds>,
    ) -> Result<Field> {
        let layout = FieldLayout::resolve(field.dims(), &self.column_dim)?;
        if layout.rank() > MAX_RESULT_RANK {
            return Err(Error::schema(format!(
                "'{}' has rank {} ({}); regional results are limited to rank {}",
                field.name(),
                layout.rank(),
                field.dims().join(", "),
                MAX_RESULT_RANK
            )));
        }
        let axis = layout.column.unwrap_or_default();

        let ncol = field.shape()[axis];
        if ncol != self.mask.len() {
            return Err(Error::schema(format!(
                "'{}' has {} entries along '{}' but the mask has {}",
                field.name(),
                ncol,
                self.column_dim,
                self.mask.len()
            )));
        }

        let nreg = self.num_regions();
        let outer: usize = field.shape()[..axis].iter().product();
        let inner: usize = field.shape()[axis + 1..].iter().product();
        let data = field.data();

        let out_len = outer * nreg * inner;
        let mut num = vec![0.0; out_len];
        let mut den = vec![0.0; out_len];
        let mut hits = vec![0usize; out_len];

        for o in 0..outer {
            for (i, (&slot, &w)) in self.slots.iter().zip(self.weight).enumerate() {
                let src = (o * ncol + i) * inner;
                let dst = (o * nreg + slot) * inner;
                for k in 0..inner {
                    let v = data[src + k];
                    if let Some(b) = bounds {
                        if !b.contains(v) {
                            continue;
                        }
                    }
                    num[dst + k] += v * w;
                    den[dst + k] += w;
                    hits[dst + k] += 1;
                }
            }
        }

        let values = num
            .into_iter()
            .zip(den)
            .zip(hits)
            .map(|((n, d), h)| match reduction {
                _ if h == 0 => f64::NAN,
                Reduction::Integral => n,
                Reduction::Mean if d == 0.0 => f64::NAN,
                Reduction::Mean => n / d,
            })
            .collect();

        let mut dims = field.dims().to_vec();
        let mut shape = field.shape().to_vec();
        dims[axis] = self.region_dim.clone();
        shape[axis] = nreg;
        Field::new(field.name(), dims, shape, values)
    }
}

/// How the level range is collapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelReduction {
    Sum,
    /// Sum divided by the sum of weights over the range.
    Average,
}

/// Inclusive range of level indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelRange {
    pub lo: usize,
    pub hi: usize,
}

impl LevelRange {
    pub fn new(lo: usize, hi: usize) -> Result<Self> {
        if lo > hi {
            return Err(Error::usage(format!("invalid level range [{lo}, {hi}]")));
        }
        Ok(Self { lo, hi })
    }
}

/// Weighted reduction over the `lev`/`ilev` dimension of `field`.
///
/// `weight` is one-dimensional over the level dimension, has the exact
/// dimensions of `field` (e.g. a pressure thickness), or the trailing
/// dimensions from the level dimension on, in which case it is shared by
/// every leading index (a static `pdel(lev, ncol)` for `T(time, lev, ncol)`).
/// Without a weight every level counts 1. The result keeps every other
/// dimension.
pub fn vertical_contraction(
    field: &Field,
    weight: Option<&Field>,
    range: LevelRange,
    mode: LevelReduction,
) -> Result<Field> {
    let axis = field
        .dims()
        .iter()
        .position(|d| LEVEL_DIMS.contains(&d.as_str()))
        .ok_or_else(|| {
            Error::schema(format!(
                "'{}' ({}) has no vertical dimension",
                field.name(),
                field.dims().join(", ")
            ))
        })?;
    let level_dim = &field.dims()[axis];
    let nlev = field.shape()[axis];
    if range.hi >= nlev {
        return Err(Error::usage(format!(
            "level range [{}, {}] is out of bounds for '{}' with {} levels",
            range.lo,
            range.hi,
            field.name(),
            nlev
        )));
    }

    enum Weight<'w> {
        Unit,
        PerLevel(&'w [f64]),
        Full(&'w [f64]),
        Trailing(&'w [f64]),
    }

    let weight = match weight {
        None => Weight::Unit,
        Some(w) if w.dims() == field.dims() && w.shape() == field.shape() => Weight::Full(w.data()),
        Some(w) if w.rank() == 1 && w.dims()[0] == *level_dim && w.shape()[0] == nlev => {
            Weight::PerLevel(w.data())
        }
        Some(w) if w.dims() == &field.dims()[axis..] && w.shape() == &field.shape()[axis..] => {
            Weight::Trailing(w.data())
        }
        Some(w) => {
            return Err(Error::schema(format!(
                "weight '{}' ({}) must be ({}), ({}) or match '{}' ({})",
                w.name(),
                w.dims().join(", "),
                level_dim,
                field.dims()[axis..].join(", "),
                field.name(),
                field.dims().join(", ")
            )));
        }
    };

    let outer: usize = field.shape()[..axis].iter().product();
    let inner: usize = field.shape()[axis + 1..].iter().product();
    let data = field.data();
    let mut values = Vec::with_capacity(outer * inner);

    for o in 0..outer {
        for k in 0..inner {
            let mut sum = 0.0;
            let mut wsum = 0.0;
            for lev in range.lo..=range.hi {
                let idx = (o * nlev + lev) * inner + k;
                let w = match weight {
                    Weight::Unit => 1.0,
                    Weight::PerLevel(w) => w[lev],
                    Weight::Full(w) => w[idx],
                    Weight::Trailing(w) => w[lev * inner + k],
                };
                sum += data[idx] * w;
                wsum += w;
            }
            values.push(match mode {
                LevelReduction::Sum => sum,
                LevelReduction::Average if wsum == 0.0 => f64::NAN,
                LevelReduction::Average => sum / wsum,
            });
        }
    }

    let mut dims = field.dims().to_vec();
    let mut shape = field.shape().to_vec();
    dims.remove(axis);
    shape.remove(axis);
    Field::new(field.name(), dims, shape, values)
}
