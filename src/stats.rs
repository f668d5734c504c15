//! Declarative statistics over model fields.
//!
//! A [`StatSpec`] describes one reduction the way the downstream profiling
//! tool spells it in YAML, and [`StatEvaluator`] runs it against the fields
//! of an input dataset.

use crate::aggregate::{LevelRange, LevelReduction, Reduction, RegionReducer, ValidBounds, vertical_contraction};
use crate::dataset::{Dataset, LoadedMask};
use crate::error::Error;
use crate::field::Field;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

fn default_mask_field() -> String {
    "mask".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskedIntegralSpec {
    pub mask_file_name: String,
    #[serde(default = "default_mask_field")]
    pub mask_field: String,
    /// Per-column weight; every column counts 1 when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_field: Option<String>,
    /// Weighted mean when true (the default), weighted sum otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average: Option<bool>,
}

impl MaskedIntegralSpec {
    fn reduction(&self) -> Reduction {
        if self.average.unwrap_or(true) {
            Reduction::Mean
        } else {
            Reduction::Integral
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundedMaskedIntegralSpec {
    #[serde(flatten)]
    pub integral: MaskedIntegralSpec,
    pub valid_bounds: [f64; 2],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerticalContractionSpec {
    /// Inclusive level index range.
    pub level_bounds: [usize; 2],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_field: Option<String>,
    /// Divide by the weight sum when true (the default), plain weighted sum otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average: Option<bool>,
}

impl VerticalContractionSpec {
    fn mode(&self) -> LevelReduction {
        if self.average.unwrap_or(true) {
            LevelReduction::Average
        } else {
            LevelReduction::Sum
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatSpec {
    MaskedIntegral(MaskedIntegralSpec),
    BoundedMaskedIntegral(BoundedMaskedIntegralSpec),
    VerticalContraction(VerticalContractionSpec),
    /// `inner` runs first and its result feeds `outer`.
    Pipe {
        inner: Box<StatSpec>,
        outer: Box<StatSpec>,
    },
}

impl StatSpec {
    pub fn type_name(&self) -> &'static str {
        match self {
            StatSpec::MaskedIntegral(_) => "masked_integral",
            StatSpec::BoundedMaskedIntegral(_) => "bounded_masked_integral",
            StatSpec::VerticalContraction(_) => "vertical_contraction",
            StatSpec::Pipe { .. } => "pipe",
        }
    }

    /// Every (mask file, mask field) pair the spec needs, in evaluation order.
    pub fn mask_refs(&self) -> Vec<(&str, &str)> {
        match self {
            StatSpec::MaskedIntegral(s) => vec![(s.mask_file_name.as_str(), s.mask_field.as_str())],
            StatSpec::BoundedMaskedIntegral(s) => vec![(
                s.integral.mask_file_name.as_str(),
                s.integral.mask_field.as_str(),
            )],
            StatSpec::VerticalContraction(_) => Vec::new(),
            StatSpec::Pipe { inner, outer } => {
                let mut refs = inner.mask_refs();
                refs.extend(outer.mask_refs());
                refs
            }
        }
    }
}

/// Evaluates stat specs against the fields of one input dataset.
///
/// Mask stores are opened once by [`StatEvaluator::load_masks`] and shared
/// by every spec that names them.
pub struct StatEvaluator<'a> {
    input: &'a Dataset,
    mask_files: HashMap<String, Dataset>,
    masks: HashMap<(String, String), LoadedMask>,
}

impl<'a> StatEvaluator<'a> {
    pub fn new(input: &'a Dataset) -> Self {
        Self {
            input,
            mask_files: HashMap::new(),
            masks: HashMap::new(),
        }
    }

    /// Open and validate every mask `spec` refers to
    pub async fn load_masks(&mut self, spec: &StatSpec) -> Result<()> {
        for (file, field) in spec.mask_refs() {
            if !self.mask_files.contains_key(file) {
                debug!("opening mask store '{}'", file);
                let ds = Dataset::open(file)
                    .await
                    .with_context(|| format!("Failed to open mask file '{}'", file))?;
                self.mask_files.insert(file.to_string(), ds);
            }
            let key = (file.to_string(), field.to_string());
            if !self.masks.contains_key(&key) {
                let mask = self.mask_files[file].read_mask(field)?;
                self.masks.insert(key, mask);
            }
        }
        Ok(())
    }

    pub fn evaluate(&self, spec: &StatSpec, field: &Field) -> Result<Field> {
        match spec {
            StatSpec::MaskedIntegral(s) => self.masked_integral(s, field, None),
            StatSpec::BoundedMaskedIntegral(s) => {
                let bounds = ValidBounds::new(s.valid_bounds[0], s.valid_bounds[1])?;
                self.masked_integral(&s.integral, field, Some(bounds))
            }
            StatSpec::VerticalContraction(s) => {
                let range = LevelRange::new(s.level_bounds[0], s.level_bounds[1])?;
                let weight = match &s.weight_field {
                    Some(name) => Some(self.input.read_field(name)?),
                    None => None,
                };
                Ok(vertical_contraction(field, weight.as_ref(), range, s.mode())?)
            }
            StatSpec::Pipe { inner, outer } => {
                let intermediate = self
                    .evaluate(inner, field)
                    .with_context(|| format!("inner '{}' stage", inner.type_name()))?;
                self.evaluate(outer, &intermediate)
                    .with_context(|| format!("outer '{}' stage", outer.type_name()))
            }
        }
    }

    fn masked_integral(
        &self,
        spec: &MaskedIntegralSpec,
        field: &Field,
        bounds: Option<ValidBounds>,
    ) -> Result<Field> {
        let key = (spec.mask_file_name.clone(), spec.mask_field.clone());
        let loaded = self.masks.get(&key).ok_or_else(|| {
            Error::InvalidConfig(format!(
                "mask '{}' from '{}' was not loaded",
                spec.mask_field, spec.mask_file_name
            ))
        })?;

        let weight = match &spec.weight_field {
            Some(name) => self.read_weight(name, loaded, &spec.mask_file_name)?,
            None => vec![1.0; loaded.mask.len()],
        };

        let reducer = RegionReducer::new(&loaded.mask, &loaded.dim, &weight, "")?.dense();
        let n = reducer.num_regions();
        let reducer = reducer.with_region_dim(format!("dim{n}"));
        let result = match bounds {
            Some(b) => reducer.bounded_masked_integral(field, spec.reduction(), b)?,
            None => reducer.masked_integral(field, spec.reduction())?,
        };
        Ok(result)
    }

    /// Weights come from the input dataset, or from the mask store.
    fn read_weight(&self, name: &str, mask: &LoadedMask, mask_file: &str) -> Result<Vec<f64>> {
        let weight = if self.input.has_variable(name) {
            self.input.read_field(name)?
        } else if let Some(ds) = self.mask_files.get(mask_file).filter(|ds| ds.has_variable(name)) {
            ds.read_field(name)?
        } else {
            return Err(Error::schema(format!(
                "weight field '{}' found neither in '{}' nor in '{}'",
                name,
                self.input.path().display(),
                mask_file
            ))
            .into());
        };

        if weight.dims() != [mask.dim.clone()] {
            return Err(Error::schema(format!(
                "weight '{}' has dimensions ({}); it must have the mask's dimension ({})",
                name,
                weight.dims().join(", "),
                mask.dim
            ))
            .into());
        }
        Ok(weight.into_data())
    }
}
