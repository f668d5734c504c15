//! Typed access to the variables of an input store.

use crate::coords::{AngleUnits, CoordinateSet};
use crate::error::Error;
use crate::field::Field;
use crate::mask::RegionMask;
use crate::metadata::{AttributeValue, StoreMetadata, Variable};
use crate::store::ZarrStore;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::warn;

/// How `lat`/`lon` units are determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoordinateUnits {
    /// From the `units` attribute of `lat`; radians when absent.
    #[default]
    Auto,
    Degrees,
    Radians,
}

/// A mask read from a store, with the dimension it is defined over.
#[derive(Debug, Clone)]
pub struct LoadedMask {
    pub name: String,
    pub dim: String,
    pub mask: RegionMask,
}

pub struct Dataset {
    path: PathBuf,
    store: ZarrStore,
    metadata: StoreMetadata,
}

impl Dataset {
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let store = ZarrStore::new(&path)?;
        let metadata = store
            .load_metadata()
            .await
            .with_context(|| format!("Failed to open dataset '{}'", path.display()))?;
        Ok(Self {
            path,
            store,
            metadata,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Variable names in sorted order
    pub fn variable_names(&self) -> impl Iterator<Item = &str> {
        self.metadata.variables.keys().map(String::as_str)
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.metadata.variables.contains_key(name)
    }

    pub fn variable(&self, name: &str) -> Result<&Variable> {
        self.metadata.variables.get(name).ok_or_else(|| {
            Error::schema(format!(
                "variable '{}' not found in '{}'",
                name,
                self.path.display()
            ))
            .into()
        })
    }

    /// Length of a dimension; an error when variables disagree about it
    pub fn dimension_size(&self, name: &str) -> Result<Option<usize>> {
        match self.metadata.dimensions.get(name) {
            None => Ok(None),
            Some(info) if info.conflicting => Err(Error::schema(format!(
                "dimension '{}' has inconsistent lengths in '{}': {:?}",
                name,
                self.path.display(),
                info.appearances
            ))
            .into()),
            Some(info) => Ok(Some(info.length)),
        }
    }

    pub fn read_field(&self, name: &str) -> Result<Field> {
        let variable = self.variable(name)?;
        let data = self
            .store
            .read_array(variable)
            .with_context(|| format!("Failed to read '{}' from '{}'", name, self.path.display()))?;
        Ok(Field::new(
            name,
            variable.dims.clone(),
            variable.shape(),
            data,
        )?)
    }

    /// Read `lat`/`lon` and normalize them to degrees.
    ///
    /// The column dimension is whatever single dimension `lat` is defined on.
    pub fn read_coordinates(&self, units: CoordinateUnits) -> Result<CoordinateSet> {
        let lat_var = self.variable("lat")?;
        let lon_var = self.variable("lon")?;
        if lat_var.dims.len() != 1 || lon_var.dims != lat_var.dims {
            return Err(Error::schema(format!(
                "lat ({}) and lon ({}) must share a single column dimension",
                lat_var.dims.join(", "),
                lon_var.dims.join(", ")
            ))
            .into());
        }

        let units = match units {
            CoordinateUnits::Degrees => AngleUnits::Degrees,
            CoordinateUnits::Radians => AngleUnits::Radians,
            CoordinateUnits::Auto => detect_units(lat_var.attribute("units")),
        };

        let lat = self.read_field("lat")?;
        let lon = self.read_field("lon")?;
        Ok(CoordinateSet::from_raw(
            lat_var.dims[0].clone(),
            lat.data(),
            lon.data(),
            units,
        )?)
    }

    pub fn read_mask(&self, name: &str) -> Result<LoadedMask> {
        let variable = self.variable(name).context("mask variable is missing")?;
        if variable.dims.len() != 1 {
            return Err(Error::schema(format!(
                "mask '{}' has dimensions ({}); expected exactly one column dimension",
                name,
                variable.dims.join(", ")
            ))
            .into());
        }
        let field = self.read_field(name)?;
        let mask = RegionMask::from_stored(field.data())
            .with_context(|| format!("mask '{}' in '{}'", name, self.path.display()))?;
        Ok(LoadedMask {
            name: name.to_string(),
            dim: variable.dims[0].clone(),
            mask,
        })
    }
}

fn detect_units(attr: Option<&AttributeValue>) -> AngleUnits {
    match attr.and_then(|a| a.as_str()) {
        Some(u) => AngleUnits::from_cf_units(u).unwrap_or_else(|| {
            warn!("unrecognized coordinate units '{}'; assuming radians", u);
            AngleUnits::Radians
        }),
        None => {
            warn!("lat has no units attribute; assuming radians");
            AngleUnits::Radians
        }
    }
}
