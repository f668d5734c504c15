//! Resolution of dimension names to the roles the aggregator understands.

use crate::error::{Error, Result};

pub const TIME_DIM: &str = "time";
pub const LEVEL_DIMS: [&str; 2] = ["lev", "ilev"];
pub const REGION_DIM: &str = "nreg";

/// Highest rank a per-variable regional result may have (time x level x region).
pub const MAX_RESULT_RANK: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimRole {
    Time,
    Level,
    Column,
    /// A region axis of an already-reduced field.
    Region,
}

/// Which axis of a field plays which role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldLayout {
    pub roles: Vec<DimRole>,
    pub time: Option<usize>,
    pub level: Option<usize>,
    pub column: Option<usize>,
    pub region: Option<usize>,
}

impl FieldLayout {
    /// Resolve a per-column layout; the column dimension must be present.
    pub fn resolve(dims: &[String], column_dim: &str) -> Result<Self> {
        let layout = Self::resolve_impl(dims, column_dim, false)?;
        if layout.column.is_none() {
            return Err(Error::schema(format!(
                "layout ({}) has no '{}' dimension",
                dims.join(", "),
                column_dim
            )));
        }
        Ok(layout)
    }

    /// Resolve a layout that is either per column or already reduced to regions.
    ///
    /// When the column dimension is absent, the one remaining dimension that
    /// is neither time nor level is taken as the region axis.
    pub fn resolve_reduced(dims: &[String], column_dim: &str) -> Result<Self> {
        let layout = Self::resolve_impl(dims, column_dim, true)?;
        if layout.column.is_none() && layout.region.is_none() {
            return Err(Error::schema(format!(
                "layout ({}) has neither a '{}' nor a region dimension",
                dims.join(", "),
                column_dim
            )));
        }
        Ok(layout)
    }

    fn resolve_impl(dims: &[String], column_dim: &str, allow_region: bool) -> Result<Self> {
        let mut layout = FieldLayout {
            roles: Vec::with_capacity(dims.len()),
            time: None,
            level: None,
            column: None,
            region: None,
        };

        for (axis, dim) in dims.iter().enumerate() {
            let role = if dim == TIME_DIM {
                if axis != 0 {
                    return Err(Error::schema(format!(
                        "'{}' must be the slowest-varying dimension, but layout is ({})",
                        TIME_DIM,
                        dims.join(", ")
                    )));
                }
                layout.time = Some(axis);
                DimRole::Time
            } else if LEVEL_DIMS.contains(&dim.as_str()) {
                if layout.level.is_some() {
                    return Err(Error::schema(format!(
                        "layout ({}) has more than one vertical dimension",
                        dims.join(", ")
                    )));
                }
                layout.level = Some(axis);
                DimRole::Level
            } else if dim == column_dim {
                layout.column = Some(axis);
                DimRole::Column
            } else if allow_region && layout.region.is_none() && !dims.iter().any(|d| d == column_dim) {
                layout.region = Some(axis);
                DimRole::Region
            } else {
                return Err(Error::schema(format!(
                    "unrecognized dimension '{}' in layout ({})",
                    dim,
                    dims.join(", ")
                )));
            };
            layout.roles.push(role);
        }

        Ok(layout)
    }

    pub fn rank(&self) -> usize {
        self.roles.len()
    }
}
