//! Output stores.
//!
//! Everything is written into a hidden staging directory next to the target
//! and moved into place by [`StoreWriter::finish`]. A run that fails before
//! that leaves the target untouched.

use crate::error::Error;
use crate::field::Field;
use crate::metadata::*;
use crate::store::ZarrStore;
use anyhow::{Context, Result, bail};
use byteorder::{LittleEndian, WriteBytesExt};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

/// Values of an output array
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    F64(Vec<f64>),
    I32(Vec<i32>),
}

impl ArrayData {
    pub fn len(&self) -> usize {
        match self {
            ArrayData::F64(v) => v.len(),
            ArrayData::I32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn data_type(&self) -> DataType {
        match self {
            ArrayData::F64(_) => DataType::F64,
            ArrayData::I32(_) => DataType::I32,
        }
    }

    fn fill_value(&self) -> Option<serde_json::Value> {
        match self {
            ArrayData::F64(_) => Some(serde_json::Value::String("NaN".to_string())),
            ArrayData::I32(_) => None,
        }
    }

    fn to_le_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.len() * self.data_type().size);
        match self {
            ArrayData::F64(values) => {
                for &v in values {
                    buf.write_f64::<LittleEndian>(v)?;
                }
            }
            ArrayData::I32(values) => {
                for &v in values {
                    buf.write_i32::<LittleEndian>(v)?;
                }
            }
        }
        Ok(buf)
    }
}

/// Refuse output locations that must not be replaced.
///
/// Existing regular files and non-store directories are always refused; an
/// existing store only with `overwrite`.
pub fn check_output_path(path: &Path, overwrite: bool) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }
    if path.is_file() {
        return Err(Error::usage(format!(
            "output path '{}' is an existing file; outputs are Zarr directory stores",
            path.display()
        ))
        .into());
    }
    if !ZarrStore::is_store(path) {
        return Err(Error::usage(format!(
            "output path '{}' is a directory that is not a Zarr store; refusing to replace it",
            path.display()
        ))
        .into());
    }
    if !overwrite {
        return Err(Error::usage(format!(
            "output '{}' already exists; pass the overwrite flag to replace it",
            path.display()
        ))
        .into());
    }
    Ok(())
}

pub struct StoreWriter {
    target: PathBuf,
    overwrite: bool,
    staging: TempDir,
    global_attributes: Attributes,
    consolidated: BTreeMap<String, serde_json::Value>,
}

impl StoreWriter {
    /// Validate `target` and open a staging directory beside it
    pub fn create<P: AsRef<Path>>(target: P, overwrite: bool) -> Result<Self> {
        let target = target.as_ref().to_path_buf();
        check_output_path(&target, overwrite)?;

        let parent = match target.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        if !parent.is_dir() {
            return Err(Error::usage(format!(
                "output directory '{}' does not exist",
                parent.display()
            ))
            .into());
        }

        let staging = tempfile::Builder::new()
            .prefix(".cldera-staging-")
            .tempdir_in(&parent)
            .with_context(|| format!("Failed to create staging directory in '{}'", parent.display()))?;
        debug!("staging {} in {}", target.display(), staging.path().display());

        Ok(Self {
            target,
            overwrite,
            staging,
            global_attributes: Attributes::new(),
            consolidated: BTreeMap::new(),
        })
    }

    pub fn set_global_attribute(&mut self, key: &str, value: impl Into<AttributeValue>) {
        self.global_attributes.insert(key.to_string(), value.into());
    }

    /// Write a field as an f8 array
    pub fn write_field(&mut self, field: &Field, attributes: Attributes) -> Result<()> {
        self.write_array(
            field.name(),
            field.dims(),
            field.shape(),
            ArrayData::F64(field.data().to_vec()),
            attributes,
        )
    }

    pub fn write_array(
        &mut self,
        name: &str,
        dims: &[String],
        shape: &[usize],
        data: ArrayData,
        mut attributes: Attributes,
    ) -> Result<()> {
        if name.is_empty() || name.starts_with('.') || name.contains('/') {
            bail!("Invalid array name '{}'", name);
        }
        if dims.len() != shape.len() {
            bail!(
                "Array '{}' has {} dimension names for shape {:?}",
                name,
                dims.len(),
                shape
            );
        }
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            bail!(
                "Array '{}' has shape {:?} but {} values",
                name,
                shape,
                data.len()
            );
        }
        let key = format!("{}/.zarray", name);
        if self.consolidated.contains_key(&key) {
            bail!("Array '{}' was written twice", name);
        }

        let zarray = ZArrayMetadata {
            zarr_format: 2,
            shape: shape.iter().map(|&s| s as u64).collect(),
            // Zero-length dimensions still need a positive chunk length.
            chunks: shape.iter().map(|&s| s.max(1) as u64).collect(),
            dtype: data.data_type().zarr_name(),
            compressor: None,
            fill_value: data.fill_value(),
            order: "C".to_string(),
            filters: None,
            dimension_separator: None,
        };
        attributes.insert(
            ARRAY_DIMENSIONS.to_string(),
            AttributeValue::Array(dims.iter().map(|d| d.as_str().into()).collect()),
        );

        let dir = self.staging.path().join(name);
        fs::create_dir(&dir)
            .with_context(|| format!("Failed to create array directory {}", dir.display()))?;
        write_json(&dir.join(".zarray"), &zarray)?;
        write_json(&dir.join(".zattrs"), &attributes)?;

        if !data.is_empty() {
            let chunk_key = if shape.is_empty() {
                "0".to_string()
            } else {
                vec!["0"; shape.len()].join(".")
            };
            fs::write(dir.join(&chunk_key), data.to_le_bytes()?)
                .with_context(|| format!("Failed to write chunk of '{}'", name))?;
        }

        self.consolidated.insert(key, serde_json::to_value(&zarray)?);
        self.consolidated
            .insert(format!("{}/.zattrs", name), serde_json::to_value(&attributes)?);
        debug!("wrote array '{}' {:?}", name, shape);
        Ok(())
    }

    /// Write group metadata and move the store into place
    pub fn finish(mut self) -> Result<PathBuf> {
        let zgroup = ZGroupMetadata { zarr_format: 2 };

        let staged = self.staging.path();
        write_json(&staged.join(".zgroup"), &zgroup)?;
        write_json(&staged.join(".zattrs"), &self.global_attributes)?;

        self.consolidated
            .insert(".zgroup".to_string(), serde_json::to_value(&zgroup)?);
        self.consolidated.insert(
            ".zattrs".to_string(),
            serde_json::to_value(&self.global_attributes)?,
        );
        let consolidated = ConsolidatedMetadata {
            zarr_consolidated_format: 1,
            metadata: std::mem::take(&mut self.consolidated),
        };
        write_json(&staged.join(".zmetadata"), &consolidated)?;

        if self.target.exists() {
            // Re-checked: the target may have appeared while we were computing.
            check_output_path(&self.target, self.overwrite)?;
            fs::remove_dir_all(&self.target).with_context(|| {
                format!("Failed to remove existing store {}", self.target.display())
            })?;
        }
        // From here on the staged directory is ours to move or clean up.
        let root = self.staging.keep();
        if let Err(e) = fs::rename(&root, &self.target) {
            let _ = fs::remove_dir_all(&root);
            return Err(e).with_context(|| {
                format!(
                    "Failed to move {} into place at {}",
                    root.display(),
                    self.target.display()
                )
            });
        }

        Ok(self.target)
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))
}
