use crate::metadata::*;
use anyhow::{Context, Result, anyhow, bail};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Read access to a Zarr v2 directory store
pub struct ZarrStore {
    path: PathBuf,
}

impl ZarrStore {
    /// Create a new ZarrStore from a directory path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if !path.exists() {
            bail!("Path does not exist: {}", path.display());
        }

        if !path.is_dir() {
            bail!(
                "Path is not a directory: {}. Datasets are read from Zarr directory stores.",
                path.display()
            );
        }

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether `path` looks like a Zarr store (has group or consolidated metadata)
    pub fn is_store(path: &Path) -> bool {
        path.join(".zgroup").is_file() || path.join(".zmetadata").is_file()
    }

    /// Load metadata from the Zarr store, attempting consolidated read first
    pub async fn load_metadata(&self) -> Result<StoreMetadata> {
        let mut metadata = match self.load_consolidated_metadata().await {
            Ok(metadata) => {
                debug!("loaded consolidated metadata from {}", self.path.display());
                metadata
            }
            Err(e) => {
                debug!("consolidated metadata unavailable ({:#}); scanning hierarchy", e);
                self.load_hierarchical_metadata().await?
            }
        };

        metadata.infer_dimensions();
        Ok(metadata)
    }

    /// Attempt to load consolidated metadata from .zmetadata file
    async fn load_consolidated_metadata(&self) -> Result<StoreMetadata> {
        let zmetadata_path = self.path.join(".zmetadata");

        let data = fs::read(&zmetadata_path).with_context(|| {
            format!(
                "No consolidated metadata found at '{}'",
                zmetadata_path.display()
            )
        })?;

        let consolidated: ConsolidatedMetadata =
            serde_json::from_slice(&data).with_context(|| {
                format!(
                    "Invalid consolidated metadata JSON format at '{}'",
                    zmetadata_path.display()
                )
            })?;

        Self::parse_consolidated_metadata(consolidated)
            .with_context(|| "Failed to process consolidated metadata entries")
    }

    /// Parse consolidated metadata into a StoreMetadata structure
    fn parse_consolidated_metadata(consolidated: ConsolidatedMetadata) -> Result<StoreMetadata> {
        let mut metadata = StoreMetadata::new();
        let entries = &consolidated.metadata;

        for (key, value) in entries {
            if key == ".zattrs" {
                metadata.global_attributes = serde_json::from_value(value.clone())
                    .context("Failed to parse root .zattrs")?;
            } else if let Some(path) = key.strip_suffix("/.zarray") {
                let zarray: ZArrayMetadata = serde_json::from_value(value.clone())
                    .with_context(|| format!("Failed to parse .zarray for {}", path))?;

                let attributes = match entries.get(&format!("{}/.zattrs", path)) {
                    Some(v) => serde_json::from_value(v.clone())
                        .with_context(|| format!("Failed to parse .zattrs for {}", path))?,
                    None => Attributes::new(),
                };

                metadata.insert_variable(Variable::new(path, zarray, attributes));
            }
        }

        Ok(metadata)
    }

    /// Load metadata using hierarchical scanning of .zarray/.zattrs files
    async fn load_hierarchical_metadata(&self) -> Result<StoreMetadata> {
        let mut metadata = StoreMetadata::new();

        let mut array_paths = Vec::new();
        Self::scan_directory(&mut array_paths, "", &self.path)?;

        for path in array_paths {
            let variable = self.load_array_metadata(&path).await?;
            metadata.insert_variable(variable);
        }

        metadata.global_attributes = Self::read_attributes(&self.path.join(".zattrs"))?;

        if metadata.variables.is_empty() && !self.path.join(".zgroup").is_file() {
            bail!(
                "No Zarr arrays or groups found in '{}'. The directory must contain .zarray, .zgroup, or .zmetadata files to be a valid Zarr store.",
                self.path.display()
            );
        }

        Ok(metadata)
    }

    /// Recursively collect the paths of all arrays below `fs_path`
    fn scan_directory(arrays: &mut Vec<String>, current_path: &str, fs_path: &Path) -> Result<()> {
        let entries = fs::read_dir(fs_path)
            .with_context(|| format!("Failed to read directory: {}", fs_path.display()))?;

        let mut children = Vec::new();
        let mut has_zarray = false;

        for entry in entries.flatten() {
            let filename = entry.file_name().to_string_lossy().to_string();
            match filename.as_str() {
                ".zarray" => has_zarray = true,
                name if !name.starts_with('.') && entry.path().is_dir() => {
                    children.push(name.to_string());
                }
                _ => {}
            }
        }

        if has_zarray {
            // Chunk directories (nested separator) live below arrays; stop here.
            arrays.push(current_path.to_string());
            return Ok(());
        }

        children.sort();
        for child in children {
            let child_path = if current_path.is_empty() {
                child.clone()
            } else {
                format!("{}/{}", current_path, child)
            };
            Self::scan_directory(arrays, &child_path, &fs_path.join(&child))?;
        }

        Ok(())
    }

    /// Load array metadata from .zarray and .zattrs files
    async fn load_array_metadata(&self, path: &str) -> Result<Variable> {
        let array_dir = self.path.join(path);
        let zarray_path = array_dir.join(".zarray");

        let array_data = fs::read(&zarray_path).with_context(|| {
            format!(
                "Missing .zarray file for variable '{}' at '{}'",
                path,
                zarray_path.display()
            )
        })?;

        let zarray: ZArrayMetadata = serde_json::from_slice(&array_data).with_context(|| {
            format!(
                "Invalid .zarray JSON format for variable '{}' at '{}'",
                path,
                zarray_path.display()
            )
        })?;

        let attributes = Self::read_attributes(&array_dir.join(".zattrs"))?;
        Ok(Variable::new(path, zarray, attributes))
    }

    /// Read an optional .zattrs file
    fn read_attributes(path: &Path) -> Result<Attributes> {
        match fs::read(path) {
            Ok(data) => serde_json::from_slice(&data)
                .with_context(|| format!("Invalid attributes JSON at '{}'", path.display())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Attributes::new()),
            Err(e) => Err(e).with_context(|| format!("Failed to read '{}'", path.display())),
        }
    }

    /// Read the whole array as f64 values in C order
    pub fn read_array(&self, variable: &Variable) -> Result<Vec<f64>> {
        if variable.array.order != "C" {
            bail!(
                "Variable '{}' uses '{}' memory order; only C order is supported",
                variable.name,
                variable.array.order
            );
        }

        if variable.is_compressed() {
            debug!(
                "reading '{}' through zarrs (compressor {:?})",
                variable.path,
                variable.compressor_id()
            );
            return self.read_with_zarrs(variable).with_context(|| {
                format!(
                    "Variable '{}' uses compression ('{}') which could not be decoded",
                    variable.name,
                    variable.compressor_id().unwrap_or("filters")
                )
            });
        }

        debug!("reading '{}' from raw chunks", variable.path);
        self.read_uncompressed(variable)
    }

    /// Read array data using the zarrs crate with proper compression support
    fn read_with_zarrs(&self, variable: &Variable) -> Result<Vec<f64>> {
        use zarrs::array::Array;
        use zarrs::array_subset::ArraySubset;
        use zarrs::storage::store::FilesystemStore;

        let store = FilesystemStore::new(&self.path)
            .map_err(|e| anyhow!("Failed to create zarrs FilesystemStore: {}", e))?;

        let array_path = format!("/{}", variable.path);
        let array = Array::open(std::sync::Arc::new(store), &array_path)
            .map_err(|e| anyhow!("Failed to open array '{}': {}", array_path, e))?;

        let array_subset = ArraySubset::new_with_shape(array.shape().to_vec());
        let array_bytes = array
            .retrieve_array_subset(&array_subset)
            .map_err(|e| anyhow!("Failed to read array data: {}", e))?;

        let bytes: &[u8] = match &array_bytes {
            zarrs::array::ArrayBytes::Variable(data, _offsets) => data.as_ref(),
            zarrs::array::ArrayBytes::Fixed(data) => data.as_ref(),
        };

        // zarrs hands back elements in native byte order.
        let mut dtype = variable.data_type()?;
        dtype.endianness = if cfg!(target_endian = "big") {
            Endianness::Big
        } else {
            Endianness::Little
        };
        dtype.decode(bytes)
    }

    /// Assemble an uncompressed array from its chunk files
    ///
    /// Missing chunks take the fill value; edge chunks are stored padded to
    /// the full chunk shape.
    fn read_uncompressed(&self, variable: &Variable) -> Result<Vec<f64>> {
        let dtype = variable.data_type()?;
        let shape = variable.shape();
        let chunks: Vec<usize> = variable.array.chunks.iter().map(|&c| c as usize).collect();
        if chunks.len() != shape.len() || chunks.iter().any(|&c| c == 0) {
            bail!(
                "Variable '{}' has chunks {:?} incompatible with shape {:?}",
                variable.name,
                chunks,
                shape
            );
        }

        let mut data = vec![variable.fill_value(); variable.len()];
        if data.is_empty() {
            return Ok(data);
        }

        let separator = variable.array.dimension_separator.as_deref().unwrap_or(".");
        let grid: Vec<usize> = shape.iter().zip(&chunks).map(|(s, c)| s.div_ceil(*c)).collect();
        let chunk_len: usize = chunks.iter().product();
        let array_dir = self.path.join(&variable.path);

        for chunk_index in MultiIndex::new(&grid) {
            let key = if chunk_index.is_empty() {
                "0".to_string()
            } else {
                chunk_index
                    .iter()
                    .map(|i| i.to_string())
                    .collect::<Vec<_>>()
                    .join(separator)
            };
            let chunk_path = array_dir.join(&key);

            let bytes = match fs::read(&chunk_path) {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("Failed to read chunk file: {}", chunk_path.display())
                    });
                }
            };

            let values = dtype
                .decode(&bytes)
                .with_context(|| format!("Corrupt chunk file: {}", chunk_path.display()))?;
            if values.len() < chunk_len {
                bail!(
                    "Chunk file {} holds {} values, expected {}",
                    chunk_path.display(),
                    values.len(),
                    chunk_len
                );
            }

            for local in MultiIndex::new(&chunks) {
                let mut offset = 0;
                let mut inside = true;
                for (d, &l) in local.iter().enumerate() {
                    let g = chunk_index[d] * chunks[d] + l;
                    if g >= shape[d] {
                        inside = false;
                        break;
                    }
                    offset = offset * shape[d] + g;
                }
                if inside {
                    data[offset] = values[flat_index(&local, &chunks)];
                }
            }
        }

        Ok(data)
    }
}

fn flat_index(index: &[usize], shape: &[usize]) -> usize {
    index.iter().zip(shape).fold(0, |acc, (i, s)| acc * s + i)
}

/// Row-major iteration over every index of a shape
struct MultiIndex {
    shape: Vec<usize>,
    next: Option<Vec<usize>>,
}

impl MultiIndex {
    fn new(shape: &[usize]) -> Self {
        let next = if shape.contains(&0) {
            None
        } else {
            Some(vec![0; shape.len()])
        };
        Self {
            shape: shape.to_vec(),
            next,
        }
    }
}

impl Iterator for MultiIndex {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        let current = self.next.take()?;
        let mut advanced = current.clone();
        for d in (0..self.shape.len()).rev() {
            advanced[d] += 1;
            if advanced[d] < self.shape[d] {
                self.next = Some(advanced);
                break;
            }
            advanced[d] = 0;
        }
        Some(current)
    }
}
