use anyhow::{Result, anyhow, bail};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A JSON attribute value of a Zarr group or array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Boolean(bool),
    Integer(i64),
    Number(f64),
    String(String),
    Array(Vec<AttributeValue>),
    Object(BTreeMap<String, AttributeValue>),
    Null,
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Integer(i) => Some(*i as f64),
            AttributeValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::String(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::String(s)
    }
}

impl From<i64> for AttributeValue {
    fn from(i: i64) -> Self {
        AttributeValue::Integer(i)
    }
}

impl From<f64> for AttributeValue {
    fn from(n: f64) -> Self {
        AttributeValue::Number(n)
    }
}

pub type Attributes = BTreeMap<String, AttributeValue>;

/// Attribute holding the dimension names of an array (xarray convention)
pub const ARRAY_DIMENSIONS: &str = "_ARRAY_DIMENSIONS";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Little,
    Big,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Float,
    Int,
    UInt,
}

/// A parsed Zarr v2 numeric dtype such as `<f8` or `|u1`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataType {
    pub kind: ScalarKind,
    pub size: usize,
    pub endianness: Endianness,
}

impl DataType {
    pub const F64: DataType = DataType {
        kind: ScalarKind::Float,
        size: 8,
        endianness: Endianness::Little,
    };
    pub const I32: DataType = DataType {
        kind: ScalarKind::Int,
        size: 4,
        endianness: Endianness::Little,
    };

    pub fn parse(dtype: &str) -> Result<Self> {
        let mut chars = dtype.chars();
        let endianness = match chars.next() {
            Some('<') | Some('|') => Endianness::Little,
            Some('>') => Endianness::Big,
            _ => bail!("Unsupported dtype '{}': missing byte order prefix", dtype),
        };
        let kind = match chars.next() {
            Some('f') => ScalarKind::Float,
            Some('i') => ScalarKind::Int,
            Some('u') => ScalarKind::UInt,
            _ => bail!("Unsupported dtype '{}': only numeric arrays can be read", dtype),
        };
        let size: usize = chars
            .as_str()
            .parse()
            .map_err(|_| anyhow!("Unsupported dtype '{}': bad item size", dtype))?;

        let valid = match kind {
            ScalarKind::Float => matches!(size, 4 | 8),
            ScalarKind::Int | ScalarKind::UInt => matches!(size, 1 | 2 | 4 | 8),
        };
        if !valid {
            bail!("Unsupported dtype '{}'", dtype);
        }
        Ok(Self {
            kind,
            size,
            endianness,
        })
    }

    /// The dtype string as written in `.zarray`
    pub fn zarr_name(&self) -> String {
        let order = match (self.size, self.endianness) {
            (1, _) => '|',
            (_, Endianness::Little) => '<',
            (_, Endianness::Big) => '>',
        };
        let kind = match self.kind {
            ScalarKind::Float => 'f',
            ScalarKind::Int => 'i',
            ScalarKind::UInt => 'u',
        };
        format!("{}{}{}", order, kind, self.size)
    }

    /// Decode a raw buffer of whole elements into f64 values
    pub fn decode(&self, bytes: &[u8]) -> Result<Vec<f64>> {
        if bytes.len() % self.size != 0 {
            bail!(
                "Buffer of {} bytes is not a whole number of {} elements",
                bytes.len(),
                self.zarr_name()
            );
        }
        Ok(match self.endianness {
            Endianness::Little => self.decode_with::<LittleEndian>(bytes),
            Endianness::Big => self.decode_with::<BigEndian>(bytes),
        })
    }

    fn decode_with<B: ByteOrder>(&self, bytes: &[u8]) -> Vec<f64> {
        bytes
            .chunks_exact(self.size)
            .map(|b| match (self.kind, self.size) {
                (ScalarKind::Float, 8) => B::read_f64(b),
                (ScalarKind::Float, _) => B::read_f32(b) as f64,
                (ScalarKind::Int, 1) => b[0] as i8 as f64,
                (ScalarKind::Int, 2) => B::read_i16(b) as f64,
                (ScalarKind::Int, 4) => B::read_i32(b) as f64,
                (ScalarKind::Int, _) => B::read_i64(b) as f64,
                (ScalarKind::UInt, 1) => b[0] as f64,
                (ScalarKind::UInt, 2) => B::read_u16(b) as f64,
                (ScalarKind::UInt, 4) => B::read_u32(b) as f64,
                (ScalarKind::UInt, _) => B::read_u64(b) as f64,
            })
            .collect()
    }
}

/// Raw Zarr array metadata from .zarray file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZArrayMetadata {
    pub zarr_format: u8,
    pub shape: Vec<u64>,
    pub chunks: Vec<u64>,
    pub dtype: String,
    pub compressor: Option<serde_json::Value>,
    pub fill_value: Option<serde_json::Value>,
    pub order: String,
    pub filters: Option<Vec<serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension_separator: Option<String>,
}

/// Raw Zarr group metadata from .zgroup file
#[derive(Debug, Serialize, Deserialize)]
pub struct ZGroupMetadata {
    pub zarr_format: u8,
}

/// Consolidated metadata from .zmetadata file
#[derive(Debug, Serialize, Deserialize)]
pub struct ConsolidatedMetadata {
    pub zarr_consolidated_format: u8,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// An array of the store together with its attributes
#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub path: String,
    pub array: ZArrayMetadata,
    pub attributes: Attributes,
    pub dims: Vec<String>,
}

impl Variable {
    pub fn new(path: &str, array: ZArrayMetadata, attributes: Attributes) -> Self {
        let name = path.split('/').next_back().unwrap_or(path).to_string();
        let dims = extract_dimension_names(&attributes, array.shape.len());
        Self {
            name,
            path: path.to_string(),
            array,
            attributes,
            dims,
        }
    }

    pub fn shape(&self) -> Vec<usize> {
        self.array.shape.iter().map(|&s| s as usize).collect()
    }

    pub fn len(&self) -> usize {
        self.array.shape.iter().product::<u64>() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn data_type(&self) -> Result<DataType> {
        DataType::parse(&self.array.dtype)
    }

    pub fn is_compressed(&self) -> bool {
        self.array.compressor.is_some()
            || self.array.filters.as_ref().is_some_and(|f| !f.is_empty())
    }

    pub fn compressor_id(&self) -> Option<&str> {
        self.array
            .compressor
            .as_ref()
            .and_then(|c| c.get("id"))
            .and_then(|id| id.as_str())
    }

    /// Fill value as f64; `null` maps to NaN
    pub fn fill_value(&self) -> f64 {
        match &self.array.fill_value {
            Some(serde_json::Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
            Some(serde_json::Value::String(s)) => match s.as_str() {
                "Infinity" => f64::INFINITY,
                "-Infinity" => f64::NEG_INFINITY,
                _ => f64::NAN,
            },
            _ => f64::NAN,
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }
}

/// Extract dimension names from _ARRAY_DIMENSIONS attribute or generate defaults
pub fn extract_dimension_names(attributes: &Attributes, rank: usize) -> Vec<String> {
    if let Some(AttributeValue::Array(dims)) = attributes.get(ARRAY_DIMENSIONS) {
        let names: Vec<String> = dims
            .iter()
            .filter_map(|val| val.as_str().map(str::to_string))
            .collect();
        if names.len() == rank {
            return names;
        }
    }
    (0..rank).map(|i| format!("dim_{}", i)).collect()
}

/// Length of a named dimension across the store
#[derive(Debug, Clone)]
pub struct DimensionInfo {
    pub name: String,
    pub length: usize,
    /// Some variable disagrees about the length
    pub conflicting: bool,
    pub appearances: Vec<(String, usize)>,
}

/// Root metadata of a flat, xarray-style Zarr store
#[derive(Debug, Default)]
pub struct StoreMetadata {
    pub global_attributes: Attributes,
    pub variables: BTreeMap<String, Variable>,
    pub dimensions: BTreeMap<String, DimensionInfo>,
}

impl StoreMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_variable(&mut self, variable: Variable) {
        self.variables.insert(variable.path.clone(), variable);
    }

    /// Collect dimension lengths from all variables
    pub fn infer_dimensions(&mut self) {
        let mut dimensions: BTreeMap<String, DimensionInfo> = BTreeMap::new();

        for (path, variable) in &self.variables {
            for (dim, size) in variable.dims.iter().zip(variable.shape()) {
                let info = dimensions.entry(dim.clone()).or_insert_with(|| DimensionInfo {
                    name: dim.clone(),
                    length: size,
                    conflicting: false,
                    appearances: Vec::new(),
                });
                if info.length != size {
                    info.conflicting = true;
                    info.length = info.length.max(size);
                }
                info.appearances.push((path.clone(), size));
            }
        }

        self.dimensions = dimensions;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn array(shape: Vec<u64>, dtype: &str) -> ZArrayMetadata {
        ZArrayMetadata {
            zarr_format: 2,
            chunks: shape.clone(),
            shape,
            dtype: dtype.to_string(),
            compressor: None,
            fill_value: None,
            order: "C".to_string(),
            filters: None,
            dimension_separator: None,
        }
    }

    fn dims_attr(names: &[&str]) -> Attributes {
        let mut attrs = Attributes::new();
        attrs.insert(
            ARRAY_DIMENSIONS.to_string(),
            AttributeValue::Array(names.iter().map(|&n| n.into()).collect()),
        );
        attrs
    }

    #[test]
    fn test_dtype_parsing() {
        assert_eq!(DataType::parse("<f8").unwrap(), DataType::F64);
        assert_eq!(DataType::parse("<i4").unwrap(), DataType::I32);
        let be = DataType::parse(">i2").unwrap();
        assert_eq!(be.endianness, Endianness::Big);
        assert_eq!(be.zarr_name(), ">i2");
        assert_eq!(DataType::parse("|u1").unwrap().zarr_name(), "|u1");
        assert!(DataType::parse("<U8").is_err());
        assert!(DataType::parse("<f2").is_err());
        assert!(DataType::parse("f8").is_err());
    }

    #[test]
    fn test_decode_byte_orders() {
        let mut le = Vec::new();
        le.extend_from_slice(&1.5f64.to_le_bytes());
        le.extend_from_slice(&(-2.0f64).to_le_bytes());
        assert_eq!(DataType::F64.decode(&le).unwrap(), vec![1.5, -2.0]);

        let be = (-7i32).to_be_bytes();
        assert_eq!(DataType::parse(">i4").unwrap().decode(&be).unwrap(), vec![-7.0]);

        assert_eq!(DataType::parse("|i1").unwrap().decode(&[0xff]).unwrap(), vec![-1.0]);
        assert!(DataType::F64.decode(&[0u8; 5]).is_err());
    }

    #[test]
    fn test_extract_dimension_names() {
        let names = extract_dimension_names(&dims_attr(&["time", "lev", "ncol"]), 3);
        assert_eq!(names, vec!["time", "lev", "ncol"]);
        let defaults = extract_dimension_names(&Attributes::new(), 2);
        assert_eq!(defaults, vec!["dim_0", "dim_1"]);
        // A mismatched attribute is ignored rather than misassigned.
        let short = extract_dimension_names(&dims_attr(&["ncol"]), 2);
        assert_eq!(short, vec!["dim_0", "dim_1"]);
    }

    #[test]
    fn test_fill_value_forms() {
        let mut v = Variable::new("x", array(vec![1], "<f8"), Attributes::new());
        assert!(v.fill_value().is_nan());
        v.array.fill_value = Some(serde_json::json!("NaN"));
        assert!(v.fill_value().is_nan());
        v.array.fill_value = Some(serde_json::json!(-999.0));
        assert_eq!(v.fill_value(), -999.0);
        v.array.fill_value = Some(serde_json::json!("-Infinity"));
        assert_eq!(v.fill_value(), f64::NEG_INFINITY);
    }

    #[test]
    fn test_infer_dimensions_flags_conflicts() {
        let mut metadata = StoreMetadata::new();
        metadata.insert_variable(Variable::new(
            "lat",
            array(vec![4], "<f8"),
            dims_attr(&["ncol"]),
        ));
        metadata.insert_variable(Variable::new(
            "T",
            array(vec![2, 4], "<f8"),
            dims_attr(&["time", "ncol"]),
        ));
        metadata.insert_variable(Variable::new(
            "bad",
            array(vec![5], "<f8"),
            dims_attr(&["ncol"]),
        ));
        metadata.infer_dimensions();

        let ncol = &metadata.dimensions["ncol"];
        assert!(ncol.conflicting);
        assert_eq!(ncol.appearances.len(), 3);
        let time = &metadata.dimensions["time"];
        assert_eq!(time.length, 2);
        assert!(!time.conflicting);
    }

    #[test]
    fn test_attribute_values_roundtrip_json() {
        let attrs: Attributes = serde_json::from_str(
            r#"{"units": "degrees_north", "count": 3, "scale": 0.5, "flag": true, "none": null}"#,
        )
        .unwrap();
        assert_eq!(attrs["units"].as_str(), Some("degrees_north"));
        assert_eq!(attrs["count"], AttributeValue::Integer(3));
        assert_eq!(attrs["scale"].as_f64(), Some(0.5));
        assert_eq!(attrs["flag"], AttributeValue::Boolean(true));
        assert_eq!(attrs["none"], AttributeValue::Null);
    }

    #[test]
    fn test_zarray_parsing() {
        let json_data = r#"{
            "zarr_format": 2,
            "shape": [100, 200],
            "chunks": [10, 20],
            "dtype": "<f8",
            "compressor": {"id": "zstd", "level": 3},
            "fill_value": "NaN",
            "order": "C",
            "filters": null,
            "dimension_separator": "/"
        }"#;
        let zarray: ZArrayMetadata = serde_json::from_str(json_data).unwrap();
        let v = Variable::new("grp/T", zarray, Attributes::new());
        assert_eq!(v.name, "T");
        assert_eq!(v.len(), 20000);
        assert!(v.is_compressed());
        assert_eq!(v.compressor_id(), Some("zstd"));
        assert_eq!(v.array.dimension_separator.as_deref(), Some("/"));
    }
}
