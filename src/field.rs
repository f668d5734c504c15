use crate::error::{Error, Result};

/// A named, dense, C-ordered array of values with named dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    name: String,
    dims: Vec<String>,
    shape: Vec<usize>,
    data: Vec<f64>,
}

impl Field {
    pub fn new(
        name: impl Into<String>,
        dims: Vec<String>,
        shape: Vec<usize>,
        data: Vec<f64>,
    ) -> Result<Self> {
        let name = name.into();
        if dims.len() != shape.len() {
            return Err(Error::schema(format!(
                "field '{}' has {} dimension names for a rank-{} shape",
                name,
                dims.len(),
                shape.len()
            )));
        }
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(Error::schema(format!(
                "field '{}' has shape {:?} ({} values) but {} values were given",
                name,
                shape,
                expected,
                data.len()
            )));
        }
        Ok(Self {
            name,
            dims,
            shape,
            data,
        })
    }

    /// Convenience constructor for tests and small literals.
    pub fn from_dims(name: &str, dims: &[(&str, usize)], data: Vec<f64>) -> Result<Self> {
        Self::new(
            name,
            dims.iter().map(|(d, _)| d.to_string()).collect(),
            dims.iter().map(|(_, n)| *n).collect(),
            data,
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dims(&self) -> &[String] {
        &self.dims
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Values in place; the shape cannot change through this.
    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// A field of the same name and layout holding `value` everywhere.
    pub fn filled_like(&self, value: f64) -> Field {
        Field {
            name: self.name.clone(),
            dims: self.dims.clone(),
            shape: self.shape.clone(),
            data: vec![value; self.data.len()],
        }
    }

    pub fn into_data(self) -> Vec<f64> {
        self.data
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Fix `axis` at `index`, dropping that dimension.
    pub fn take(&self, axis: usize, index: usize) -> Result<Field> {
        let len = *self.shape.get(axis).ok_or_else(|| {
            Error::schema(format!("field '{}' has no axis {}", self.name, axis))
        })?;
        if index >= len {
            return Err(Error::usage(format!(
                "index {} is out of bounds for dimension '{}' of '{}' (length {})",
                index, self.dims[axis], self.name, len
            )));
        }

        let outer: usize = self.shape[..axis].iter().product();
        let inner: usize = self.shape[axis + 1..].iter().product();
        let mut data = Vec::with_capacity(outer * inner);
        for o in 0..outer {
            let start = (o * len + index) * inner;
            data.extend_from_slice(&self.data[start..start + inner]);
        }

        let mut dims = self.dims.clone();
        let mut shape = self.shape.clone();
        dims.remove(axis);
        shape.remove(axis);
        Field::new(self.name.clone(), dims, shape, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_must_match_data() {
        assert!(Field::from_dims("x", &[("ncol", 3)], vec![1.0, 2.0]).is_err());
        assert!(Field::new("x", vec!["ncol".into()], vec![2, 1], vec![1.0, 2.0]).is_err());
    }

    #[test]
    fn test_take_middle_axis() {
        // (time=2, lev=3, ncol=2)
        let data: Vec<f64> = (0..12).map(|v| v as f64).collect();
        let f = Field::from_dims("T", &[("time", 2), ("lev", 3), ("ncol", 2)], data).unwrap();
        let sliced = f.take(1, 2).unwrap();
        assert_eq!(sliced.dims(), &["time".to_string(), "ncol".to_string()]);
        assert_eq!(sliced.shape(), &[2, 2]);
        assert_eq!(sliced.data(), &[4.0, 5.0, 10.0, 11.0]);
        assert!(f.take(1, 3).is_err());
    }
}
