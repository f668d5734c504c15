use crate::coords::Coordinate;
use crate::error::Error;
use crate::field::Field;
use crate::layout::{FieldLayout, MAX_RESULT_RANK};
use crate::mask::{RegionMask, expand_region_values};
use anyhow::{Result, bail};

/// Which part of a field to show.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlotSelection {
    /// Single time index; every time step when `None`.
    pub time: Option<usize>,
    /// Vertical level; required when the field has one.
    pub level: Option<usize>,
}

/// Slice `field` into per-column frames, one per selected time step.
///
/// A field already reduced to regions is expanded back onto the columns of
/// `mask`, which is then required.
pub fn column_frames(
    field: &Field,
    column_dim: &str,
    mask: Option<&RegionMask>,
    selection: PlotSelection,
) -> Result<Vec<Vec<f64>>> {
    let name = field.name().to_string();
    let layout = FieldLayout::resolve_reduced(field.dims(), column_dim)?;
    if layout.rank() > MAX_RESULT_RANK {
        return Err(Error::schema(format!(
            "unsupported layout ({}) for '{}'",
            field.dims().join(", "),
            field.name()
        ))
        .into());
    }

    let mut field = field.clone();
    if let Some(axis) = layout.level {
        let Some(level) = selection.level else {
            return Err(Error::usage(format!(
                "'{}' has a vertical dimension ({}); select a level",
                field.name(),
                field.dims().join(", ")
            ))
            .into());
        };
        field = field.take(axis, level)?;
    }

    let frames = match (layout.time, selection.time) {
        (None, Some(_)) => {
            return Err(Error::usage(format!(
                "a time index was given for '{}', which has no time dimension",
                name
            ))
            .into());
        }
        (None, None) => vec![field.into_data()],
        (Some(_), Some(t)) => vec![field.take(0, t)?.into_data()],
        (Some(_), None) => (0..field.shape()[0])
            .map(|t| field.take(0, t).map(Field::into_data))
            .collect::<crate::error::Result<_>>()?,
    };

    if layout.column.is_some() {
        return Ok(frames);
    }

    let Some(mask) = mask else {
        return Err(Error::usage(format!(
            "'{}' has no '{}' dimension; it is a regional result and needs its mask",
            name, column_dim
        ))
        .into());
    };
    frames
        .iter()
        .map(|f| Ok(expand_region_values(mask, f)?))
        .collect()
}

/// An equirectangular lat/lon image; row 0 is the northern edge.
#[derive(Debug, Clone)]
pub struct Raster {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f64>,
}

impl Raster {
    /// Bin column values into a `width` x `width / 2` grid.
    ///
    /// Pixels hit by several columns take their mean. Pixels hit by none are
    /// filled from painted neighbours, wrapping in longitude.
    pub fn from_columns(coords: &[Coordinate], values: &[f64], width: usize) -> Result<Self> {
        if width < 2 {
            bail!("Raster width must be at least 2 (got {}).", width);
        }
        if coords.len() != values.len() {
            return Err(Error::schema(format!(
                "{} coordinates but {} values to plot",
                coords.len(),
                values.len()
            ))
            .into());
        }
        let height = width / 2;

        let mut sum = vec![0.0; width * height];
        let mut hits = vec![0usize; width * height];
        let mut painted = vec![false; width * height];
        for (c, &v) in coords.iter().zip(values) {
            let (x, y) = pixel(*c, width, height);
            let i = y * width + x;
            painted[i] = true;
            if v.is_finite() {
                sum[i] += v;
                hits[i] += 1;
            }
        }

        let mut data: Vec<f64> = sum
            .iter()
            .zip(&hits)
            .map(|(s, &n)| if n > 0 { s / n as f64 } else { f64::NAN })
            .collect();

        if painted.iter().any(|&p| p) {
            fill_holes(&mut data, &mut painted, width, height);
        }

        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// `(x, y)` of the pixel a coordinate falls in.
    pub fn pixel_of(&self, c: Coordinate) -> (usize, usize) {
        pixel(c, self.width, self.height)
    }
}

fn pixel(c: Coordinate, width: usize, height: usize) -> (usize, usize) {
    let x = (((c.lon + 180.0) / 360.0) * width as f64) as usize;
    let y = (((90.0 - c.lat) / 180.0) * height as f64) as usize;
    (x.min(width - 1), y.min(height - 1))
}

fn fill_holes(data: &mut [f64], painted: &mut [bool], width: usize, height: usize) {
    loop {
        let mut updates = Vec::new();
        for y in 0..height {
            for x in 0..width {
                let i = y * width + x;
                if painted[i] {
                    continue;
                }
                let mut neighbours = vec![
                    y * width + (x + 1) % width,
                    y * width + (x + width - 1) % width,
                ];
                if y > 0 {
                    neighbours.push(i - width);
                }
                if y + 1 < height {
                    neighbours.push(i + width);
                }

                let (mut s, mut n, mut any) = (0.0, 0usize, false);
                for j in neighbours {
                    if painted[j] {
                        any = true;
                        if data[j].is_finite() {
                            s += data[j];
                            n += 1;
                        }
                    }
                }
                if any {
                    updates.push((i, if n > 0 { s / n as f64 } else { f64::NAN }));
                }
            }
        }
        if updates.is_empty() {
            break;
        }
        for (i, v) in updates {
            data[i] = v;
            painted[i] = true;
        }
    }
}
