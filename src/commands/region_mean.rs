//! `region-mean`: reduce every per-column variable of a dataset to regions.

use super::masks::copied_attributes;
use super::{parse_f64_pair, parse_index_pair};
use crate::aggregate::{
    LevelRange, LevelReduction, Reduction, RegionReducer, ValidBounds, vertical_contraction,
};
use crate::dataset::{Dataset, LoadedMask};
use crate::error::Error;
use crate::field::Field;
use crate::layout::{LEVEL_DIMS, REGION_DIM};
use crate::metadata::Attributes;
use crate::writer::{ArrayData, StoreWriter};
use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use std::path::PathBuf;
use tracing::debug;

/// Weight variables tried, in order, when `--weight` is not given.
pub const DEFAULT_WEIGHTS: [&str; 2] = ["area", "area_mean"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// Weighted mean
    Mean,
    /// Weighted sum
    Integral,
}

impl From<ModeArg> for Reduction {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Mean => Reduction::Mean,
            ModeArg::Integral => Reduction::Integral,
        }
    }
}

#[derive(Debug, Args)]
pub struct RegionMeanArgs {
    /// Input store with per-column fields
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,

    /// Store holding the mask
    #[arg(short = 'm', long = "mask-file")]
    pub mask_file: PathBuf,

    /// Output store
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,

    /// Name of the mask variable
    #[arg(long, default_value = "mask")]
    pub mask_name: String,

    /// Column weight variable [default: area, else area_mean]
    #[arg(long)]
    pub weight: Option<String>,

    #[arg(long, value_enum, default_value_t = ModeArg::Mean)]
    pub mode: ModeArg,

    /// Ignore values outside [LO, HI], e.g. '0,1e10'
    #[arg(long, value_name = "LO,HI", value_parser = parse_f64_pair)]
    pub valid_bounds: Option<(f64, f64)>,

    /// Contract fields with a level dimension over levels LO..=HI first
    #[arg(long, value_name = "LO,HI", value_parser = parse_index_pair, requires = "level_weight")]
    pub level_bounds: Option<(usize, usize)>,

    /// Level weight variable, e.g. 'pdel'
    #[arg(long, requires = "level_bounds")]
    pub level_weight: Option<String>,

    /// Divide the level contraction by the weight sum
    #[arg(long, requires = "level_bounds")]
    pub level_average: bool,

    /// Variables to leave out
    #[arg(short = 'e', long = "exclude", value_delimiter = ',', num_args = 1..)]
    pub exclude: Vec<String>,

    /// Replace an existing output store
    #[arg(short = 'O', long)]
    pub overwrite: bool,
}

/// Vertical pre-step applied to fields that have a level dimension
struct LevelStep {
    range: LevelRange,
    weight: Field,
    mode: LevelReduction,
}

pub async fn run(args: &RegionMeanArgs) -> Result<PathBuf> {
    let bounds = args
        .valid_bounds
        .map(|(lo, hi)| ValidBounds::new(lo, hi))
        .transpose()?;
    let mut writer = StoreWriter::create(&args.output, args.overwrite)?;

    println!("reading mask '{}' from {}", args.mask_name, args.mask_file.display());
    let mask_ds = Dataset::open(&args.mask_file).await?;
    let LoadedMask { dim, mask, .. } = mask_ds.read_mask(&args.mask_name)?;

    println!("reading {}", args.input.display());
    let input = Dataset::open(&args.input).await?;
    match input.dimension_size(&dim)? {
        Some(n) if n == mask.len() => {}
        Some(n) => {
            return Err(Error::schema(format!(
                "'{}' has {} entries in '{}' but {} in the mask",
                dim,
                n,
                args.input.display(),
                mask.len()
            ))
            .into());
        }
        None => {
            return Err(Error::schema(format!(
                "'{}' has no '{}' dimension, which the mask is defined over",
                args.input.display(),
                dim
            ))
            .into());
        }
    }

    let weight_name = pick_weight(args, &input, &mask_ds)?;
    let weight = if input.has_variable(&weight_name) {
        input.read_field(&weight_name)?
    } else {
        mask_ds.read_field(&weight_name)?
    };
    if weight.dims() != std::slice::from_ref(&dim) {
        return Err(Error::schema(format!(
            "weight '{}' has dimensions ({}); expected ({})",
            weight_name,
            weight.dims().join(", "),
            dim
        ))
        .into());
    }
    println!("weighting columns by '{}'", weight_name);

    let level_step = match (args.level_bounds, &args.level_weight) {
        (Some((lo, hi)), Some(name)) => Some(LevelStep {
            range: LevelRange::new(lo, hi)?,
            weight: input.read_field(name)?,
            mode: if args.level_average {
                LevelReduction::Average
            } else {
                LevelReduction::Sum
            },
        }),
        _ => None,
    };

    let reducer = RegionReducer::new(&mask, dim.as_str(), weight.data(), REGION_DIM)?;
    let reduction = Reduction::from(args.mode);
    let mode_name = match reduction {
        Reduction::Mean => "mean",
        Reduction::Integral => "integral",
    };
    println!(
        "reducing to {} regions ({}{})",
        reducer.num_regions(),
        mode_name,
        if bounds.is_some() { ", bounded" } else { "" }
    );

    let mut skipped: Vec<&str> = vec!["lat", "lon", args.mask_name.as_str(), weight_name.as_str()];
    if let Some(name) = &args.level_weight {
        skipped.push(name);
    }

    let mut reduced = 0usize;
    for name in input.variable_names() {
        if skipped.contains(&name) || args.exclude.iter().any(|e| e == name) {
            continue;
        }
        let variable = input.variable(name)?;
        let attrs = copied_attributes(variable.attributes.clone());

        if !variable.dims.contains(&dim) {
            // Coordinate variables such as time and lev are carried over.
            if variable.dims.len() == 1 && variable.dims[0] == name {
                writer.write_field(&input.read_field(name)?, attrs)?;
            }
            continue;
        }

        debug!("reducing {}", name);
        let mut field = input.read_field(name)?;
        if let Some(step) = &level_step {
            // Only the level dimension the weight is defined over is contracted.
            let level_dim = field.dims().iter().find(|d| LEVEL_DIMS.contains(&d.as_str()));
            if level_dim.is_some_and(|d| step.weight.dims().contains(d)) {
                field = vertical_contraction(&field, Some(&step.weight), step.range, step.mode)
                    .with_context(|| format!("Failed to contract '{}' over levels", name))?;
            }
        }
        let result = match bounds {
            Some(b) => reducer.bounded_masked_integral(&field, reduction, b),
            None => reducer.masked_integral(&field, reduction),
        }
        .with_context(|| format!("Failed to reduce '{}'", name))?;
        writer.write_field(&result, attrs)?;
        reduced += 1;
    }

    let mut weight_attrs = Attributes::new();
    weight_attrs.insert(
        "long_name".to_string(),
        format!("total '{}' per region", weight_name).into(),
    );
    writer.write_array(
        &format!("region_{}", weight_name),
        &[REGION_DIM.to_string()],
        &[reducer.num_regions()],
        ArrayData::F64(reducer.region_weights()),
        weight_attrs,
    )?;

    writer.set_global_attribute("source", args.input.display().to_string());
    writer.set_global_attribute("mask_file", args.mask_file.display().to_string());
    writer.set_global_attribute("mask_name", args.mask_name.as_str());
    writer.set_global_attribute("weight", weight_name.as_str());
    writer.set_global_attribute("reduction", mode_name);
    if let Some(b) = args.valid_bounds {
        writer.set_global_attribute("valid_bounds", format!("{},{}", b.0, b.1));
    }

    let path = writer.finish()?;
    println!("reduced {} variables into {}", reduced, path.display());
    Ok(path)
}

fn pick_weight(args: &RegionMeanArgs, input: &Dataset, mask_ds: &Dataset) -> Result<String> {
    let found = |name: &str| input.has_variable(name) || mask_ds.has_variable(name);
    if let Some(name) = &args.weight {
        if !found(name) {
            return Err(Error::usage(format!(
                "weight '{}' is in neither '{}' nor '{}'",
                name,
                args.input.display(),
                args.mask_file.display()
            ))
            .into());
        }
        return Ok(name.clone());
    }
    DEFAULT_WEIGHTS
        .iter()
        .find(|&&n| found(n))
        .map(|n| n.to_string())
        .ok_or_else(|| {
            Error::usage(format!(
                "no weight variable given and neither {} was found; pass --weight",
                DEFAULT_WEIGHTS.join(" nor ")
            ))
            .into()
        })
}
