//! `plot`: show a field on a lat/lon raster.

use super::UnitsArg;
use crate::coords::CoordinateSet;
use crate::dataset::Dataset;
use crate::mask::RegionIndexMapping;
use crate::plot::{PlotSelection, Raster, column_frames};
use crate::visualize::show_frames;
use anyhow::{Context, Result, bail};
use clap::Args;
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct PlotArgs {
    /// Input store
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,

    /// Variable to plot
    pub variable: String,

    /// Units of `lat`/`lon`
    #[arg(long, value_enum, default_value_t = UnitsArg::Auto)]
    pub units: UnitsArg,

    /// Level index, required for fields with a vertical dimension
    #[arg(short = 'l', long = "level")]
    pub level: Option<usize>,

    /// Show a single time index instead of stepping through all of them
    #[arg(short = 't', long = "time")]
    pub time: Option<usize>,

    /// Mask store of a region-reduced field
    #[arg(short = 'm', long = "mask-file", requires = "mask_name")]
    pub mask_file: Option<PathBuf>,

    /// Mask variable in the mask store
    #[arg(short = 'n', long = "mask-name", requires = "mask_file")]
    pub mask_name: Option<String>,

    /// Raster width in pixels; the height is half of it
    #[arg(long, default_value_t = 720)]
    pub width: usize,
}

pub async fn run(args: &PlotArgs) -> Result<()> {
    let input = Dataset::open(&args.input).await?;
    let field = input.read_field(&args.variable)?;

    let mask_ds = match &args.mask_file {
        Some(path) => Some(
            Dataset::open(path)
                .await
                .with_context(|| format!("Failed to open mask file '{}'", path.display()))?,
        ),
        None => None,
    };
    let mask = match (&mask_ds, &args.mask_name) {
        (Some(ds), Some(name)) => Some(ds.read_mask(name)?),
        _ => None,
    };

    let coords = plot_coordinates(&input, mask_ds.as_ref(), args.units)?;
    let frames = column_frames(
        &field,
        &coords.dim_name,
        mask.as_ref().map(|m| &m.mask),
        PlotSelection {
            time: args.time,
            level: args.level,
        },
    )?;

    let rasters = frames
        .iter()
        .map(|values| Raster::from_columns(&coords.coords, values, args.width))
        .collect::<Result<Vec<_>>>()?;
    println!("plotting {} ({} frame(s))", args.variable, rasters.len());

    let markers: Vec<(usize, usize)> = match (&mask, rasters.first()) {
        (Some(m), Some(raster)) => {
            let mapping = RegionIndexMapping::from_mask(&m.mask);
            let centres = mapping.representatives(&m.mask, &coords.coords)?;
            for (label, c) in mapping.labels().iter().zip(&centres) {
                println!("region {} centred at {}", label, c);
            }
            centres.into_iter().map(|c| raster.pixel_of(c)).collect()
        }
        _ => Vec::new(),
    };

    show_frames(&args.variable, &rasters, &markers)
}

/// `lat`/`lon` of the input, or of the mask store when the input has none
fn plot_coordinates(
    input: &Dataset,
    mask_ds: Option<&Dataset>,
    units: UnitsArg,
) -> Result<CoordinateSet> {
    if input.has_variable("lat") {
        return input.read_coordinates(units.into());
    }
    match mask_ds {
        Some(ds) if ds.has_variable("lat") => ds.read_coordinates(units.into()),
        _ => bail!(
            "Neither '{}' nor the mask store has lat/lon coordinates",
            input.path().display()
        ),
    }
}
