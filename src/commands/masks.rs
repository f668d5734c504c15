//! `ipcc-masks`, `zonal-masks` and `global-mask`.

use super::UnitsArg;
use crate::dataset::Dataset;
use crate::mask::{RegionMask, build_mask};
use crate::metadata::{AttributeValue, Attributes};
use crate::regions::{GlobalRegion, PolygonRegions, RegionClassifier, ZONAL_BAND_NAMES, ZonalBands};
use crate::writer::{ArrayData, StoreWriter};
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, Args)]
pub struct MaskArgs {
    /// Input store with `lat` and `lon` over the column dimension
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,

    /// Output store for the coordinates and the mask
    #[arg(short = 'm', long = "mask-file")]
    pub output: PathBuf,

    /// Units of `lat`/`lon`
    #[arg(long, value_enum, default_value_t = UnitsArg::Auto)]
    pub units: UnitsArg,

    /// Name of the mask variable
    #[arg(long, default_value = "mask")]
    pub mask_name: String,

    /// Replace an existing output store
    #[arg(short = 'o', long)]
    pub overwrite: bool,
}

#[derive(Debug, Args)]
pub struct IpccMasksArgs {
    #[command(flatten)]
    pub common: MaskArgs,

    /// GeoJSON FeatureCollection of the reference regions
    #[arg(long, value_name = "GEOJSON")]
    pub regions: PathBuf,
}

/// Label type of the stored mask
#[derive(Debug, Clone, Copy)]
enum MaskDtype {
    F64,
    I32,
}

pub async fn run_ipcc(args: &IpccMasksArgs) -> Result<PathBuf> {
    let text = std::fs::read_to_string(&args.regions)
        .with_context(|| format!("Failed to read regions file '{}'", args.regions.display()))?;
    let regions = PolygonRegions::from_geojson_str(&text)
        .with_context(|| format!("Failed to load regions from '{}'", args.regions.display()))?;
    println!("loaded {} regions from {}", regions.regions().len(), args.regions.display());

    let mut attrs = Attributes::new();
    attrs.insert(
        "region_numbers".to_string(),
        AttributeValue::Array(regions.regions().iter().map(|r| i64::from(r.id).into()).collect()),
    );
    attrs.insert(
        "region_names".to_string(),
        AttributeValue::Array(regions.regions().iter().map(|r| r.name.as_str().into()).collect()),
    );
    attrs.insert(
        "region_abbrevs".to_string(),
        AttributeValue::Array(regions.regions().iter().map(|r| r.abbrev.as_str().into()).collect()),
    );

    write_masks(&args.common, &regions, MaskDtype::F64, attrs).await
}

pub async fn run_zonal(args: &MaskArgs) -> Result<PathBuf> {
    let mut attrs = Attributes::new();
    attrs.insert(
        "region_names".to_string(),
        AttributeValue::Array(ZONAL_BAND_NAMES.iter().map(|n| (*n).into()).collect()),
    );
    write_masks(args, &ZonalBands, MaskDtype::I32, attrs).await
}

pub async fn run_global(args: &MaskArgs) -> Result<PathBuf> {
    write_masks(args, &GlobalRegion, MaskDtype::I32, Attributes::new()).await
}

/// Classify the input columns and write `lat`, `lon` and the mask.
///
/// The output location is checked before anything is classified, and nothing
/// is written if any column cannot be classified.
async fn write_masks<C>(
    args: &MaskArgs,
    classifier: &C,
    dtype: MaskDtype,
    mut mask_attrs: Attributes,
) -> Result<PathBuf>
where
    C: RegionClassifier,
{
    let mut writer = StoreWriter::create(&args.output, args.overwrite)?;

    println!("reading coordinates from {}", args.input.display());
    let input = Dataset::open(&args.input).await?;
    let coords = input.read_coordinates(args.units.into())?;
    println!("classifying {} columns ({} regions)", coords.len(), classifier.scheme());

    let mask = build_mask(&coords.coords, classifier)
        .with_context(|| format!("Failed to build the {} mask", classifier.scheme()))?;
    report_counts(&mask);

    for name in ["lat", "lon"] {
        let field = input.read_field(name)?;
        let attrs = copied_attributes(input.variable(name)?.attributes.clone());
        writer.write_field(&field, attrs)?;
    }

    mask_attrs.insert("scheme".to_string(), classifier.scheme().into());
    mask_attrs.insert(
        "long_name".to_string(),
        format!("{} region label", classifier.scheme()).into(),
    );
    let data = match dtype {
        MaskDtype::F64 => ArrayData::F64(mask.labels().iter().map(|&l| f64::from(l)).collect()),
        MaskDtype::I32 => ArrayData::I32(mask.labels().to_vec()),
    };
    writer.write_array(
        &args.mask_name,
        std::slice::from_ref(&coords.dim_name),
        &[mask.len()],
        data,
        mask_attrs,
    )?;
    writer.set_global_attribute("source", args.input.display().to_string());
    writer.set_global_attribute("region_scheme", classifier.scheme());

    let path = writer.finish()?;
    println!("wrote {}", path.display());
    Ok(path)
}

fn report_counts(mask: &RegionMask) {
    for label in mask.distinct_labels() {
        let n = mask.labels().iter().filter(|&&l| l == label).count();
        debug!("region {}: {} columns", label, n);
    }
}

/// Attributes of an input variable, minus the dimension list the writer owns.
pub(crate) fn copied_attributes(mut attrs: Attributes) -> Attributes {
    attrs.remove(crate::metadata::ARRAY_DIMENSIONS);
    attrs
}
