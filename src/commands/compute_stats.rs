//! `compute-stats`: evaluate a profiling configuration offline.

use super::masks::copied_attributes;
use crate::config::ProfilingConfig;
use crate::dataset::Dataset;
use crate::error::Error;
use crate::stats::StatEvaluator;
use crate::writer::StoreWriter;
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use tracing::{debug, warn};

#[derive(Debug, Args)]
pub struct ComputeStatsArgs {
    /// Profiling configuration (YAML)
    #[arg(short = 'c', long = "config")]
    pub config: PathBuf,

    /// Input store with the tracked fields
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,

    /// Output store, one variable per stat
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,

    /// Replace an existing output store
    #[arg(short = 'O', long)]
    pub overwrite: bool,
}

pub async fn run(args: &ComputeStatsArgs) -> Result<PathBuf> {
    let config = ProfilingConfig::from_path(&args.config)?;
    let mut writer = StoreWriter::create(&args.output, args.overwrite)?;

    let input = Dataset::open(&args.input).await?;
    let mut evaluator = StatEvaluator::new(&input);

    let mut computed = 0usize;
    for field_name in &config.fields_to_track {
        if !input.has_variable(field_name) {
            warn!("'{}' is not in {}; skipping its stats", field_name, args.input.display());
            continue;
        }
        let Some(stats) = config.fields.get(field_name) else {
            continue;
        };
        println!("computing stats of {}", field_name);
        let field = input.read_field(field_name)?;
        let attrs = copied_attributes(input.variable(field_name)?.attributes.clone());

        for (stat_name, spec) in stats.iter() {
            let spec = spec.ok_or_else(|| {
                Error::InvalidConfig(format!("stat '{}' is not defined", stat_name))
            })?;
            debug!("  {} ({})", stat_name, spec.type_name());
            evaluator.load_masks(spec).await?;
            let result = evaluator
                .evaluate(spec, &field)
                .with_context(|| format!("Failed to compute '{}' of '{}'", stat_name, field_name))?;
            writer.write_field(&result.with_name(stat_name), attrs.clone())?;
            computed += 1;
        }
    }

    writer.set_global_attribute("source", args.input.display().to_string());
    writer.set_global_attribute("config", args.config.display().to_string());
    writer.set_global_attribute("filename_prefix", config.output.filename_prefix.as_str());

    let path = writer.finish()?;
    println!("wrote {} stats to {}", computed, path.display());
    Ok(path)
}
