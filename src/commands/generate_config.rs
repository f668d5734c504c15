//! `generate-config`: write the profiling tool's YAML input.

use crate::config::ConfigTemplate;
use crate::error::Error;
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct GenerateConfigArgs {
    /// Output YAML file
    #[arg(short = 'o', long = "output", default_value = "cldera_profiling_config.yaml")]
    pub output: PathBuf,

    /// Directory holding the mask files, as the profiling tool will see it
    #[arg(long, default_value = "masks")]
    pub mask_location: String,

    /// Fields with a vertical dimension (replaces the default list)
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    pub vars3d: Option<Vec<String>>,

    /// Two-dimensional fields (replaces the default list)
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    pub vars2d: Option<Vec<String>>,

    /// Two-dimensional fields with fill values (replaces the default list)
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    pub vars2d_bounded: Option<Vec<String>>,

    /// Replace an existing output file
    #[arg(short = 'O', long)]
    pub overwrite: bool,
}

pub async fn run(args: &GenerateConfigArgs) -> Result<PathBuf> {
    if args.output.exists() && (!args.output.is_file() || !args.overwrite) {
        return Err(Error::usage(format!(
            "'{}' already exists; pass the overwrite flag to replace it",
            args.output.display()
        ))
        .into());
    }

    let defaults = ConfigTemplate::default();
    let template = ConfigTemplate {
        mask_location: args.mask_location.clone(),
        vars3d: args.vars3d.clone().unwrap_or(defaults.vars3d),
        vars2d_bounded: args.vars2d_bounded.clone().unwrap_or(defaults.vars2d_bounded),
        vars2d: args.vars2d.clone().unwrap_or(defaults.vars2d),
    };
    let config = template.generate();
    let text = config.to_yaml_string()?;

    tokio::fs::write(&args.output, text)
        .await
        .with_context(|| format!("Failed to write '{}'", args.output.display()))?;
    println!(
        "wrote {} tracked fields to {}",
        config.fields_to_track.len(),
        args.output.display()
    );
    Ok(args.output.clone())
}
