//! `ensemble-mean-std`

use super::masks::copied_attributes;
use crate::dataset::Dataset;
use crate::ensemble::{MEMBER_PLACEHOLDER, MemberTemplate, ensemble_mean_std};
use crate::writer::StoreWriter;
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct EnsembleArgs {
    /// Member file name; '#' expands to the zero-padded member number
    #[arg(short = 'f', long = "files", value_name = "TEMPLATE")]
    pub template: String,

    /// Number of members
    #[arg(short = 'n', long = "members")]
    pub members: usize,

    /// Number of the first member
    #[arg(short = 's', long = "start", default_value_t = 1)]
    pub start: usize,

    /// Digits of the member number [default: digits of START + N]
    #[arg(short = 'w', long = "width", default_value_t = 0)]
    pub width: usize,

    /// Output store [default: the template with '#' replaced by 'mean_std']
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Variables to leave out
    #[arg(short = 'e', long = "exclude", value_delimiter = ',', num_args = 1..)]
    pub exclude: Vec<String>,

    /// Replace an existing output store
    #[arg(short = 'O', long)]
    pub overwrite: bool,
}

pub async fn run(args: &EnsembleArgs) -> Result<PathBuf> {
    let template = MemberTemplate::new(&args.template, args.members, args.start, args.width)?;
    let output = args.output.clone().unwrap_or_else(|| {
        PathBuf::from(args.template.replace(MEMBER_PLACEHOLDER, "mean_std"))
    });
    let mut writer = StoreWriter::create(&output, args.overwrite)?;

    let stats = ensemble_mean_std(&template, &args.exclude).await?;

    let first_path = template.member_path(args.start);
    let first = Dataset::open(&first_path).await?;
    if first.has_variable("time") {
        let attrs = copied_attributes(first.variable("time")?.attributes.clone());
        writer.write_field(&first.read_field("time")?, attrs)?;
    }

    for s in &stats {
        let attrs = copied_attributes(first.variable(&s.variable)?.attributes.clone());
        writer
            .write_field(&s.mean, attrs.clone())
            .with_context(|| format!("Failed to write the mean of '{}'", s.variable))?;
        writer
            .write_field(&s.std, attrs)
            .with_context(|| format!("Failed to write the std of '{}'", s.variable))?;
    }
    writer.set_global_attribute("ensemble_members", template.count() as i64);
    writer.set_global_attribute("ensemble_template", args.template.as_str());

    let path = writer.finish()?;
    println!("wrote {} variables to {}", stats.len(), path.display());
    Ok(path)
}
