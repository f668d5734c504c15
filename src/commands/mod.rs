//! Subcommands of the `cldera-utils` binary.
//!
//! Each subcommand has a clap `Args` struct and an async `run` that returns
//! once its output is in place.

pub mod compute_stats;
pub mod ensemble;
pub mod generate_config;
pub mod masks;
pub mod plot;
pub mod region_mean;

use crate::dataset::CoordinateUnits;
use anyhow::{Context, Result, bail};
use clap::ValueEnum;

/// `--units` of the commands that read `lat`/`lon`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum UnitsArg {
    /// Use the `units` attribute of `lat`
    Auto,
    Degrees,
    Radians,
}

impl From<UnitsArg> for CoordinateUnits {
    fn from(units: UnitsArg) -> Self {
        match units {
            UnitsArg::Auto => CoordinateUnits::Auto,
            UnitsArg::Degrees => CoordinateUnits::Degrees,
            UnitsArg::Radians => CoordinateUnits::Radians,
        }
    }
}

/// Parse a 'LO,HI' pair of numbers
pub fn parse_f64_pair(s: &str) -> Result<(f64, f64)> {
    let (lo, hi) = split_pair(s)?;
    let lo: f64 = lo
        .parse()
        .with_context(|| format!("Invalid lower bound '{}'", lo))?;
    let hi: f64 = hi
        .parse()
        .with_context(|| format!("Invalid upper bound '{}'", hi))?;
    Ok((lo, hi))
}

/// Parse a 'LO,HI' pair of indices
pub fn parse_index_pair(s: &str) -> Result<(usize, usize)> {
    let (lo, hi) = split_pair(s)?;
    let lo: usize = lo
        .parse()
        .with_context(|| format!("Invalid lower index '{}'", lo))?;
    let hi: usize = hi
        .parse()
        .with_context(|| format!("Invalid upper index '{}'", hi))?;
    Ok((lo, hi))
}

fn split_pair(s: &str) -> Result<(&str, &str)> {
    let Some((lo, hi)) = s.split_once(',') else {
        bail!("Expected 'LO,HI', got '{}'", s);
    };
    let (lo, hi) = (lo.trim(), hi.trim());
    if lo.is_empty() || hi.is_empty() {
        bail!("Expected 'LO,HI', got '{}'", s);
    }
    Ok((lo, hi))
}
