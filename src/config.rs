//! The YAML input of the profiling tool: which fields to track and which
//! statistics to compute for each of them.

use crate::error::{Error, Result};
use crate::stats::{
    BoundedMaskedIntegralSpec, MaskedIntegralSpec, StatSpec, VerticalContractionSpec,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfilingOutput {
    pub filename_prefix: String,
    #[serde(rename = "Flush Frequency")]
    pub flush_frequency: u32,
    #[serde(rename = "Enable Output")]
    pub enable_output: bool,
    #[serde(rename = "Save Geometry Fields")]
    pub save_geometry_fields: bool,
}

impl Default for ProfilingOutput {
    fn default() -> Self {
        Self {
            filename_prefix: "cldera_stats".to_string(),
            flush_frequency: 100,
            enable_output: true,
            save_geometry_fields: true,
        }
    }
}

/// The stats of one tracked field. `compute_stats` lists the names to run,
/// in order; each name has its spec in `stats`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FieldStats {
    #[serde(rename = "Compute Stats")]
    pub compute_stats: Vec<String>,
    #[serde(flatten)]
    pub stats: IndexMap<String, StatSpec>,
}

impl FieldStats {
    pub fn push(&mut self, name: String, spec: StatSpec) {
        self.compute_stats.push(name.clone());
        self.stats.insert(name, spec);
    }

    /// (name, spec) pairs in `Compute Stats` order
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&StatSpec>)> {
        self.compute_stats
            .iter()
            .map(|name| (name.as_str(), self.stats.get(name)))
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProfilingConfig {
    #[serde(rename = "Profiling Output")]
    pub output: ProfilingOutput,
    #[serde(rename = "Fields To Track")]
    pub fields_to_track: Vec<String>,
    #[serde(flatten)]
    pub fields: IndexMap<String, FieldStats>,
}

impl ProfilingConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        // serde_yaml does not accept the version directive.
        let body: String = text
            .lines()
            .filter(|l| !l.starts_with("%YAML"))
            .collect::<Vec<_>>()
            .join("\n");
        let config: ProfilingConfig =
            serde_yaml::from_str(&body).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml_str(&text)
            .with_context(|| format!("Failed to load config file {}", path.display()))
    }

    /// YAML 1.1 document with explicit start and end markers
    pub fn to_yaml_string(&self) -> Result<String> {
        let body = serde_yaml::to_string(self).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        Ok(format!("%YAML 1.1\n---\n{}...\n", body))
    }

    /// Every tracked field has a block and every listed stat has a spec.
    pub fn validate(&self) -> Result<()> {
        for name in &self.fields_to_track {
            let stats = self.fields.get(name).ok_or_else(|| {
                Error::InvalidConfig(format!("tracked field '{}' has no stats block", name))
            })?;
            for (stat, spec) in stats.iter() {
                if spec.is_none() {
                    return Err(Error::InvalidConfig(format!(
                        "stat '{}' of field '{}' is listed in 'Compute Stats' but not defined",
                        stat, name
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Masks used by the generated configuration: (name suffix, file name).
pub const MASKS: [(&str, &str); 3] = [
    ("_glb", "global.ne30.nc"),
    ("_znl", "zonal.regions.ne30.nc"),
    ("_ar6", "ar6.regions.ne30.nc"),
];

/// Vertical ranges of the 3D fields: (name suffix, inclusive level bounds).
pub const LEVEL_BOUNDS: [(&str, [usize; 2]); 5] = [
    ("", [0, 71]),
    ("_ltropo", [54, 71]),
    ("_strato", [15, 21]),
    ("_53", [19, 19]),
    ("_998", [71, 71]),
];

pub const VALID_BOUNDS: [f64; 2] = [0.0, 1.0e10];

pub const DEFAULT_VARS_3D: &[&str] = &["T", "u", "v", "SO2", "H2SO4", "Mass_so4", "QRL", "QRS"];

pub const DEFAULT_VARS_2D_BOUNDED: &[&str] =
    &["AEROD_v", "ABSORB", "AODVIS", "AODALL", "AODABS", "AODSO4"];

pub const DEFAULT_VARS_2D: &[&str] = &[
    "BURDENSO4", "TS", "TREFHT", "QREFHT", "QFLX", "SHFLX", "LHFLX", "FLDS", "FLDSC", "FLNS",
    "FLNSC", "FLNT", "FLNTC", "FLUT", "FLUTC", "FSDS", "FSDSC", "FSDS_d2", "FSNS", "FSNSC", "FSNT",
    "FSNTC", "FSNTOA", "FSNTOAC", "FSUTOA", "FSUTOAC", "LWCF", "SOLIN", "SOLL", "SOLLD",
    "SOLLD_d2", "SOLL_d2", "SOLS", "SOLSD", "SOLSD_d2", "SOLS_d2", "SWCF",
];

/// Inputs of the configuration generator.
#[derive(Debug, Clone)]
pub struct ConfigTemplate {
    pub mask_location: String,
    /// Fields with a vertical dimension; contracted with `pdel` first.
    pub vars3d: Vec<String>,
    /// Fields that use a fill value; reduced with [`VALID_BOUNDS`].
    pub vars2d_bounded: Vec<String>,
    pub vars2d: Vec<String>,
}

impl Default for ConfigTemplate {
    fn default() -> Self {
        let owned = |v: &[&str]| v.iter().map(|s| s.to_string()).collect();
        Self {
            mask_location: "masks".to_string(),
            vars3d: owned(DEFAULT_VARS_3D),
            vars2d_bounded: owned(DEFAULT_VARS_2D_BOUNDED),
            vars2d: owned(DEFAULT_VARS_2D),
        }
    }
}

impl ConfigTemplate {
    fn mask_spec(&self, suffix: &str, file: &str) -> MaskedIntegralSpec {
        MaskedIntegralSpec {
            mask_file_name: Path::new(&self.mask_location)
                .join(file)
                .to_string_lossy()
                .into_owned(),
            mask_field: format!("mask{}", suffix),
            weight_field: Some("area".to_string()),
            average: None,
        }
    }

    pub fn generate(&self) -> ProfilingConfig {
        let mut config = ProfilingConfig::default();

        for var in &self.vars3d {
            let mut stats = FieldStats::default();
            for (level_suffix, bounds) in LEVEL_BOUNDS {
                for (mask_suffix, file) in MASKS {
                    let spec = StatSpec::Pipe {
                        inner: Box::new(StatSpec::VerticalContraction(VerticalContractionSpec {
                            level_bounds: bounds,
                            weight_field: Some("pdel".to_string()),
                            average: None,
                        })),
                        outer: Box::new(StatSpec::MaskedIntegral(self.mask_spec(mask_suffix, file))),
                    };
                    stats.push(format!("{var}{mask_suffix}{level_suffix}"), spec);
                }
            }
            config.track(var, stats);
        }

        for var in &self.vars2d_bounded {
            let mut stats = FieldStats::default();
            for (mask_suffix, file) in MASKS {
                let spec = StatSpec::BoundedMaskedIntegral(BoundedMaskedIntegralSpec {
                    integral: self.mask_spec(mask_suffix, file),
                    valid_bounds: VALID_BOUNDS,
                });
                stats.push(format!("{var}{mask_suffix}"), spec);
            }
            config.track(var, stats);
        }

        for var in &self.vars2d {
            let mut stats = FieldStats::default();
            for (mask_suffix, file) in MASKS {
                let spec = StatSpec::MaskedIntegral(self.mask_spec(mask_suffix, file));
                stats.push(format!("{var}{mask_suffix}"), spec);
            }
            config.track(var, stats);
        }

        config
    }
}

impl ProfilingConfig {
    fn track(&mut self, var: &str, stats: FieldStats) {
        if !self.fields_to_track.iter().any(|v| v == var) {
            self.fields_to_track.push(var.to_string());
        }
        self.fields.insert(var.to_string(), stats);
    }
}
