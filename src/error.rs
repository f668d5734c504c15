use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the mask and aggregation core.
///
/// Every variant is fatal for the invocation that produced it. The only
/// non-error "failure" of the core is a region with zero total weight, which
/// is reported as a NaN entry in the result instead.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad arguments or an unusable output location.
    #[error("{0}")]
    Usage(String),

    /// The polygon lookup failed for both the original and the perturbed coordinate.
    #[error(
        "could not classify coordinate lat = {lat}, lon = {lon} \
         (perturbed retry at lat = {retry_lat}, lon = {retry_lon} also failed)"
    )]
    Unclassifiable {
        lat: f64,
        lon: f64,
        retry_lat: f64,
        retry_lon: f64,
    },

    #[error("invalid latitude {0} degrees (expected a finite value in [-90, 90])")]
    InvalidLatitude(f64),

    #[error("invalid longitude {0} (expected a finite value)")]
    InvalidLongitude(f64),

    /// A dimension or variable is missing, or has an unexpected layout.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("ensemble file '{}' is missing variable '{variable}'", file.display())]
    MissingEnsembleVariable { file: PathBuf, variable: String },

    #[error("invalid mask: {0}")]
    InvalidMask(String),

    #[error("invalid stat configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    pub fn usage(msg: impl Into<String>) -> Self {
        Error::Usage(msg.into())
    }

    pub fn schema(msg: impl Into<String>) -> Self {
        Error::SchemaMismatch(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
