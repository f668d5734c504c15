pub mod aggregate;
pub mod commands;
pub mod config;
pub mod coords;
pub mod dataset;
pub mod ensemble;
pub mod error;
pub mod field;
pub mod layout;
pub mod mask;
pub mod metadata;
pub mod plot;
pub mod regions;
pub mod stats;
pub mod store;
pub mod visualize;
pub mod writer;

// Re-export commonly used types for tests
pub use aggregate::{Reduction, RegionReducer, ValidBounds};
pub use dataset::Dataset;
pub use error::Error;
pub use field::Field;
pub use mask::{RegionIndexMapping, RegionMask};
pub use store::ZarrStore;
pub use writer::StoreWriter;
