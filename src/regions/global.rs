use super::{Classification, RegionClassifier};
use crate::coords::Coordinate;

/// A single region covering the whole globe (label 0).
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalRegion;

impl RegionClassifier for GlobalRegion {
    fn scheme(&self) -> &'static str {
        "global"
    }

    fn classify(&self, _coord: Coordinate) -> Classification {
        Classification::Region(0)
    }
}
