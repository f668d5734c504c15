use super::{Classification, RegionClassifier};
use crate::coords::Coordinate;

/// Band names, indexed by label.
pub const ZONAL_BAND_NAMES: [&str; 7] = [
    "Polar S",
    "Temperate S",
    "Subtropical S",
    "Tropical",
    "Subtropical N",
    "Temperate N",
    "Polar N",
];

/// Lower latitude edge of bands 1..=6; band 0 covers everything south of the first.
const BAND_LOWER_EDGES: [f64; 6] = [-66.5, -35.0, -23.5, 23.5, 35.0, 66.5];

/// Seven fixed latitude bands, labelled 0 (south pole) to 6 (north pole).
///
/// Longitude is ignored. Every valid latitude falls in exactly one band, so
/// this scheme never reports an undefined region.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZonalBands;

impl ZonalBands {
    pub fn band(lat: f64) -> i32 {
        BAND_LOWER_EDGES.iter().take_while(|&&edge| lat >= edge).count() as i32
    }
}

impl RegionClassifier for ZonalBands {
    fn scheme(&self) -> &'static str {
        "zonal"
    }

    fn classify(&self, coord: Coordinate) -> Classification {
        Classification::Region(Self::band(coord.lat))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_edges() {
        let cases = [
            (-90.0, 0),
            (-66.51, 0),
            (-66.5, 1),
            (-35.01, 1),
            (-35.0, 2),
            (-23.5, 3),
            (0.0, 3),
            (23.49, 3),
            (23.5, 4),
            (34.99, 4),
            (35.0, 5),
            (66.49, 5),
            (66.5, 6),
            (90.0, 6),
        ];
        for (lat, expected) in cases {
            assert_eq!(ZonalBands::band(lat), expected, "lat = {lat}");
        }
    }

    #[test]
    fn test_bands_are_monotonic_and_ignore_longitude() {
        let mut previous = 0;
        let mut lat = -90.0;
        while lat <= 90.0 {
            let here = ZonalBands.classify(Coordinate::new(lat, 0.0).unwrap());
            for lon in [-180.0, -45.0, 90.0, 179.9] {
                assert_eq!(
                    ZonalBands.classify(Coordinate::new(lat, lon).unwrap()),
                    here
                );
            }
            let Classification::Region(id) = here else {
                panic!("zonal band undefined at lat = {lat}");
            };
            assert!((0..=6).contains(&id));
            assert!(id >= previous);
            previous = id;
            lat += 0.25;
        }
        assert_eq!(previous, 6);
    }
}
