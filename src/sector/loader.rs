//! Static sector definitions, loaded once at startup and never mutated
//! (spec.md §3, "Sector definition (static)").

use geo::{Coord, LineString, Polygon};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectorDefinition {
    pub name: String,
    /// `(lon, lat)` vertex ring.
    pub vertices: Vec<(f64, f64)>,
    pub floor_altitude: Option<i32>,
    pub ceiling_altitude: Option<i32>,
}

impl SectorDefinition {
    pub fn to_geo_polygon(&self) -> Polygon<f64> {
        let coords: Vec<Coord<f64>> = self
            .vertices
            .iter()
            .map(|&(lon, lat)| Coord { x: lon, y: lat })
            .collect();
        Polygon::new(LineString::new(coords), vec![])
    }

    pub fn admits_altitude(&self, altitude: Option<i32>) -> bool {
        let Some(alt) = altitude else {
            // No altitude sample: don't let a floor/ceiling exclude what
            // would otherwise be a lateral match.
            return true;
        };
        if let Some(floor) = self.floor_altitude {
            if alt < floor {
                return false;
            }
        }
        if let Some(ceiling) = self.ceiling_altitude {
            if alt > ceiling {
                return false;
            }
        }
        true
    }
}

/// Precomputed polygon index: definitions plus their `geo::Polygon`s,
/// built once so per-tick lookups don't re-triangulate vertex lists.
pub struct SectorIndex {
    sectors: Vec<(SectorDefinition, Polygon<f64>)>,
}

impl SectorIndex {
    pub fn build(definitions: Vec<SectorDefinition>) -> Self {
        let sectors = definitions
            .into_iter()
            .map(|def| {
                let poly = def.to_geo_polygon();
                (def, poly)
            })
            .collect();
        Self { sectors }
    }

    /// Find the first sector (by load order) whose polygon contains the
    /// point and whose altitude band admits the sample, or `None` if no
    /// sector matches (spec.md §4.5, "Sector assignment").
    pub fn sector_of(&self, lat: f64, lon: f64, altitude: Option<i32>) -> Option<&str> {
        use crate::sector::polygon::point_in_polygon_inclusive;
        self.sectors
            .iter()
            .find(|(def, poly)| def.admits_altitude(altitude) && point_in_polygon_inclusive(poly, lat, lon))
            .map(|(def, _)| def.name.as_str())
    }

    pub fn definitions(&self) -> impl Iterator<Item = &SectorDefinition> {
        self.sectors.iter().map(|(def, _)| def)
    }
}

/// Load sector definitions from a JSON file. The file is a flat array of
/// `SectorDefinition` objects; failures are propagated as `CoreError`
/// (config loading is a startup-fatal concern, unlike per-tick upstream
/// fetch failures).
pub fn load_from_path(path: &std::path::Path) -> Result<SectorIndex, crate::error::CoreError> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        crate::error::CoreError::ConfigInvalid(format!(
            "failed to read sector definitions at {}: {e}",
            path.display()
        ))
    })?;
    let definitions: Vec<SectorDefinition> = serde_json::from_str(&contents).map_err(|e| {
        crate::error::CoreError::ConfigInvalid(format!(
            "failed to parse sector definitions at {}: {e}",
            path.display()
        ))
    })?;
    Ok(SectorIndex::build(definitions))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(name: &str, floor: Option<i32>, ceiling: Option<i32>) -> SectorDefinition {
        SectorDefinition {
            name: name.into(),
            vertices: vec![(0.0, 0.0), (0.0, 10.0), (10.0, 10.0), (10.0, 0.0), (0.0, 0.0)],
            floor_altitude: floor,
            ceiling_altitude: ceiling,
        }
    }

    #[test]
    fn test_sector_of_finds_containing_polygon() {
        let index = SectorIndex::build(vec![square("SYDNEY", None, None)]);
        assert_eq!(index.sector_of(5.0, 5.0, Some(10000)), Some("SYDNEY"));
        assert_eq!(index.sector_of(50.0, 50.0, Some(10000)), None);
    }

    #[test]
    fn test_altitude_band_excludes_out_of_range() {
        let index = SectorIndex::build(vec![square("LOW", Some(0), Some(5000))]);
        assert_eq!(index.sector_of(5.0, 5.0, Some(10000)), None);
        assert_eq!(index.sector_of(5.0, 5.0, Some(2000)), Some("LOW"));
    }

    #[test]
    fn test_missing_altitude_does_not_exclude() {
        let index = SectorIndex::build(vec![square("ANY", Some(1000), Some(5000))]);
        assert_eq!(index.sector_of(5.0, 5.0, None), Some("ANY"));
    }
}
