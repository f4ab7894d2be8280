//! Filter Chain (C2): geographic boundary test, then callsign-pattern
//! exclusion. Expressed as a composable sequence of pure functions over a
//! `Snapshot`, each maintaining its own counters, per spec.md §9's
//! instruction to avoid ambient mutation.

use geo::{Coord, LineString, Polygon};
use serde::Deserialize;

use crate::sector::polygon::point_in_polygon_inclusive;
use crate::upstream::snapshot::{PilotSample, Snapshot};

/// Per-stage admit/reject counters. Cumulative across the process lifetime;
/// exposed for the `/api/status` shell and for the I-3 invariant
/// (admissions + rejections == inputs) as a testable property.
#[derive(Debug, Clone, Default)]
pub struct FilterStats {
    pub geo_processed: u64,
    pub geo_admitted: u64,
    pub geo_rejected: u64,
    pub pattern_processed: u64,
    pub pattern_admitted: u64,
    pub pattern_rejected: u64,
}

impl FilterStats {
    pub fn geo_total(&self) -> u64 {
        self.geo_admitted + self.geo_rejected
    }

    pub fn pattern_total(&self) -> u64 {
        self.pattern_admitted + self.pattern_rejected
    }
}

/// A named polygon boundary loaded from `GEOGRAPHIC_POLYGONS`.
#[derive(Debug, Clone, Deserialize)]
pub struct BoundaryPolygon {
    pub name: String,
    /// `(lon, lat)` vertex ring, matching `geo`'s coordinate order.
    pub vertices: Vec<(f64, f64)>,
}

impl BoundaryPolygon {
    fn to_geo_polygon(&self) -> Polygon<f64> {
        let coords: Vec<Coord<f64>> = self
            .vertices
            .iter()
            .map(|&(lon, lat)| Coord { x: lon, y: lat })
            .collect();
        Polygon::new(LineString::new(coords), vec![])
    }
}

/// Load boundary polygons from `GEOGRAPHIC_POLYGONS`. A flat JSON array of
/// `BoundaryPolygon`s; an empty or absent file means the geographic filter
/// admits everything (spec.md §4.2). Failures are startup-fatal, same as
/// `sector::loader::load_from_path`.
pub fn load_from_path(
    path: &std::path::Path,
) -> Result<Vec<BoundaryPolygon>, crate::error::CoreError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let contents = std::fs::read_to_string(path).map_err(|e| {
        crate::error::CoreError::ConfigInvalid(format!(
            "failed to read geographic polygons at {}: {e}",
            path.display()
        ))
    })?;
    serde_json::from_str(&contents).map_err(|e| {
        crate::error::CoreError::ConfigInvalid(format!(
            "failed to parse geographic polygons at {}: {e}",
            path.display()
        ))
    })
}

/// F1 — geographic boundary filter. A pilot passes if its position lies
/// inside any configured polygon, or if it has no position at all
/// (conservative admit, spec.md §4.2). Controllers are admitted
/// unconditionally at this stage.
pub fn geographic_filter(
    mut snapshot: Snapshot,
    polygons: &[BoundaryPolygon],
    stats: &mut FilterStats,
) -> Snapshot {
    let geo_polygons: Vec<Polygon<f64>> = polygons.iter().map(BoundaryPolygon::to_geo_polygon).collect();

    let before = snapshot.pilots.len() as u64;
    stats.geo_processed += before;

    snapshot.pilots.retain(|pilot| {
        let admitted = pilot_passes_geo(pilot, &geo_polygons);
        if admitted {
            stats.geo_admitted += 1;
        } else {
            stats.geo_rejected += 1;
        }
        admitted
    });

    snapshot
}

fn pilot_passes_geo(pilot: &PilotSample, polygons: &[Polygon<f64>]) -> bool {
    let (lat, lon) = match (pilot.latitude, pilot.longitude) {
        (Some(lat), Some(lon)) => (lat, lon),
        // Conservative admit: missing coordinates pass the filter.
        _ => return true,
    };
    if polygons.is_empty() {
        return true;
    }
    polygons.iter().any(|poly| point_in_polygon_inclusive(poly, lat, lon))
}

/// F2 — callsign pattern exclusion. Drops any record whose callsign
/// contains one of the configured substrings. Applied to transceivers
/// unconditionally and to controllers/flights per configuration, matching
/// the ordering contract: geographic filtering (F1) precedes this.
pub fn pattern_filter(
    mut snapshot: Snapshot,
    patterns: &[String],
    case_sensitive: bool,
    filter_pilots: bool,
    filter_controllers: bool,
    stats: &mut FilterStats,
) -> Snapshot {
    let total = snapshot.pilots.len() as u64
        + snapshot.controllers.len() as u64
        + snapshot.transceivers.len() as u64;
    stats.pattern_processed += total;

    let matches = |callsign: &str| -> bool {
        if case_sensitive {
            patterns.iter().any(|p| callsign.contains(p.as_str()))
        } else {
            let lower = callsign.to_lowercase();
            patterns.iter().any(|p| lower.contains(&p.to_lowercase()))
        }
    };

    if filter_pilots {
        snapshot.pilots.retain(|p| !record_excluded(&p.callsign, &matches, stats));
    }
    if filter_controllers {
        snapshot
            .controllers
            .retain(|c| !record_excluded(&c.callsign, &matches, stats));
    }
    snapshot
        .transceivers
        .retain(|t| !record_excluded(&t.callsign, &matches, stats));

    snapshot
}

fn record_excluded(callsign: &str, matches: &impl Fn(&str) -> bool, stats: &mut FilterStats) -> bool {
    let excluded = matches(callsign);
    if excluded {
        stats.pattern_rejected += 1;
    } else {
        stats.pattern_admitted += 1;
    }
    excluded
}

/// Run the full chain in contract order: geographic, then pattern.
pub fn run_filter_chain(
    snapshot: Snapshot,
    polygons: &[BoundaryPolygon],
    patterns: &[String],
    case_sensitive: bool,
    stats: &mut FilterStats,
) -> Snapshot {
    let snapshot = geographic_filter(snapshot, polygons, stats);
    pattern_filter(snapshot, patterns, case_sensitive, true, true, stats)
}
