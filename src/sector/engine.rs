//! The per-aircraft hysteresis state machine (spec.md §4.5).
//!
//! Per spec.md §9, state is held in an integer-keyed arena plus a
//! `callsign → index` map rather than a dictionary keyed directly by
//! callsign — this mirrors the teacher's `AircraftStatesMap` /
//! `FlightProcessorContext` shape in `flight_tracker/mod.rs`, generalized
//! from a `DashMap<Uuid, AircraftState>` to an arena since sector state is
//! owned exclusively by the poll task (spec.md §5: "no other task mutates
//! it") and needs no concurrent map.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::sector::loader::SectorIndex;

#[derive(Debug, Clone)]
struct AircraftSectorState {
    callsign: String,
    current_sector: Option<String>,
    exit_counter: u32,
    last_speed: Option<i32>,
}

/// One tick's worth of sector-state instructions for the repository layer:
/// which open intervals to close, and what new interval (if any) to open.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SectorTickOutcome {
    pub close_open_intervals: bool,
    pub open_new_interval: Option<NewInterval>,
    /// Always applied when the aircraft remains in a non-null sector, even
    /// when no transition fired, so a vanished aircraft's last known
    /// position is available to the stale-cleanup job.
    pub update_last_position: Option<LastPosition>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewInterval {
    pub sector_name: String,
    pub entry_timestamp: DateTime<Utc>,
    pub entry_lat: f64,
    pub entry_lon: f64,
    pub entry_altitude: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LastPosition {
    pub lat: f64,
    pub lon: f64,
    pub altitude: Option<i32>,
}

pub struct SectorEngineConfig {
    pub enter_kts: f64,
    pub exit_kts: f64,
    pub exit_debounce_ticks: u32,
}

/// One sample of a live pilot, as the engine needs it. Deliberately
/// decoupled from `PilotSample` so the engine's unit tests don't need to
/// construct a full upstream sample.
#[derive(Debug, Clone)]
pub struct AircraftTick {
    pub callsign: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub altitude: Option<i32>,
    pub groundspeed: Option<i32>,
    pub timestamp: DateTime<Utc>,
}

/// Arena of per-callsign sector state, indexed by a side map so cleanup
/// and iteration stay O(live aircraft) rather than requiring a full
/// dictionary scan every tick.
pub struct SectorEngine {
    arena: Vec<AircraftSectorState>,
    index_by_callsign: HashMap<String, usize>,
    config: SectorEngineConfig,
}

impl SectorEngine {
    pub fn new(config: SectorEngineConfig) -> Self {
        Self {
            arena: Vec::new(),
            index_by_callsign: HashMap::new(),
            config,
        }
    }

    fn slot_for(&mut self, callsign: &str) -> usize {
        if let Some(&idx) = self.index_by_callsign.get(callsign) {
            return idx;
        }
        let idx = self.arena.len();
        self.arena.push(AircraftSectorState {
            callsign: callsign.to_string(),
            current_sector: None,
            exit_counter: 0,
            last_speed: None,
        });
        self.index_by_callsign.insert(callsign.to_string(), idx);
        idx
    }

    /// Evaluate one tick's transition rules for one aircraft (spec.md
    /// §4.5, rules 1-4). Returns the instructions the caller should apply
    /// to the sector-occupancy repository.
    pub fn process_tick(&mut self, sectors: &SectorIndex, tick: &AircraftTick) -> SectorTickOutcome {
        let idx = self.slot_for(&tick.callsign);

        let speed = tick.groundspeed;
        self.arena[idx].last_speed = speed;

        let Some(s) = speed else {
            // Rule 1: retain previous state, zero the exit counter, emit nothing.
            self.arena[idx].exit_counter = 0;
            return SectorTickOutcome::default();
        };

        if s >= self.config.enter_kts as i32 {
            self.apply_enter_rule(idx, sectors, tick)
        } else if s >= self.config.exit_kts as i32 {
            // Rule 3: deadband. Retain current sector, zero the counter.
            self.arena[idx].exit_counter = 0;
            self.last_position_outcome(idx, tick)
        } else {
            self.apply_exit_rule(idx, tick)
        }
    }

    fn apply_enter_rule(
        &mut self,
        idx: usize,
        sectors: &SectorIndex,
        tick: &AircraftTick,
    ) -> SectorTickOutcome {
        let new_sector = match (tick.lat, tick.lon) {
            (Some(lat), Some(lon)) => sectors.sector_of(lat, lon, tick.altitude).map(str::to_string),
            _ => None,
        };

        let current = self.arena[idx].current_sector.clone();
        let transitioned = new_sector != current;

        let mut outcome = SectorTickOutcome::default();
        if transitioned {
            outcome.close_open_intervals = true;
            if let (Some(name), Some(lat), Some(lon)) = (&new_sector, tick.lat, tick.lon) {
                outcome.open_new_interval = Some(NewInterval {
                    sector_name: name.clone(),
                    entry_timestamp: tick.timestamp,
                    entry_lat: lat,
                    entry_lon: lon,
                    entry_altitude: tick.altitude,
                });
            }
        }

        self.arena[idx].exit_counter = 0;
        self.arena[idx].current_sector = new_sector;

        if self.arena[idx].current_sector.is_some() {
            if let (Some(lat), Some(lon)) = (tick.lat, tick.lon) {
                outcome.update_last_position = Some(LastPosition {
                    lat,
                    lon,
                    altitude: tick.altitude,
                });
            }
        }
        outcome
    }

    fn apply_exit_rule(&mut self, idx: usize, tick: &AircraftTick) -> SectorTickOutcome {
        self.arena[idx].exit_counter += 1;
        let mut outcome = SectorTickOutcome::default();

        if self.arena[idx].exit_counter >= self.config.exit_debounce_ticks.max(1) {
            if self.arena[idx].current_sector.is_some() {
                outcome.close_open_intervals = true;
            }
            self.arena[idx].current_sector = None;
        } else {
            outcome = self.last_position_outcome(idx, tick);
        }
        outcome
    }

    fn last_position_outcome(&self, idx: usize, tick: &AircraftTick) -> SectorTickOutcome {
        let mut outcome = SectorTickOutcome::default();
        if self.arena[idx].current_sector.is_some() {
            if let (Some(lat), Some(lon)) = (tick.lat, tick.lon) {
                outcome.update_last_position = Some(LastPosition {
                    lat,
                    lon,
                    altitude: tick.altitude,
                });
            }
        }
        outcome
    }

    /// Remove per-flight state for callsigns no longer present in the live
    /// table (spec.md §4.5, stale-cleanup: "purge the in-memory per-flight
    /// state map"). Rebuilds the index rather than shifting the arena in
    /// place, since cleanup runs far less often than per-tick processing.
    pub fn purge_absent(&mut self, live_callsigns: &std::collections::HashSet<String>) {
        let retained: Vec<AircraftSectorState> = self
            .arena
            .drain(..)
            .filter(|state| live_callsigns.contains(&state.callsign))
            .collect();
        self.index_by_callsign.clear();
        for (idx, state) in retained.iter().enumerate() {
            self.index_by_callsign.insert(state.callsign.clone(), idx);
        }
        self.arena = retained;
    }

    pub fn current_sector(&self, callsign: &str) -> Option<&str> {
        self.index_by_callsign
            .get(callsign)
            .and_then(|&idx| self.arena[idx].current_sector.as_deref())
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sector::loader::SectorDefinition;

    fn engine() -> SectorEngine {
        SectorEngine::new(SectorEngineConfig {
            enter_kts: 60.0,
            exit_kts: 30.0,
            exit_debounce_ticks: 1,
        })
    }

    fn sectors() -> SectorIndex {
        SectorIndex::build(vec![SectorDefinition {
            name: "SYDNEY".into(),
            vertices: vec![(0.0, 0.0), (0.0, 10.0), (10.0, 10.0), (10.0, 0.0), (0.0, 0.0)],
            floor_altitude: None,
            ceiling_altitude: None,
        }])
    }

    fn tick(callsign: &str, lat: f64, lon: f64, speed: i32, t: DateTime<Utc>) -> AircraftTick {
        AircraftTick {
            callsign: callsign.into(),
            lat: Some(lat),
            lon: Some(lon),
            altitude: Some(10000),
            groundspeed: Some(speed),
            timestamp: t,
        }
    }

    #[test]
    fn test_entry_opens_interval() {
        let mut eng = engine();
        let idx = sectors();
        let t0 = Utc::now();
        let outcome = eng.process_tick(&idx, &tick("QFA1", 5.0, 5.0, 100, t0));
        assert!(outcome.close_open_intervals);
        assert!(outcome.open_new_interval.is_some());
        assert_eq!(eng.current_sector("QFA1"), Some("SYDNEY"));
    }

    #[test]
    fn test_null_speed_retains_state_and_zeroes_counter() {
        let mut eng = engine();
        let idx = sectors();
        let t0 = Utc::now();
        eng.process_tick(&idx, &tick("QFA1", 5.0, 5.0, 100, t0));

        let mut null_speed_tick = tick("QFA1", 5.0, 5.0, 0, t0);
        null_speed_tick.groundspeed = None;
        let outcome = eng.process_tick(&idx, &null_speed_tick);
        assert_eq!(outcome, SectorTickOutcome::default());
        assert_eq!(eng.current_sector("QFA1"), Some("SYDNEY"));
    }

    #[test]
    fn test_hysteresis_sequence_100_25_100_emits_exit_then_entry() {
        // End-to-end scenario 4 from spec.md §8.
        let mut eng = engine();
        let idx = sectors();
        let t0 = Utc::now();

        let enter = eng.process_tick(&idx, &tick("QFA1", 5.0, 5.0, 100, t0));
        assert!(enter.open_new_interval.is_some());

        let exit = eng.process_tick(&idx, &tick("QFA1", 5.0, 5.0, 25, t0 + chrono::Duration::seconds(30)));
        assert!(exit.close_open_intervals);
        assert!(exit.open_new_interval.is_none());
        assert_eq!(eng.current_sector("QFA1"), None);

        let reenter = eng.process_tick(&idx, &tick("QFA1", 5.0, 5.0, 100, t0 + chrono::Duration::seconds(60)));
        assert!(reenter.open_new_interval.is_some());
        assert_eq!(eng.current_sector("QFA1"), Some("SYDNEY"));
    }

    #[test]
    fn test_deadband_retains_sector_without_emitting() {
        let mut eng = engine();
        let idx = sectors();
        let t0 = Utc::now();
        eng.process_tick(&idx, &tick("QFA1", 5.0, 5.0, 100, t0));

        let deadband = eng.process_tick(&idx, &tick("QFA1", 5.0, 5.0, 45, t0 + chrono::Duration::seconds(30)));
        assert!(!deadband.close_open_intervals);
        assert!(deadband.open_new_interval.is_none());
        assert_eq!(eng.current_sector("QFA1"), Some("SYDNEY"));
    }

    #[test]
    fn test_purge_absent_removes_stale_callsigns() {
        let mut eng = engine();
        let idx = sectors();
        let t0 = Utc::now();
        eng.process_tick(&idx, &tick("QFA1", 5.0, 5.0, 100, t0));
        eng.process_tick(&idx, &tick("QFA2", 5.0, 5.0, 100, t0));
        assert_eq!(eng.len(), 2);

        let live: std::collections::HashSet<String> = ["QFA1".to_string()].into_iter().collect();
        eng.purge_absent(&live);
        assert_eq!(eng.len(), 1);
        assert_eq!(eng.current_sector("QFA1"), Some("SYDNEY"));
        assert_eq!(eng.current_sector("QFA2"), None);
    }
}
