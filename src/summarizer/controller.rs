//! Controller summary roll-up, including aircraft-interaction proximity
//! aggregation (spec.md §4.7, "Controller summary derives additionally").
//!
//! The live tables only ever hold each identity triad's latest sample, so
//! reconstructing *who was talking to whom, when* over a session window
//! has to come from the append-only `transceivers` table instead — the one
//! table in this schema that keeps a genuine time series.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Timelike, Utc};
use diesel::prelude::*;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::controllers::Controller;
use crate::controllers_repo::ControllersRepository;
use crate::db::{self, PgPool};
use crate::error::CoreError;
use crate::geometry::haversine_distance_nm;
use crate::schema::controller_summaries;
use crate::session::reconnect::MergedSession;
use crate::transceivers::{EntityType, Transceiver};
use crate::transceivers_repo::TransceiversRepository;

/// A controller sample more than this far in time from a pilot sample is
/// not considered contemporaneous for interaction purposes. Set a little
/// above the default poll interval so adjacent ticks still pair up.
const MAX_SAMPLE_SKEW_SECS: i64 = 90;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AircraftDetail {
    pub callsign: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub time_on_frequency_minutes: f64,
}

#[derive(Debug, Clone, PartialEq)]
struct InteractionAggregate {
    total_aircraft_handled: i32,
    peak_aircraft_count: i32,
    hourly_aircraft_breakdown: BTreeMap<String, i64>,
    aircraft_details: Vec<AircraftDetail>,
}

/// Pure proximity aggregation, tested in isolation. For each pilot sample,
/// pair it with the controller sample closest in time (within
/// `MAX_SAMPLE_SKEW_SECS`) and count it as an interaction if the
/// great-circle distance is within `radius_nm`.
fn aggregate_interactions(
    controller_samples: &[Transceiver],
    pilot_samples: &[Transceiver],
    radius_nm: f64,
) -> InteractionAggregate {
    let mut events: Vec<(String, DateTime<Utc>)> = Vec::new();

    for pilot in pilot_samples {
        let (Some(p_lat), Some(p_lon)) = (pilot.lat_deg, pilot.lon_deg) else {
            continue;
        };
        let nearest = controller_samples
            .iter()
            .filter_map(|c| {
                let (c_lat, c_lon) = (c.lat_deg?, c.lon_deg?);
                let skew = (pilot.sampled_at - c.sampled_at).num_seconds().abs();
                if skew > MAX_SAMPLE_SKEW_SECS {
                    return None;
                }
                Some((skew, c_lat, c_lon))
            })
            .min_by_key(|(skew, _, _)| *skew);

        let Some((_, c_lat, c_lon)) = nearest else {
            continue;
        };
        if haversine_distance_nm(p_lat, p_lon, c_lat, c_lon) <= radius_nm {
            events.push((pilot.callsign.clone(), pilot.sampled_at));
        }
    }

    let total_aircraft_handled = {
        let mut callsigns: Vec<&str> = events.iter().map(|(c, _)| c.as_str()).collect();
        callsigns.sort();
        callsigns.dedup();
        callsigns.len() as i32
    };

    let mut minute_buckets: HashMap<DateTime<Utc>, Vec<&str>> = HashMap::new();
    let mut hour_buckets: BTreeMap<String, Vec<&str>> = BTreeMap::new();
    let mut per_callsign: HashMap<&str, (DateTime<Utc>, DateTime<Utc>)> = HashMap::new();

    for (callsign, ts) in &events {
        let minute = truncate_to_minute(*ts);
        minute_buckets.entry(minute).or_default().push(callsign);

        let hour_key = truncate_to_hour(*ts).to_rfc3339();
        hour_buckets.entry(hour_key).or_default().push(callsign);

        per_callsign
            .entry(callsign.as_str())
            .and_modify(|(first, last)| {
                if *ts < *first {
                    *first = *ts;
                }
                if *ts > *last {
                    *last = *ts;
                }
            })
            .or_insert((*ts, *ts));
    }

    let peak_aircraft_count = minute_buckets
        .values()
        .map(|callsigns| {
            let mut uniq: Vec<&&str> = callsigns.iter().collect();
            uniq.sort();
            uniq.dedup();
            uniq.len() as i32
        })
        .max()
        .unwrap_or(0);

    let hourly_aircraft_breakdown = hour_buckets
        .into_iter()
        .map(|(hour, callsigns)| {
            let mut uniq = callsigns;
            uniq.sort();
            uniq.dedup();
            (hour, uniq.len() as i64)
        })
        .collect();

    let mut aircraft_details: Vec<AircraftDetail> = per_callsign
        .into_iter()
        .map(|(callsign, (first_seen, last_seen))| AircraftDetail {
            callsign: callsign.to_string(),
            first_seen,
            last_seen,
            time_on_frequency_minutes: (last_seen - first_seen).num_seconds() as f64 / 60.0,
        })
        .collect();
    aircraft_details.sort_by(|a, b| a.callsign.cmp(&b.callsign));

    InteractionAggregate {
        total_aircraft_handled,
        peak_aircraft_count,
        hourly_aircraft_breakdown,
        aircraft_details,
    }
}

fn truncate_to_minute(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.with_second(0).unwrap_or(ts).with_nanosecond(0).unwrap_or(ts)
}

fn truncate_to_hour(ts: DateTime<Utc>) -> DateTime<Utc> {
    truncate_to_minute(ts).with_minute(0).unwrap_or(ts)
}

#[derive(Insertable)]
#[diesel(table_name = crate::schema::controller_summaries)]
struct NewControllerSummary {
    id: Uuid,
    callsign: String,
    cid: i32,
    session_start_time: DateTime<Utc>,
    session_end_time: DateTime<Utc>,
    session_duration_minutes: f64,
    facility: Option<i32>,
    frequencies_used: serde_json::Value,
    total_aircraft_handled: i32,
    peak_aircraft_count: i32,
    hourly_aircraft_breakdown: serde_json::Value,
    aircraft_details: serde_json::Value,
}

#[derive(Clone)]
pub struct ControllerSummarizer {
    controllers_repo: ControllersRepository,
    transceivers_repo: TransceiversRepository,
    pool: PgPool,
    interaction_radius_nm: f64,
}

impl ControllerSummarizer {
    pub fn new(
        controllers_repo: ControllersRepository,
        transceivers_repo: TransceiversRepository,
        pool: PgPool,
        interaction_radius_nm: f64,
    ) -> Self {
        Self {
            controllers_repo,
            transceivers_repo,
            pool,
            interaction_radius_nm,
        }
    }

    pub async fn summarize(&self, merged: &MergedSession) -> Result<(), CoreError> {
        let rows: Vec<Controller> = self
            .controllers_repo
            .rows_for_session(
                merged.callsign.clone(),
                merged.cid,
                merged.merged_logon_times.clone(),
            )
            .await?;
        if rows.is_empty() {
            return Ok(());
        }

        let mut by_recency = rows.clone();
        by_recency.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
        let facility = by_recency.iter().find_map(|c| c.facility);
        let mut frequencies_used: Vec<String> =
            rows.iter().filter_map(|c| c.frequency.clone()).collect();
        frequencies_used.sort();
        frequencies_used.dedup();

        let controller_samples = self
            .transceivers_repo
            .in_window(EntityType::Atc, merged.session_start_time, merged.session_end_time)
            .await?
            .into_iter()
            .filter(|t| t.callsign == merged.callsign)
            .collect::<Vec<_>>();
        let pilot_samples = self
            .transceivers_repo
            .in_window(EntityType::Pilot, merged.session_start_time, merged.session_end_time)
            .await?;

        let interactions =
            aggregate_interactions(&controller_samples, &pilot_samples, self.interaction_radius_nm);

        let session_duration_minutes =
            (merged.session_end_time - merged.session_start_time).num_seconds() as f64 / 60.0;

        let summary = NewControllerSummary {
            id: Uuid::now_v7(),
            callsign: merged.callsign.clone(),
            cid: merged.cid,
            session_start_time: merged.session_start_time,
            session_end_time: merged.session_end_time,
            session_duration_minutes,
            facility,
            frequencies_used: json!(frequencies_used),
            total_aircraft_handled: interactions.total_aircraft_handled,
            peak_aircraft_count: interactions.peak_aircraft_count,
            hourly_aircraft_breakdown: json!(interactions.hourly_aircraft_breakdown),
            aircraft_details: json!(interactions.aircraft_details),
        };

        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(db::transient)?;
            diesel::insert_into(controller_summaries::table)
                .values(&summary)
                .execute(&mut conn)
                .map_err(CoreError::from_diesel)
        })
        .await
        .map_err(db::transient)??;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transceiver(callsign: &str, entity_type: EntityType, lat: f64, lon: f64, at: DateTime<Utc>) -> Transceiver {
        Transceiver {
            callsign: callsign.into(),
            transceiver_id: 0,
            entity_type,
            frequency_hz: Some(128_550_000),
            lat_deg: Some(lat),
            lon_deg: Some(lon),
            height_msl_m: None,
            height_agl_m: None,
            sampled_at: at,
        }
    }

    #[test]
    fn test_pilot_within_radius_counts_as_interaction() {
        let t = Utc::now();
        let controller = vec![transceiver("SY_TWR", EntityType::Atc, -33.9, 151.2, t)];
        let pilots = vec![transceiver("QFA1", EntityType::Pilot, -33.91, 151.21, t)];
        let agg = aggregate_interactions(&controller, &pilots, 30.0);
        assert_eq!(agg.total_aircraft_handled, 1);
        assert_eq!(agg.aircraft_details.len(), 1);
        assert_eq!(agg.aircraft_details[0].callsign, "QFA1");
    }

    #[test]
    fn test_pilot_outside_radius_does_not_count() {
        let t = Utc::now();
        let controller = vec![transceiver("SY_TWR", EntityType::Atc, -33.9, 151.2, t)];
        // Melbourne, ~380nm from Sydney, well outside a 30nm radius.
        let pilots = vec![transceiver("QFA2", EntityType::Pilot, -37.67, 144.84, t)];
        let agg = aggregate_interactions(&controller, &pilots, 30.0);
        assert_eq!(agg.total_aircraft_handled, 0);
        assert!(agg.aircraft_details.is_empty());
    }

    #[test]
    fn test_sample_beyond_time_skew_is_ignored() {
        let t = Utc::now();
        let controller = vec![transceiver("SY_TWR", EntityType::Atc, -33.9, 151.2, t)];
        let pilots = vec![transceiver(
            "QFA1",
            EntityType::Pilot,
            -33.9,
            151.2,
            t + chrono::Duration::seconds(MAX_SAMPLE_SKEW_SECS + 10),
        )];
        let agg = aggregate_interactions(&controller, &pilots, 30.0);
        assert_eq!(agg.total_aircraft_handled, 0);
    }

    #[test]
    fn test_peak_aircraft_count_is_max_simultaneous_in_a_minute() {
        let t = Utc::now();
        let controller = vec![transceiver("SY_TWR", EntityType::Atc, -33.9, 151.2, t)];
        let pilots = vec![
            transceiver("QFA1", EntityType::Pilot, -33.9, 151.2, t),
            transceiver("QFA2", EntityType::Pilot, -33.91, 151.21, t),
        ];
        let agg = aggregate_interactions(&controller, &pilots, 30.0);
        assert_eq!(agg.peak_aircraft_count, 2);
        assert_eq!(agg.total_aircraft_handled, 2);
    }
}
