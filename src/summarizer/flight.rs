//! Flight summary roll-up (spec.md §4.7, "Flight summary derives").

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::db::{self, PgPool};
use crate::error::CoreError;
use crate::flights::Flight;
use crate::flights_repo::FlightsRepository;
use crate::schema::flight_summaries;
use crate::session::reconnect::MergedSession;

/// Row shape for listing summaries back out, used by the `/api/flights/summaries`
/// read endpoint.
#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = crate::schema::flight_summaries)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct FlightSummaryRow {
    pub id: Uuid,
    pub callsign: String,
    pub cid: i32,
    pub session_start_time: DateTime<Utc>,
    pub session_end_time: DateTime<Utc>,
    pub duration_minutes: f64,
    pub departure: Option<String>,
    pub arrival: Option<String>,
    pub route: Option<String>,
    pub flight_rules: Option<String>,
    pub aircraft_type: Option<String>,
    pub planned_altitude: Option<String>,
    pub remarks: Option<String>,
    pub min_altitude: Option<i32>,
    pub max_altitude: Option<i32>,
    pub max_groundspeed: Option<i32>,
    pub distinct_transponders: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable)]
#[diesel(table_name = crate::schema::flight_summaries)]
struct NewFlightSummary {
    id: Uuid,
    callsign: String,
    cid: i32,
    session_start_time: DateTime<Utc>,
    session_end_time: DateTime<Utc>,
    duration_minutes: f64,
    departure: Option<String>,
    arrival: Option<String>,
    route: Option<String>,
    flight_rules: Option<String>,
    aircraft_type: Option<String>,
    planned_altitude: Option<String>,
    remarks: Option<String>,
    min_altitude: Option<i32>,
    max_altitude: Option<i32>,
    max_groundspeed: Option<i32>,
    distinct_transponders: serde_json::Value,
}

/// Pure aggregation over a session's raw rows, tested in isolation.
/// `session_start_time`/`session_end_time` come from the already-computed
/// `MergedSession` rather than being recomputed from `rows`, since the
/// merge may have folded in rows whose own `last_updated` values the
/// caller already reduced correctly.
fn aggregate(merged: &MergedSession, rows: &[Flight]) -> NewFlightSummary {
    let duration_minutes =
        (merged.session_end_time - merged.session_start_time).num_seconds() as f64 / 60.0;

    // "Most recent non-null": walk rows newest-first, take the first
    // non-null value seen per field.
    let mut by_recency: Vec<&Flight> = rows.iter().collect();
    by_recency.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));

    let departure = by_recency.iter().find_map(|f| f.departure.clone());
    let arrival = by_recency.iter().find_map(|f| f.arrival.clone());
    let route = by_recency.iter().find_map(|f| f.route.clone());
    let flight_rules = by_recency.iter().find_map(|f| f.flight_rules.clone());
    let aircraft_type = by_recency.iter().find_map(|f| f.aircraft_type.clone());
    let planned_altitude = by_recency.iter().find_map(|f| f.planned_altitude.clone());
    let remarks = by_recency.iter().find_map(|f| f.remarks.clone());

    let min_altitude = rows.iter().filter_map(|f| f.altitude).min();
    let max_altitude = rows.iter().filter_map(|f| f.altitude).max();
    let max_groundspeed = rows.iter().filter_map(|f| f.groundspeed).max();

    let mut distinct_transponders: Vec<String> =
        rows.iter().filter_map(|f| f.transponder.clone()).collect();
    distinct_transponders.sort();
    distinct_transponders.dedup();

    NewFlightSummary {
        id: Uuid::now_v7(),
        callsign: merged.callsign.clone(),
        cid: merged.cid,
        session_start_time: merged.session_start_time,
        session_end_time: merged.session_end_time,
        duration_minutes,
        departure,
        arrival,
        route,
        flight_rules,
        aircraft_type,
        planned_altitude,
        remarks,
        min_altitude,
        max_altitude,
        max_groundspeed,
        distinct_transponders: json!(distinct_transponders),
    }
}

#[derive(Clone)]
pub struct FlightSummarizer {
    flights_repo: FlightsRepository,
    pool: PgPool,
}

impl FlightSummarizer {
    pub fn new(flights_repo: FlightsRepository, pool: PgPool) -> Self {
        Self { flights_repo, pool }
    }

    /// Insert the summary row for a merged session. A unique-constraint
    /// violation is classified by `CoreError::from_diesel` as
    /// `DbIntegrity` ("already summarized") rather than propagated as a
    /// hard failure — the scheduler proceeds to archive+delete either way.
    pub async fn summarize(&self, merged: &MergedSession) -> Result<(), CoreError> {
        let rows = self
            .flights_repo
            .rows_for_session(
                merged.callsign.clone(),
                merged.cid,
                merged.merged_logon_times.clone(),
            )
            .await?;
        if rows.is_empty() {
            return Ok(());
        }
        let summary = aggregate(merged, &rows);

        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(db::transient)?;
            diesel::insert_into(flight_summaries::table)
                .values(&summary)
                .execute(&mut conn)
                .map_err(CoreError::from_diesel)
        })
        .await
        .map_err(db::transient)??;
        Ok(())
    }

    /// List every summary row, newest session first. Backs the dashboard's
    /// `GET /api/flights/summaries` endpoint.
    pub async fn list_summaries(&self) -> Result<Vec<FlightSummaryRow>, CoreError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(db::transient)?;
            flight_summaries::table
                .order(flight_summaries::session_end_time.desc())
                .load::<FlightSummaryRow>(&mut conn)
                .map_err(CoreError::from_diesel)
        })
        .await
        .map_err(db::transient)?
    }
}
