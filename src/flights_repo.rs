//! Batch upsert and query operations for the live `flights` table.
//!
//! Grounded on the teacher's `device_repo.rs` upsert-by-conflict-target
//! pattern, generalized from a single-row loop to one multi-row
//! `INSERT ... ON CONFLICT` statement per flush (spec.md §4's batch writer).

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::upsert::excluded;

use crate::db::{self, PgPool};
use crate::error::CoreError;
use crate::flights::{Flight, FlightModel};
use crate::schema::flights;

#[derive(Clone)]
pub struct FlightsRepository {
    pool: PgPool,
}

impl FlightsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Upsert a batch of flights keyed on the `(callsign, cid, logon_time)`
    /// identity triad. Every column except the identity triad and `id` is
    /// overwritten with the incoming value — "latest wins" (I-F1).
    pub async fn upsert_batch(&self, batch: Vec<Flight>) -> Result<usize, CoreError> {
        if batch.is_empty() {
            return Ok(0);
        }
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(db::transient)?;
            let models: Vec<FlightModel> = batch.iter().map(FlightModel::from_flight).collect();
            diesel::insert_into(flights::table)
                .values(&models)
                .on_conflict((flights::callsign, flights::cid, flights::logon_time))
                .do_update()
                .set((
                    flights::name.eq(excluded(flights::name)),
                    flights::latitude.eq(excluded(flights::latitude)),
                    flights::longitude.eq(excluded(flights::longitude)),
                    flights::altitude.eq(excluded(flights::altitude)),
                    flights::groundspeed.eq(excluded(flights::groundspeed)),
                    flights::heading.eq(excluded(flights::heading)),
                    flights::transponder.eq(excluded(flights::transponder)),
                    flights::departure.eq(excluded(flights::departure)),
                    flights::arrival.eq(excluded(flights::arrival)),
                    flights::route.eq(excluded(flights::route)),
                    flights::flight_rules.eq(excluded(flights::flight_rules)),
                    flights::aircraft_type.eq(excluded(flights::aircraft_type)),
                    flights::aircraft_faa.eq(excluded(flights::aircraft_faa)),
                    flights::aircraft_short.eq(excluded(flights::aircraft_short)),
                    flights::planned_altitude.eq(excluded(flights::planned_altitude)),
                    flights::deptime.eq(excluded(flights::deptime)),
                    flights::enroute_time.eq(excluded(flights::enroute_time)),
                    flights::fuel_time.eq(excluded(flights::fuel_time)),
                    flights::remarks.eq(excluded(flights::remarks)),
                    flights::last_updated.eq(excluded(flights::last_updated)),
                ))
                .execute(&mut conn)
                .map_err(CoreError::from_diesel)
        })
        .await
        .map_err(db::transient)?
    }

    pub async fn find_by_callsign(&self, callsign: &str) -> Result<Option<Flight>, CoreError> {
        let pool = self.pool.clone();
        let callsign = callsign.to_string();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(db::transient)?;
            flights::table
                .filter(flights::callsign.eq(callsign))
                .order(flights::last_updated.desc())
                .first::<FlightModel>(&mut conn)
                .optional()
                .map(|opt| opt.map(Flight::from))
                .map_err(CoreError::from_diesel)
        })
        .await
        .map_err(db::transient)?
    }

    pub async fn list_all(&self) -> Result<Vec<Flight>, CoreError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(db::transient)?;
            flights::table
                .load::<FlightModel>(&mut conn)
                .map(|rows| rows.into_iter().map(Flight::from).collect())
                .map_err(CoreError::from_diesel)
        })
        .await
        .map_err(db::transient)?
    }

    /// Flights whose `last_updated` falls before the completion cutoff.
    /// Mirrors the first half of the completion predicate in spec.md §4.6;
    /// the `NOT EXISTS` half lives in `session::detector`, which composes
    /// this query's results against the summary table.
    pub async fn stale_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<Flight>, CoreError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(db::transient)?;
            flights::table
                .filter(flights::last_updated.lt(cutoff))
                .load::<FlightModel>(&mut conn)
                .map(|rows| rows.into_iter().map(Flight::from).collect())
                .map_err(CoreError::from_diesel)
        })
        .await
        .map_err(db::transient)?
    }

    pub async fn delete_by_identity(
        &self,
        callsign: String,
        cid: i32,
        logon_time: DateTime<Utc>,
    ) -> Result<usize, CoreError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(db::transient)?;
            diesel::delete(
                flights::table.filter(
                    flights::callsign
                        .eq(callsign)
                        .and(flights::cid.eq(cid))
                        .and(flights::logon_time.eq(logon_time)),
                ),
            )
            .execute(&mut conn)
            .map_err(CoreError::from_diesel)
        })
        .await
        .map_err(db::transient)?
    }

    /// Every live row belonging to a (possibly reconnection-merged) session
    /// — all rows sharing `(callsign, cid)` whose `logon_time` is one of the
    /// identity triads folded together by `session::reconnect`.
    pub async fn rows_for_session(
        &self,
        callsign: String,
        cid: i32,
        logon_times: Vec<DateTime<Utc>>,
    ) -> Result<Vec<Flight>, CoreError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(db::transient)?;
            flights::table
                .filter(flights::callsign.eq(callsign))
                .filter(flights::cid.eq(cid))
                .filter(flights::logon_time.eq_any(logon_times))
                .load::<FlightModel>(&mut conn)
                .map(|rows| rows.into_iter().map(Flight::from).collect())
                .map_err(CoreError::from_diesel)
        })
        .await
        .map_err(db::transient)?
    }
}
