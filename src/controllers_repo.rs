//! Batch upsert and query operations for the live `controllers` table.
//! Same shape as `flights_repo.rs`; see that module's header for grounding.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::upsert::excluded;

use crate::controllers::{Controller, ControllerModel};
use crate::db::{self, PgPool};
use crate::error::CoreError;
use crate::schema::controllers;

#[derive(Clone)]
pub struct ControllersRepository {
    pool: PgPool,
}

impl ControllersRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn upsert_batch(&self, batch: Vec<Controller>) -> Result<usize, CoreError> {
        if batch.is_empty() {
            return Ok(0);
        }
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(db::transient)?;
            let models: Vec<ControllerModel> =
                batch.iter().map(ControllerModel::from_controller).collect();
            diesel::insert_into(controllers::table)
                .values(&models)
                .on_conflict((controllers::callsign, controllers::cid, controllers::logon_time))
                .do_update()
                .set((
                    controllers::name.eq(excluded(controllers::name)),
                    controllers::facility.eq(excluded(controllers::facility)),
                    controllers::rating.eq(excluded(controllers::rating)),
                    controllers::frequency.eq(excluded(controllers::frequency)),
                    controllers::visual_range.eq(excluded(controllers::visual_range)),
                    controllers::text_atis.eq(excluded(controllers::text_atis)),
                    controllers::status.eq(excluded(controllers::status)),
                    controllers::last_updated.eq(excluded(controllers::last_updated)),
                    controllers::last_seen.eq(excluded(controllers::last_seen)),
                ))
                .execute(&mut conn)
                .map_err(CoreError::from_diesel)
        })
        .await
        .map_err(db::transient)?
    }

    pub async fn list_all(&self) -> Result<Vec<Controller>, CoreError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(db::transient)?;
            controllers::table
                .load::<ControllerModel>(&mut conn)
                .map(|rows| rows.into_iter().map(Controller::from).collect())
                .map_err(CoreError::from_diesel)
        })
        .await
        .map_err(db::transient)?
    }

    /// Controllers last seen before `cutoff` and still marked online — the
    /// candidate set for the timeout scan described in spec.md §9
    /// ("Controller" lifecycle, `FLIGHT_TIMEOUT_MINUTES`-style staleness).
    pub async fn online_not_seen_since(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Controller>, CoreError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(db::transient)?;
            controllers::table
                .filter(controllers::last_seen.lt(cutoff))
                .filter(controllers::status.eq("online"))
                .load::<ControllerModel>(&mut conn)
                .map(|rows| rows.into_iter().map(Controller::from).collect())
                .map_err(CoreError::from_diesel)
        })
        .await
        .map_err(db::transient)?
    }

    pub async fn mark_offline(
        &self,
        callsign: String,
        cid: i32,
        logon_time: DateTime<Utc>,
    ) -> Result<usize, CoreError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(db::transient)?;
            diesel::update(
                controllers::table.filter(
                    controllers::callsign
                        .eq(callsign)
                        .and(controllers::cid.eq(cid))
                        .and(controllers::logon_time.eq(logon_time)),
                ),
            )
            .set(controllers::status.eq("offline"))
            .execute(&mut conn)
            .map_err(CoreError::from_diesel)
        })
        .await
        .map_err(db::transient)?
    }

    pub async fn stale_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<Controller>, CoreError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(db::transient)?;
            controllers::table
                .filter(controllers::last_updated.lt(cutoff))
                .load::<ControllerModel>(&mut conn)
                .map(|rows| rows.into_iter().map(Controller::from).collect())
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
                controllers::table.filter(
                    controllers::callsign
                        .eq(callsign)
                        .and(controllers::cid.eq(cid))
                        .and(controllers::logon_time.eq(logon_time)),
                ),
            )
            .execute(&mut conn)
            .map_err(CoreError::from_diesel)
        })
        .await
        .map_err(db::transient)?
    }

    /// Every live row belonging to a (possibly reconnection-merged) session.
    /// See `FlightsRepository::rows_for_session` for the identical shape.
    pub async fn rows_for_session(
        &self,
        callsign: String,
        cid: i32,
        logon_times: Vec<DateTime<Utc>>,
    ) -> Result<Vec<Controller>, CoreError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(db::transient)?;
            controllers::table
                .filter(controllers::callsign.eq(callsign))
                .filter(controllers::cid.eq(cid))
                .filter(controllers::logon_time.eq_any(logon_times))
                .load::<ControllerModel>(&mut conn)
                .map(|rows| rows.into_iter().map(Controller::from).collect())
                .map_err(CoreError::from_diesel)
        })
        .await
        .map_err(db::transient)?
    }
}
