//! Archiver / Cleaner (C8): once a session has a summary row, copy its raw
//! rows into the archive table and delete them from the live table, in one
//! transaction (spec.md §4.8).

use chrono::{DateTime, Utc};
use diesel::prelude::*;

use crate::db::{self, PgPool};
use crate::error::CoreError;
use crate::flights::FlightModel;
use crate::schema::{controllers, controllers_archive, flights, flights_archive};
use crate::session::reconnect::MergedSession;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveReport {
    pub records_archived: usize,
    pub records_deleted: usize,
}

#[derive(Insertable)]
#[diesel(table_name = crate::schema::flights_archive)]
struct NewFlightArchiveRow {
    id: uuid::Uuid,
    callsign: String,
    cid: i32,
    logon_time: DateTime<Utc>,
    name: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    altitude: Option<i32>,
    groundspeed: Option<i32>,
    heading: Option<i32>,
    transponder: Option<String>,
    departure: Option<String>,
    arrival: Option<String>,
    route: Option<String>,
    flight_rules: Option<String>,
    aircraft_type: Option<String>,
    aircraft_faa: Option<String>,
    aircraft_short: Option<String>,
    planned_altitude: Option<String>,
    deptime: Option<String>,
    enroute_time: Option<String>,
    fuel_time: Option<String>,
    remarks: Option<String>,
    last_updated: DateTime<Utc>,
}

impl From<FlightModel> for NewFlightArchiveRow {
    fn from(m: FlightModel) -> Self {
        Self {
            id: m.id,
            callsign: m.callsign,
            cid: m.cid,
            logon_time: m.logon_time,
            name: m.name,
            latitude: m.latitude,
            longitude: m.longitude,
            altitude: m.altitude,
            groundspeed: m.groundspeed,
            heading: m.heading,
            transponder: m.transponder,
            departure: m.departure,
            arrival: m.arrival,
            route: m.route,
            flight_rules: m.flight_rules,
            aircraft_type: m.aircraft_type,
            aircraft_faa: m.aircraft_faa,
            aircraft_short: m.aircraft_short,
            planned_altitude: m.planned_altitude,
            deptime: m.deptime,
            enroute_time: m.enroute_time,
            fuel_time: m.fuel_time,
            remarks: m.remarks,
            last_updated: m.last_updated,
        }
    }
}

#[derive(Insertable)]
#[diesel(table_name = crate::schema::controllers_archive)]
struct NewControllerArchiveRow {
    id: uuid::Uuid,
    callsign: String,
    cid: i32,
    logon_time: DateTime<Utc>,
    name: Option<String>,
    facility: Option<i32>,
    rating: Option<i32>,
    frequency: Option<String>,
    visual_range: Option<i32>,
    text_atis: Option<String>,
    status: String,
    last_updated: DateTime<Utc>,
    last_seen: DateTime<Utc>,
}

impl From<crate::controllers::ControllerModel> for NewControllerArchiveRow {
    fn from(m: crate::controllers::ControllerModel) -> Self {
        Self {
            id: m.id,
            callsign: m.callsign,
            cid: m.cid,
            logon_time: m.logon_time,
            name: m.name,
            facility: m.facility,
            rating: m.rating,
            frequency: m.frequency,
            visual_range: m.visual_range,
            text_atis: m.text_atis,
            status: m.status,
            last_updated: m.last_updated,
            last_seen: m.last_seen,
        }
    }
}

#[derive(Clone)]
pub struct Archiver {
    pool: PgPool,
}

impl Archiver {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Archive and delete every live `flights` row folded into `merged`.
    /// Both steps execute in one transaction (spec.md §4.8, step 1/2); if
    /// the live rows were already deleted by a prior attempt this is a
    /// no-op and returns zero counts — the idempotent-retry contract falls
    /// straight out of the `WHERE identity matches` predicate finding
    /// nothing.
    pub async fn archive_flight_session(
        &self,
        merged: &MergedSession,
    ) -> Result<ArchiveReport, CoreError> {
        let pool = self.pool.clone();
        let callsign = merged.callsign.clone();
        let cid = merged.cid;
        let logon_times = merged.merged_logon_times.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(db::transient)?;
            conn.transaction::<ArchiveReport, diesel::result::Error, _>(|conn| {
                let rows: Vec<FlightModel> = flights::table
                    .filter(flights::callsign.eq(&callsign))
                    .filter(flights::cid.eq(cid))
                    .filter(flights::logon_time.eq_any(&logon_times))
                    .load(conn)?;
                if rows.is_empty() {
                    return Ok(ArchiveReport::default());
                }

                let archive_rows: Vec<NewFlightArchiveRow> =
                    rows.into_iter().map(NewFlightArchiveRow::from).collect();
                let records_archived = archive_rows.len();
                diesel::insert_into(flights_archive::table)
                    .values(&archive_rows)
                    .execute(conn)?;

                let records_deleted = diesel::delete(
                    flights::table
                        .filter(flights::callsign.eq(&callsign))
                        .filter(flights::cid.eq(cid))
                        .filter(flights::logon_time.eq_any(&logon_times)),
                )
                .execute(conn)?;

                Ok(ArchiveReport {
                    records_archived,
                    records_deleted,
                })
            })
            .map_err(CoreError::from_diesel)
        })
        .await
        .map_err(db::transient)?
    }

    pub async fn archive_controller_session(
        &self,
        merged: &MergedSession,
    ) -> Result<ArchiveReport, CoreError> {
        let pool = self.pool.clone();
        let callsign = merged.callsign.clone();
        let cid = merged.cid;
        let logon_times = merged.merged_logon_times.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(db::transient)?;
            conn.transaction::<ArchiveReport, diesel::result::Error, _>(|conn| {
                let rows: Vec<crate::controllers::ControllerModel> = controllers::table
                    .filter(controllers::callsign.eq(&callsign))
                    .filter(controllers::cid.eq(cid))
                    .filter(controllers::logon_time.eq_any(&logon_times))
                    .load(conn)?;
                if rows.is_empty() {
                    return Ok(ArchiveReport::default());
                }

                let archive_rows: Vec<NewControllerArchiveRow> = rows
                    .into_iter()
                    .map(NewControllerArchiveRow::from)
                    .collect();
                let records_archived = archive_rows.len();
                diesel::insert_into(controllers_archive::table)
                    .values(&archive_rows)
                    .execute(conn)?;

                let records_deleted = diesel::delete(
                    controllers::table
                        .filter(controllers::callsign.eq(&callsign))
                        .filter(controllers::cid.eq(cid))
                        .filter(controllers::logon_time.eq_any(&logon_times)),
                )
                .execute(conn)?;

                Ok(ArchiveReport {
                    records_archived,
                    records_deleted,
                })
            })
            .map_err(CoreError::from_diesel)
        })
        .await
        .map_err(db::transient)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_report_is_zeroed() {
        let report = ArchiveReport::default();
        assert_eq!(report.records_archived, 0);
        assert_eq!(report.records_deleted, 0);
    }
}
