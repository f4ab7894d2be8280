//! Sector occupancy interval persistence: opening, closing, and the
//! self-healing repair of invariant I-S1 (spec.md §4.5, "Closing an
//! interval").

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use tracing::warn;
use uuid::Uuid;

use crate::db::{self, PgPool};
use crate::error::CoreError;
use crate::schema::flight_sector_occupancy;
use crate::sector::engine::{LastPosition, NewInterval};

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::flight_sector_occupancy)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OccupancyRow {
    pub id: Uuid,
    pub callsign: String,
    pub sector_name: String,
    pub entry_timestamp: DateTime<Utc>,
    pub entry_lat: f64,
    pub entry_lon: f64,
    pub entry_altitude: Option<i32>,
    pub exit_timestamp: Option<DateTime<Utc>>,
    pub last_lat: f64,
    pub last_lon: f64,
    pub last_alt: Option<i32>,
    pub duration_seconds: Option<i64>,
}

#[derive(Insertable)]
#[diesel(table_name = crate::schema::flight_sector_occupancy)]
struct NewOccupancyRow {
    id: Uuid,
    callsign: String,
    sector_name: String,
    entry_timestamp: DateTime<Utc>,
    entry_lat: f64,
    entry_lon: f64,
    entry_altitude: Option<i32>,
    last_lat: f64,
    last_lon: f64,
    last_alt: Option<i32>,
}

#[derive(Clone)]
pub struct SectorRepository {
    pool: PgPool,
}

impl SectorRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Close every open interval for `callsign` (normally zero or one row;
    /// more than one is the corruption case I-S1 guards against, and is
    /// self-healed here by closing all of them — spec.md §4.5: "if more
    /// than one open interval exists for a callsign, close all of them").
    pub async fn close_open_intervals(
        &self,
        callsign: String,
        exit_timestamp: DateTime<Utc>,
        last: Option<LastPosition>,
    ) -> Result<usize, CoreError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(db::transient)?;
            conn.transaction::<usize, diesel::result::Error, _>(|conn| {
                let open_rows: Vec<OccupancyRow> = flight_sector_occupancy::table
                    .filter(flight_sector_occupancy::callsign.eq(&callsign))
                    .filter(flight_sector_occupancy::exit_timestamp.is_null())
                    .select(OccupancyRow::as_select())
                    .load(conn)?;

                if open_rows.len() > 1 {
                    warn!(
                        callsign = %callsign,
                        count = open_rows.len(),
                        "invariant I-S1 violated, self-healing by closing all open intervals"
                    );
                }

                let mut closed = 0;
                for row in open_rows {
                    let duration = (exit_timestamp - row.entry_timestamp).num_seconds().max(0);
                    let (last_lat, last_lon, last_alt) = match last {
                        Some(pos) => (pos.lat, pos.lon, pos.altitude),
                        None => (row.last_lat, row.last_lon, row.last_alt),
                    };
                    diesel::update(flight_sector_occupancy::table.find(row.id))
                        .set((
                            flight_sector_occupancy::exit_timestamp.eq(exit_timestamp),
                            flight_sector_occupancy::duration_seconds.eq(duration),
                            flight_sector_occupancy::last_lat.eq(last_lat),
                            flight_sector_occupancy::last_lon.eq(last_lon),
                            flight_sector_occupancy::last_alt.eq(last_alt),
                        ))
                        .execute(conn)?;
                    closed += 1;
                }
                Ok(closed)
            })
            .map_err(CoreError::from_diesel)
        })
        .await
        .map_err(db::transient)?
    }

    pub async fn open_interval(&self, callsign: String, new: NewInterval) -> Result<(), CoreError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(db::transient)?;
            let row = NewOccupancyRow {
                id: Uuid::now_v7(),
                callsign,
                sector_name: new.sector_name,
                entry_timestamp: new.entry_timestamp,
                entry_lat: new.entry_lat,
                entry_lon: new.entry_lon,
                entry_altitude: new.entry_altitude,
                last_lat: new.entry_lat,
                last_lon: new.entry_lon,
                last_alt: new.entry_altitude,
            };
            diesel::insert_into(flight_sector_occupancy::table)
                .values(&row)
                .execute(&mut conn)
                .map_err(CoreError::from_diesel)
        })
        .await
        .map_err(db::transient)?
        .map(|_| ())
    }

    pub async fn update_last_position(
        &self,
        callsign: String,
        last: LastPosition,
    ) -> Result<usize, CoreError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(db::transient)?;
            diesel::update(
                flight_sector_occupancy::table
                    .filter(flight_sector_occupancy::callsign.eq(callsign))
                    .filter(flight_sector_occupancy::exit_timestamp.is_null()),
            )
            .set((
                flight_sector_occupancy::last_lat.eq(last.lat),
                flight_sector_occupancy::last_lon.eq(last.lon),
                flight_sector_occupancy::last_alt.eq(last.altitude),
            ))
            .execute(&mut conn)
            .map_err(CoreError::from_diesel)
        })
        .await
        .map_err(db::transient)?
    }

    /// Every still-open interval, for the stale-cleanup scan.
    pub async fn open_intervals(&self) -> Result<Vec<OccupancyRow>, CoreError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(db::transient)?;
            flight_sector_occupancy::table
                .filter(flight_sector_occupancy::exit_timestamp.is_null())
                .select(OccupancyRow::as_select())
                .load(&mut conn)
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
    fn test_duration_never_negative() {
        let entry = Utc::now();
        let exit = entry - chrono::Duration::seconds(5);
        let duration = (exit - entry).num_seconds().max(0);
        assert_eq!(duration, 0);
    }
}
