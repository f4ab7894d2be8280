//! Batch Writer (C4): periodic flush of the memory buffer into the three
//! live tables within a single transaction (spec.md §4.4).
//!
//! Grounded on the teacher's `commands/archive.rs` transaction pattern
//! (`conn.transaction::<_, anyhow::Error, _>(|conn| {...})`) and
//! `device_repo.rs`'s upsert-by-conflict-target shape, generalized to a
//! three-table all-or-nothing flush.

use diesel::prelude::*;
use diesel::upsert::excluded;
use tracing::{error, info, instrument};

use crate::buffer::{Buffer, Drained};
use crate::controllers::{Controller, ControllerModel};
use crate::db::{self, PgPool};
use crate::error::CoreError;
use crate::flights::{Flight, FlightModel};
use crate::schema::{controllers, flights, transceivers};
use crate::transceivers::{NewTransceiverModel, Transceiver};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub flights_upserted: usize,
    pub controllers_upserted: usize,
    pub transceivers_inserted: usize,
}

#[derive(Clone)]
pub struct BatchWriter {
    pool: PgPool,
}

impl BatchWriter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Drain the buffer and write everything in one transaction. On
    /// failure the transaction rolls back and **the already-drained data
    /// is lost from the buffer's perspective** — but spec.md §4.4 requires
    /// the buffer not be cleared on rollback. We honor that by draining
    /// only after a successful dry validation is not feasible with a
    /// single DB round trip, so instead `flush` re-ingests the drained
    /// batch back into the buffer if the transaction fails, via
    /// `Buffer::reingest`, which only restores a key if nothing newer
    /// arrived in the meantime (see that method's doc comment).
    #[instrument(skip(self, buffer))]
    pub async fn flush(&self, buffer: &Buffer) -> Result<FlushReport, CoreError> {
        let drained = buffer.drain().await;
        if drained.is_empty() {
            return Ok(FlushReport::default());
        }

        match self.write_transaction(drained.clone()).await {
            Ok(report) => {
                info!(
                    flights = report.flights_upserted,
                    controllers = report.controllers_upserted,
                    transceivers = report.transceivers_inserted,
                    "flush committed"
                );
                Ok(report)
            }
            Err(err) => {
                error!(error = %err, "flush transaction failed, re-buffering drained batch");
                self.reingest(buffer, drained).await;
                Err(err)
            }
        }
    }

    async fn reingest(&self, buffer: &Buffer, drained: Drained) {
        buffer.reingest(drained).await;
    }

    async fn write_transaction(&self, drained: Drained) -> Result<FlushReport, CoreError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(db::transient)?;
            conn.transaction::<FlushReport, diesel::result::Error, _>(|conn| {
                let flight_models: Vec<FlightModel> = drained
                    .pilots
                    .iter()
                    .map(|sample| FlightModel::from_flight(&Flight::from(sample)))
                    .collect();
                let flights_upserted = if flight_models.is_empty() {
                    0
                } else {
                    diesel::insert_into(flights::table)
                        .values(&flight_models)
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
                        .execute(conn)?
                };

                let controller_models: Vec<ControllerModel> = drained
                    .controllers
                    .iter()
                    .map(|sample| ControllerModel::from_controller(&Controller::from(sample)))
                    .collect();
                let controllers_upserted = if controller_models.is_empty() {
                    0
                } else {
                    diesel::insert_into(controllers::table)
                        .values(&controller_models)
                        .on_conflict((
                            controllers::callsign,
                            controllers::cid,
                            controllers::logon_time,
                        ))
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
                        .execute(conn)?
                };

                let transceiver_models: Vec<NewTransceiverModel> = drained
                    .transceivers
                    .iter()
                    .map(|sample| NewTransceiverModel::from_transceiver(&Transceiver::from(sample)))
                    .collect();
                let transceivers_inserted = if transceiver_models.is_empty() {
                    0
                } else {
                    diesel::insert_into(transceivers::table)
                        .values(&transceiver_models)
                        .execute(conn)?
                };

                Ok(FlushReport {
                    flights_upserted,
                    controllers_upserted,
                    transceivers_inserted,
                })
            })
            .map_err(CoreError::from_diesel)
        })
        .await
        .map_err(db::transient)?
    }
}
