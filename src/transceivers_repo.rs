//! Append-only insert path for the `transceivers` table. No upsert: every
//! sample is its own row (spec.md §3).

use chrono::{DateTime, Utc};
use diesel::prelude::*;

use crate::db::{self, PgPool};
use crate::error::CoreError;
use crate::schema::transceivers;
use crate::transceivers::{EntityType, NewTransceiverModel, Transceiver};

#[derive(Clone)]
pub struct TransceiversRepository {
    pool: PgPool,
}

impl TransceiversRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert_batch(&self, batch: Vec<Transceiver>) -> Result<usize, CoreError> {
        if batch.is_empty() {
            return Ok(0);
        }
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(db::transient)?;
            let models: Vec<NewTransceiverModel> = batch
                .iter()
                .map(NewTransceiverModel::from_transceiver)
                .collect();
            diesel::insert_into(transceivers::table)
                .values(&models)
                .execute(&mut conn)
                .map_err(CoreError::from_diesel)
        })
        .await
        .map_err(db::transient)?
    }

    pub async fn count_for_callsign(&self, callsign: &str) -> Result<i64, CoreError> {
        let pool = self.pool.clone();
        let callsign = callsign.to_string();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(db::transient)?;
            transceivers::table
                .filter(transceivers::callsign.eq(callsign))
                .count()
                .get_result(&mut conn)
                .map_err(CoreError::from_diesel)
        })
        .await
        .map_err(db::transient)?
    }

    /// Every transceiver sample of the given kind sampled within
    /// `[start, end]` — the raw material the controller summarizer uses to
    /// reconstruct aircraft-interaction proximity over a session window,
    /// since the live tables only hold the latest position per identity
    /// triad (spec.md §4.7).
    pub async fn in_window(
        &self,
        entity_type: EntityType,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Transceiver>, CoreError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(db::transient)?;
            transceivers::table
                .filter(transceivers::entity_type.eq(entity_type.as_str()))
                .filter(transceivers::sampled_at.ge(start))
                .filter(transceivers::sampled_at.le(end))
                .load::<NewTransceiverModel>(&mut conn)
                .map(|rows| rows.into_iter().map(Transceiver::from).collect())
                .map_err(CoreError::from_diesel)
        })
        .await
        .map_err(db::transient)?
    }
}
