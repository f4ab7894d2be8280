//! The append-only `transceivers` table: every sample is inserted as a new
//! row, never upserted (spec.md §3, "Transceiver (append-only)").

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityType {
    Pilot,
    Atc,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Pilot => "pilot",
            EntityType::Atc => "atc",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "atc" => EntityType::Atc,
            _ => EntityType::Pilot,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transceiver {
    pub callsign: String,
    pub transceiver_id: i32,
    pub entity_type: EntityType,
    pub frequency_hz: Option<i64>,
    pub lat_deg: Option<f64>,
    pub lon_deg: Option<f64>,
    pub height_msl_m: Option<f64>,
    pub height_agl_m: Option<f64>,
    pub sampled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::transceivers)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewTransceiverModel {
    pub id: Uuid,
    pub callsign: String,
    pub transceiver_id: i32,
    pub entity_type: String,
    pub frequency_hz: Option<i64>,
    pub lat_deg: Option<f64>,
    pub lon_deg: Option<f64>,
    pub height_msl_m: Option<f64>,
    pub height_agl_m: Option<f64>,
    pub sampled_at: DateTime<Utc>,
}

impl From<&crate::upstream::snapshot::TransceiverSample> for Transceiver {
    fn from(sample: &crate::upstream::snapshot::TransceiverSample) -> Self {
        let entity_type = match sample.entity_type {
            crate::upstream::snapshot::SampleEntityType::Pilot => EntityType::Pilot,
            crate::upstream::snapshot::SampleEntityType::Atc => EntityType::Atc,
        };
        Self {
            callsign: sample.callsign.clone(),
            transceiver_id: sample.transceiver_id,
            entity_type,
            frequency_hz: sample.frequency_hz,
            lat_deg: sample.lat_deg,
            lon_deg: sample.lon_deg,
            height_msl_m: sample.height_msl_m,
            height_agl_m: sample.height_agl_m,
            sampled_at: sample.sampled_at,
        }
    }
}

impl From<NewTransceiverModel> for Transceiver {
    fn from(m: NewTransceiverModel) -> Self {
        Self {
            callsign: m.callsign,
            transceiver_id: m.transceiver_id,
            entity_type: EntityType::from_str(&m.entity_type),
            frequency_hz: m.frequency_hz,
            lat_deg: m.lat_deg,
            lon_deg: m.lon_deg,
            height_msl_m: m.height_msl_m,
            height_agl_m: m.height_agl_m,
            sampled_at: m.sampled_at,
        }
    }
}

impl NewTransceiverModel {
    pub fn from_transceiver(t: &Transceiver) -> Self {
        Self {
            id: Uuid::now_v7(),
            callsign: t.callsign.clone(),
            transceiver_id: t.transceiver_id,
            entity_type: t.entity_type.as_str().to_string(),
            frequency_hz: t.frequency_hz,
            lat_deg: t.lat_deg,
            lon_deg: t.lon_deg,
            height_msl_m: t.height_msl_m,
            height_agl_m: t.height_agl_m,
            sampled_at: t.sampled_at,
        }
    }
}
