//! Wire types for the upstream JSON feeds, and the normalized ephemeral
//! sample types the rest of the pipeline works with (spec.md §3's "Sample
//! (ephemeral)" and §9's instruction to replace the source's
//! dictionary-of-dictionaries with typed records).

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Raw shape of the status-snapshot endpoint: `{ controllers: [...], pilots:
/// [...], general: {...} }`. Deserialized directly from the upstream
/// response before normalization.
#[derive(Debug, Clone, Deserialize)]
pub struct RawSnapshot {
    #[serde(default)]
    pub pilots: Vec<RawPilot>,
    #[serde(default)]
    pub controllers: Vec<RawController>,
    #[serde(default)]
    pub general: RawGeneral,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawGeneral {
    #[serde(default)]
    pub update_timestamp: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawPilot {
    pub cid: serde_json::Value,
    #[serde(default)]
    pub name: Option<String>,
    pub callsign: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub altitude: Option<i32>,
    #[serde(default)]
    pub groundspeed: Option<i32>,
    #[serde(default)]
    pub heading: Option<i32>,
    #[serde(default)]
    pub transponder: Option<String>,
    #[serde(default)]
    pub flight_plan: Option<RawFlightPlan>,
    pub logon_time: String,
    pub last_updated: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawFlightPlan {
    #[serde(default)]
    pub flight_rules: Option<String>,
    #[serde(default)]
    pub aircraft: Option<String>,
    #[serde(default)]
    pub aircraft_faa: Option<String>,
    #[serde(default)]
    pub aircraft_short: Option<String>,
    #[serde(default)]
    pub departure: Option<String>,
    #[serde(default)]
    pub arrival: Option<String>,
    #[serde(default)]
    pub route: Option<String>,
    #[serde(default)]
    pub altitude: Option<String>,
    #[serde(default)]
    pub deptime: Option<String>,
    #[serde(default)]
    pub enroute_time: Option<String>,
    #[serde(default)]
    pub fuel_time: Option<String>,
    #[serde(default)]
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawController {
    pub cid: serde_json::Value,
    #[serde(default)]
    pub name: Option<String>,
    pub callsign: String,
    #[serde(default)]
    pub frequency: Option<String>,
    #[serde(default)]
    pub facility: Option<i32>,
    pub rating: serde_json::Value,
    #[serde(default)]
    pub visual_range: Option<i32>,
    #[serde(default)]
    pub text_atis: Option<Vec<String>>,
    pub logon_time: String,
    pub last_updated: String,
}

/// Raw shape of the transceivers endpoint:
/// `[{ callsign, transceivers: [{id, frequency, latDeg, lonDeg, ...}] }]`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTransceiverGroup {
    pub callsign: String,
    #[serde(default)]
    pub transceivers: Vec<RawTransceiver>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawTransceiver {
    pub id: i32,
    #[serde(default)]
    pub frequency: Option<i64>,
    #[serde(rename = "latDeg", default)]
    pub lat_deg: Option<f64>,
    #[serde(rename = "lonDeg", default)]
    pub lon_deg: Option<f64>,
    #[serde(rename = "heightMslM", default)]
    pub height_msl_m: Option<f64>,
    #[serde(rename = "heightAglM", default)]
    pub height_agl_m: Option<f64>,
}

/// Normalized pilot sample: numeric coercion done, timestamps parsed,
/// flight-plan fields flattened. This is what flows through the filter
/// chain and into the buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct PilotSample {
    pub callsign: String,
    pub cid: i32,
    pub name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<i32>,
    pub groundspeed: Option<i32>,
    pub heading: Option<i32>,
    pub transponder: Option<String>,
    pub departure: Option<String>,
    pub arrival: Option<String>,
    pub route: Option<String>,
    pub flight_rules: Option<String>,
    pub aircraft_type: Option<String>,
    pub aircraft_faa: Option<String>,
    pub aircraft_short: Option<String>,
    pub planned_altitude: Option<String>,
    pub deptime: Option<String>,
    pub enroute_time: Option<String>,
    pub fuel_time: Option<String>,
    pub remarks: Option<String>,
    pub logon_time: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl PilotSample {
    pub fn identity(&self) -> (String, i32, DateTime<Utc>) {
        (self.callsign.clone(), self.cid, self.logon_time)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControllerSample {
    pub callsign: String,
    pub cid: i32,
    pub name: Option<String>,
    pub facility: Option<i32>,
    pub rating: Option<i32>,
    pub frequency: Option<String>,
    pub visual_range: Option<i32>,
    pub text_atis: Option<String>,
    pub logon_time: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl ControllerSample {
    pub fn identity(&self) -> (String, i32, DateTime<Utc>) {
        (self.callsign.clone(), self.cid, self.logon_time)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleEntityType {
    Pilot,
    Atc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransceiverSample {
    pub callsign: String,
    pub transceiver_id: i32,
    pub entity_type: SampleEntityType,
    pub frequency_hz: Option<i64>,
    pub lat_deg: Option<f64>,
    pub lon_deg: Option<f64>,
    pub height_msl_m: Option<f64>,
    pub height_agl_m: Option<f64>,
    pub sampled_at: DateTime<Utc>,
}

/// One poll cycle's normalized payload.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub pilots: Vec<PilotSample>,
    pub controllers: Vec<ControllerSample>,
    pub transceivers: Vec<TransceiverSample>,
    pub server_timestamp: Option<DateTime<Utc>>,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.pilots.is_empty() && self.controllers.is_empty() && self.transceivers.is_empty()
    }
}
