//! The live `flights` table: one row per `(callsign, cid, logon_time)`
//! identity triad, overwritten in place by every subsequent sample
//! (spec.md §3, "Flight (live, latest-wins)").

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Domain-level flight record. Mirrors the upstream pilot sample's fields
/// plus the bookkeeping the pipeline adds (`last_updated`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flight {
    pub callsign: String,
    /// VATSIM CID. Upstream samples without a CID are coerced to `0`
    /// ("anonymous") at normalization time so the identity triad stays a
    /// clean primary key — see `src/config.rs`'s module doc and
    /// DESIGN.md's Open Question resolution.
    pub cid: i32,
    pub logon_time: DateTime<Utc>,

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

    pub last_updated: DateTime<Utc>,
}

impl Flight {
    /// Identity triad used throughout the pipeline for latest-wins keying,
    /// completion detection, and summary/archive dedup.
    pub fn identity(&self) -> (String, i32, DateTime<Utc>) {
        (self.callsign.clone(), self.cid, self.logon_time)
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::flights)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct FlightModel {
    pub id: Uuid,
    pub callsign: String,
    pub cid: i32,
    pub logon_time: DateTime<Utc>,
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
    pub last_updated: DateTime<Utc>,
}

impl FlightModel {
    /// Build an insertable row from a fresh domain `Flight`, generating a
    /// new surrogate id. Used by the batch writer's upsert.
    pub fn from_flight(flight: &Flight) -> Self {
        Self {
            id: Uuid::now_v7(),
            callsign: flight.callsign.clone(),
            cid: flight.cid,
            logon_time: flight.logon_time,
            name: flight.name.clone(),
            latitude: flight.latitude,
            longitude: flight.longitude,
            altitude: flight.altitude,
            groundspeed: flight.groundspeed,
            heading: flight.heading,
            transponder: flight.transponder.clone(),
            departure: flight.departure.clone(),
            arrival: flight.arrival.clone(),
            route: flight.route.clone(),
            flight_rules: flight.flight_rules.clone(),
            aircraft_type: flight.aircraft_type.clone(),
            aircraft_faa: flight.aircraft_faa.clone(),
            aircraft_short: flight.aircraft_short.clone(),
            planned_altitude: flight.planned_altitude.clone(),
            deptime: flight.deptime.clone(),
            enroute_time: flight.enroute_time.clone(),
            fuel_time: flight.fuel_time.clone(),
            remarks: flight.remarks.clone(),
            last_updated: flight.last_updated,
        }
    }
}

impl From<&crate::upstream::snapshot::PilotSample> for Flight {
    /// Turn a freshly-fetched pilot sample into the row shape the batch
    /// writer upserts. `last_updated` is set to the sample's reported time
    /// per spec.md §4.4.
    fn from(sample: &crate::upstream::snapshot::PilotSample) -> Self {
        Self {
            callsign: sample.callsign.clone(),
            cid: sample.cid,
            logon_time: sample.logon_time,
            name: sample.name.clone(),
            latitude: sample.latitude,
            longitude: sample.longitude,
            altitude: sample.altitude,
            groundspeed: sample.groundspeed,
            heading: sample.heading,
            transponder: sample.transponder.clone(),
            departure: sample.departure.clone(),
            arrival: sample.arrival.clone(),
            route: sample.route.clone(),
            flight_rules: sample.flight_rules.clone(),
            aircraft_type: sample.aircraft_type.clone(),
            aircraft_faa: sample.aircraft_faa.clone(),
            aircraft_short: sample.aircraft_short.clone(),
            planned_altitude: sample.planned_altitude.clone(),
            deptime: sample.deptime.clone(),
            enroute_time: sample.enroute_time.clone(),
            fuel_time: sample.fuel_time.clone(),
            remarks: sample.remarks.clone(),
            last_updated: sample.last_updated,
        }
    }
}

impl From<FlightModel> for Flight {
    fn from(m: FlightModel) -> Self {
        Self {
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
