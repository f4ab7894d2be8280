//! Coercion and flattening from the raw wire shapes into normalized samples
//! (spec.md §4.1, "Normalization").

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::warn;

use super::snapshot::{
    ControllerSample, PilotSample, RawController, RawPilot, RawSnapshot, RawTransceiverGroup,
    SampleEntityType, Snapshot, TransceiverSample,
};

/// Coerce a JSON value that may arrive as either a number or a numeric
/// string into an `i32`. VATSIM's feed has historically sent `cid` and
/// `rating` as both, depending on endpoint and era.
fn coerce_i32(value: &serde_json::Value) -> Option<i32> {
    match value {
        serde_json::Value::Number(n) => n.as_i64().map(|v| v as i32),
        serde_json::Value::String(s) => s.trim().parse::<i32>().ok(),
        _ => None,
    }
}

/// Parse an ISO-8601 timestamp into UTC, tolerating the trailing `Z` and
/// fractional seconds VATSIM's feed uses.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

pub fn normalize_pilot(raw: RawPilot, fallback_now: DateTime<Utc>) -> Option<PilotSample> {
    let cid = coerce_i32(&raw.cid).unwrap_or(0);
    let logon_time = match parse_timestamp(&raw.logon_time) {
        Some(t) => t,
        None => {
            warn!(callsign = %raw.callsign, raw = %raw.logon_time, "dropping pilot with unparseable logon_time");
            return None;
        }
    };
    let last_updated = parse_timestamp(&raw.last_updated).unwrap_or(fallback_now);
    let plan = raw.flight_plan.unwrap_or_default();

    Some(PilotSample {
        callsign: raw.callsign,
        cid,
        name: raw.name,
        latitude: raw.latitude,
        longitude: raw.longitude,
        altitude: raw.altitude,
        groundspeed: raw.groundspeed,
        heading: raw.heading,
        transponder: raw.transponder,
        departure: plan.departure,
        arrival: plan.arrival,
        route: plan.route,
        flight_rules: plan.flight_rules,
        aircraft_type: plan.aircraft,
        aircraft_faa: plan.aircraft_faa,
        aircraft_short: plan.aircraft_short,
        planned_altitude: plan.altitude,
        deptime: plan.deptime,
        enroute_time: plan.enroute_time,
        fuel_time: plan.fuel_time,
        remarks: plan.remarks,
        logon_time,
        last_updated,
    })
}

pub fn normalize_controller(
    raw: RawController,
    fallback_now: DateTime<Utc>,
) -> Option<ControllerSample> {
    let cid = coerce_i32(&raw.cid).unwrap_or(0);
    let rating = coerce_i32(&raw.rating);
    let logon_time = match parse_timestamp(&raw.logon_time) {
        Some(t) => t,
        None => {
            warn!(callsign = %raw.callsign, raw = %raw.logon_time, "dropping controller with unparseable logon_time");
            return None;
        }
    };
    let last_updated = parse_timestamp(&raw.last_updated).unwrap_or(fallback_now);
    let text_atis = raw.text_atis.map(|lines| lines.join(" "));

    Some(ControllerSample {
        callsign: raw.callsign,
        cid,
        name: raw.name,
        facility: raw.facility,
        rating,
        frequency: raw.frequency,
        visual_range: raw.visual_range,
        text_atis,
        logon_time,
        last_updated,
    })
}

/// Flatten the transceivers endpoint's grouped shape into individual
/// samples, tagging each with the `entity_type` found by cross-referencing
/// its callsign against this tick's pilot and controller callsigns (spec.md
/// §4.1: "tag each transceiver with its owning callsign and, once
/// cross-referenced, an `entity_type`").
pub fn normalize_transceivers(
    groups: Vec<RawTransceiverGroup>,
    pilot_callsigns: &HashSet<&str>,
    sampled_at: DateTime<Utc>,
) -> Vec<TransceiverSample> {
    let mut out = Vec::new();
    for group in groups {
        let entity_type = if pilot_callsigns.contains(group.callsign.as_str()) {
            SampleEntityType::Pilot
        } else {
            SampleEntityType::Atc
        };
        for t in group.transceivers {
            out.push(TransceiverSample {
                callsign: group.callsign.clone(),
                transceiver_id: t.id,
                entity_type,
                frequency_hz: t.frequency,
                lat_deg: t.lat_deg,
                lon_deg: t.lon_deg,
                height_msl_m: t.height_msl_m,
                height_agl_m: t.height_agl_m,
                sampled_at,
            });
        }
    }
    out
}

/// Build a fully normalized `Snapshot` from the two raw payloads. Malformed
/// individual records are dropped (and logged) rather than failing the
/// whole tick.
pub fn normalize_snapshot(
    raw: RawSnapshot,
    raw_transceivers: Vec<RawTransceiverGroup>,
    now: DateTime<Utc>,
) -> Snapshot {
    let server_timestamp = raw
        .general
        .update_timestamp
        .as_deref()
        .and_then(parse_timestamp);

    let pilots: Vec<PilotSample> = raw
        .pilots
        .into_iter()
        .filter_map(|p| normalize_pilot(p, now))
        .collect();
    let controllers: Vec<ControllerSample> = raw
        .controllers
        .into_iter()
        .filter_map(|c| normalize_controller(c, now))
        .collect();

    let pilot_callsigns: HashSet<&str> = pilots.iter().map(|p| p.callsign.as_str()).collect();
    let transceivers = normalize_transceivers(raw_transceivers, &pilot_callsigns, now);

    Snapshot {
        pilots,
        controllers,
        transceivers,
        server_timestamp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::snapshot::RawFlightPlan;

    fn raw_pilot(callsign: &str, cid: serde_json::Value) -> RawPilot {
        RawPilot {
            cid,
            name: Some("Test".into()),
            callsign: callsign.into(),
            latitude: Some(-33.9),
            longitude: Some(151.2),
            altitude: Some(10000),
            groundspeed: Some(250),
            heading: Some(90),
            transponder: Some("2000".into()),
            flight_plan: Some(RawFlightPlan {
                departure: Some("YSSY".into()),
                arrival: Some("YMML".into()),
                ..Default::default()
            }),
            logon_time: "2026-01-01T00:00:00Z".into(),
            last_updated: "2026-01-01T00:05:00Z".into(),
        }
    }

    #[test]
    fn test_coerce_cid_from_string_and_number() {
        assert_eq!(coerce_i32(&serde_json::json!(1001)), Some(1001));
        assert_eq!(coerce_i32(&serde_json::json!("1001")), Some(1001));
        assert_eq!(coerce_i32(&serde_json::json!(null)), None);
    }

    #[test]
    fn test_normalize_pilot_flattens_flight_plan() {
        let now = Utc::now();
        let sample = normalize_pilot(raw_pilot("QFA1", serde_json::json!("1001")), now).unwrap();
        assert_eq!(sample.cid, 1001);
        assert_eq!(sample.departure.as_deref(), Some("YSSY"));
        assert_eq!(sample.arrival.as_deref(), Some("YMML"));
    }

    #[test]
    fn test_normalize_pilot_missing_flight_plan_is_tolerated() {
        let now = Utc::now();
        let mut raw = raw_pilot("QFA1", serde_json::json!(1001));
        raw.flight_plan = None;
        let sample = normalize_pilot(raw, now).unwrap();
        assert_eq!(sample.departure, None);
        assert_eq!(sample.route, None);
    }

    #[test]
    fn test_normalize_pilot_unparseable_logon_time_is_dropped() {
        let now = Utc::now();
        let mut raw = raw_pilot("QFA1", serde_json::json!(1001));
        raw.logon_time = "not-a-timestamp".into();
        assert!(normalize_pilot(raw, now).is_none());
    }

    #[test]
    fn test_transceivers_tagged_by_cross_reference() {
        let now = Utc::now();
        let groups = vec![
            RawTransceiverGroup {
                callsign: "QFA1".into(),
                transceivers: vec![super::super::snapshot::RawTransceiver {
                    id: 0,
                    frequency: Some(128_550_000),
                    lat_deg: Some(-33.9),
                    lon_deg: Some(151.2),
                    height_msl_m: Some(10000.0),
                    height_agl_m: None,
                }],
            },
            RawTransceiverGroup {
                callsign: "SY_TWR".into(),
                transceivers: vec![super::super::snapshot::RawTransceiver {
                    id: 0,
                    frequency: Some(120_500_000),
                    lat_deg: None,
                    lon_deg: None,
                    height_msl_m: None,
                    height_agl_m: None,
                }],
            },
        ];
        let pilot_callsigns: HashSet<&str> = ["QFA1"].into_iter().collect();
        let samples = normalize_transceivers(groups, &pilot_callsigns, now);
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].entity_type, SampleEntityType::Pilot);
        assert_eq!(samples[1].entity_type, SampleEntityType::Atc);
    }
}
