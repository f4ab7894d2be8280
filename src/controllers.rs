//! The live `controllers` table: one row per `(callsign, cid, logon_time)`
//! identity triad (spec.md §3, "Controller (live, latest-wins)").

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Whether a controller is actively staffed online or has fallen off the
/// snapshot without yet being marked complete by the session detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControllerStatus {
    Online,
    Offline,
}

impl ControllerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControllerStatus::Online => "online",
            ControllerStatus::Offline => "offline",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "offline" => ControllerStatus::Offline,
            _ => ControllerStatus::Online,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Controller {
    pub callsign: String,
    pub cid: i32,
    pub logon_time: DateTime<Utc>,

    pub name: Option<String>,
    pub facility: Option<i32>,
    pub rating: Option<i32>,
    pub frequency: Option<String>,
    pub visual_range: Option<i32>,
    pub text_atis: Option<String>,
    pub status: ControllerStatus,

    pub last_updated: DateTime<Utc>,
    /// Last tick at which this controller appeared in an upstream snapshot.
    /// Distinct from `last_updated`: a row can be re-upserted with identical
    /// data (refreshing `last_updated`) even on a tick where nothing about
    /// the controller changed, so `last_seen` is what the timeout/cleanup
    /// scan actually keys off.
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::controllers)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ControllerModel {
    pub id: Uuid,
    pub callsign: String,
    pub cid: i32,
    pub logon_time: DateTime<Utc>,
    pub name: Option<String>,
    pub facility: Option<i32>,
    pub rating: Option<i32>,
    pub frequency: Option<String>,
    pub visual_range: Option<i32>,
    pub text_atis: Option<String>,
    pub status: String,
    pub last_updated: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl ControllerModel {
    pub fn from_controller(controller: &Controller) -> Self {
        Self {
            id: Uuid::now_v7(),
            callsign: controller.callsign.clone(),
            cid: controller.cid,
            logon_time: controller.logon_time,
            name: controller.name.clone(),
            facility: controller.facility,
            rating: controller.rating,
            frequency: controller.frequency.clone(),
            visual_range: controller.visual_range,
            text_atis: controller.text_atis.clone(),
            status: controller.status.as_str().to_string(),
            last_updated: controller.last_updated,
            last_seen: controller.last_seen,
        }
    }
}

impl From<&crate::upstream::snapshot::ControllerSample> for Controller {
    /// Turn a freshly-fetched controller sample into the row shape the
    /// batch writer upserts: every sample that reaches this conversion was
    /// just observed, so `status` is `Online` and `last_seen` is the
    /// sample's own timestamp.
    fn from(sample: &crate::upstream::snapshot::ControllerSample) -> Self {
        Self {
            callsign: sample.callsign.clone(),
            cid: sample.cid,
            logon_time: sample.logon_time,
            name: sample.name.clone(),
            facility: sample.facility,
            rating: sample.rating,
            frequency: sample.frequency.clone(),
            visual_range: sample.visual_range,
            text_atis: sample.text_atis.clone(),
            status: ControllerStatus::Online,
            last_updated: sample.last_updated,
            last_seen: sample.last_updated,
        }
    }
}

impl From<ControllerModel> for Controller {
    fn from(m: ControllerModel) -> Self {
        Self {
            callsign: m.callsign,
            cid: m.cid,
            logon_time: m.logon_time,
            name: m.name,
            facility: m.facility,
            rating: m.rating,
            frequency: m.frequency,
            visual_range: m.visual_range,
            text_atis: m.text_atis,
            status: ControllerStatus::from_str(&m.status),
            last_updated: m.last_updated,
            last_seen: m.last_seen,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_controller() -> Controller {
        let now = Utc::now();
        Controller {
            callsign: "SY_TWR".into(),
            cid: 2002,
            logon_time: now,
            name: Some("Test Controller".into()),
            facility: Some(4),
            rating: Some(5),
            frequency: Some("120.500".into()),
            visual_range: Some(50),
            text_atis: None,
            status: ControllerStatus::Online,
            last_updated: now,
            last_seen: now,
        }
    }

    #[test]
    fn test_status_round_trips_through_str() {
        assert_eq!(
            ControllerStatus::from_str(ControllerStatus::Online.as_str()),
            ControllerStatus::Online
        );
        assert_eq!(
            ControllerStatus::from_str(ControllerStatus::Offline.as_str()),
            ControllerStatus::Offline
        );
        assert_eq!(ControllerStatus::from_str("garbage"), ControllerStatus::Online);
    }

    #[test]
    fn test_model_roundtrip_preserves_fields() {
        let controller = sample_controller();
        let model = ControllerModel::from_controller(&controller);
        let back: Controller = model.into();
        assert_eq!(back, controller);
    }
}
