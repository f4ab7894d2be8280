//! End-to-end controller-session equivalent of `flight_session_test.rs`:
//! a controller comes online, handles one aircraft passing nearby, goes
//! offline, and is detected, summarized, and archived.
mod common;

use chrono::Duration;
use common::TestDatabase;
use diesel::prelude::*;
use vatsim_state::controllers::{Controller, ControllerStatus};
use vatsim_state::controllers_repo::ControllersRepository;
use vatsim_state::schema::controller_summaries;
use vatsim_state::session::detector::SessionDetector;
use vatsim_state::session::reconnect::ReconnectionMerger;
use vatsim_state::summarizer::ControllerSummarizer;
use vatsim_state::transceivers::{EntityType, Transceiver};
use vatsim_state::transceivers_repo::TransceiversRepository;
use vatsim_state::archiver::Archiver;

fn controller_at(t: chrono::DateTime<chrono::Utc>, logon: chrono::DateTime<chrono::Utc>) -> Controller {
    Controller {
        callsign: "SY_TWR".into(),
        cid: 2002,
        logon_time: logon,
        name: Some("Test Controller".into()),
        facility: Some(4),
        rating: Some(5),
        frequency: Some("120.500".into()),
        visual_range: Some(50),
        text_atis: None,
        status: ControllerStatus::Online,
        last_updated: t,
        last_seen: t,
    }
}

fn transceiver(
    callsign: &str,
    entity_type: EntityType,
    lat: f64,
    lon: f64,
    at: chrono::DateTime<chrono::Utc>,
) -> Transceiver {
    Transceiver {
        callsign: callsign.into(),
        transceiver_id: 0,
        entity_type,
        frequency_hz: Some(120_500_000),
        lat_deg: Some(lat),
        lon_deg: Some(lon),
        height_msl_m: None,
        height_agl_m: None,
        sampled_at: at,
    }
}

#[tokio::test]
async fn test_controller_session_detected_summarized_and_archived() {
    let test_db = TestDatabase::new().await.expect("failed to create test database");
    let pool = test_db.pool();

    let logon = chrono::Utc::now() - Duration::hours(2);
    let t0 = logon + Duration::hours(1);

    let controllers_repo = ControllersRepository::new(pool.clone());
    controllers_repo
        .upsert_batch(vec![
            controller_at(t0, logon),
            controller_at(t0 + Duration::seconds(30), logon),
        ])
        .await
        .expect("upsert controller ticks");

    let transceivers_repo = TransceiversRepository::new(pool.clone());
    transceivers_repo
        .insert_batch(vec![
            transceiver("SY_TWR", EntityType::Atc, -33.9, 151.2, t0),
            transceiver("QFA1", EntityType::Pilot, -33.91, 151.21, t0),
        ])
        .await
        .expect("insert transceiver samples");

    let detector = SessionDetector::new(pool.clone());
    let cutoff = t0 + Duration::minutes(5);
    let candidates = detector
        .controller_candidates(cutoff)
        .await
        .expect("scan controller candidates");
    assert_eq!(candidates.len(), 1);
    let candidate = candidates.into_iter().next().unwrap();
    assert_eq!(candidate.callsign, "SY_TWR");

    let merger = ReconnectionMerger::new(pool.clone());
    let merged = merger
        .merge_controller_candidate(candidate, std::time::Duration::from_secs(300))
        .await
        .expect("merge candidate");
    assert_eq!(merged.merged_logon_times, vec![logon]);

    let summarizer = ControllerSummarizer::new(
        controllers_repo.clone(),
        transceivers_repo.clone(),
        pool.clone(),
        30.0,
    );
    summarizer.summarize(&merged).await.expect("summarize session");

    let pool_for_query = pool.clone();
    let (callsign, total_aircraft_handled): (String, i32) = tokio::task::spawn_blocking(move || {
        let mut conn = pool_for_query.get().expect("checkout connection");
        controller_summaries::table
            .select((
                controller_summaries::callsign,
                controller_summaries::total_aircraft_handled,
            ))
            .first(&mut conn)
            .expect("load summary row")
    })
    .await
    .expect("blocking task");
    assert_eq!(callsign, "SY_TWR");
    assert_eq!(total_aircraft_handled, 1);

    let archiver = Archiver::new(pool.clone());
    let report = archiver
        .archive_controller_session(&merged)
        .await
        .expect("archive session");
    assert_eq!(report.records_archived, 2);
    assert_eq!(report.records_deleted, 2);

    let remaining = controllers_repo.list_all().await.expect("list live controllers");
    assert!(remaining.is_empty(), "live rows must be gone after archive (I-2)");

    let retry = archiver
        .archive_controller_session(&merged)
        .await
        .expect("archive session retry");
    assert_eq!(retry.records_archived, 0, "idempotent retry archives nothing new");
}
