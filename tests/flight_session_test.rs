//! End-to-end scenario 1 from spec.md §8: a single clean flight session,
//! completed, summarized, and archived with the literal values the spec
//! gives.
mod common;

use chrono::Duration;
use common::TestDatabase;
use vatsim_state::flights::Flight;
use vatsim_state::flights_repo::FlightsRepository;
use vatsim_state::session::detector::SessionDetector;
use vatsim_state::session::reconnect::ReconnectionMerger;
use vatsim_state::summarizer::FlightSummarizer;
use vatsim_state::archiver::Archiver;

fn sample_at(t: chrono::DateTime<chrono::Utc>, logon: chrono::DateTime<chrono::Utc>, groundspeed: i32) -> Flight {
    Flight {
        callsign: "QFA1".into(),
        cid: 1001,
        logon_time: logon,
        name: Some("Test Pilot".into()),
        latitude: Some(-33.9),
        longitude: Some(151.2),
        altitude: Some(35000),
        groundspeed: Some(groundspeed),
        heading: Some(90),
        transponder: Some("2000".into()),
        departure: Some("YSSY".into()),
        arrival: Some("YMML".into()),
        route: None,
        flight_rules: Some("I".into()),
        aircraft_type: Some("B738".into()),
        aircraft_faa: None,
        aircraft_short: None,
        planned_altitude: Some("350".into()),
        deptime: None,
        enroute_time: None,
        fuel_time: None,
        remarks: None,
        last_updated: t,
    }
}

#[tokio::test]
async fn test_single_flight_clean_session_produces_one_summary() {
    let test_db = TestDatabase::new().await.expect("failed to create test database");
    let pool = test_db.pool();

    let logon = chrono::Utc::now() - Duration::hours(2);
    let t0 = logon + Duration::hours(1);

    let flights_repo = FlightsRepository::new(pool.clone());
    flights_repo
        .upsert_batch(vec![
            sample_at(t0, logon, 420),
            sample_at(t0 + Duration::seconds(30), logon, 420),
            sample_at(t0 + Duration::seconds(60), logon, 420),
        ])
        .await
        .expect("upsert ticks");

    let detector = SessionDetector::new(pool.clone());
    let cutoff = t0 + Duration::minutes(5);
    let candidates = detector
        .flight_candidates(cutoff)
        .await
        .expect("scan candidates");
    assert_eq!(candidates.len(), 1);
    let candidate = candidates.into_iter().next().unwrap();
    assert_eq!(candidate.callsign, "QFA1");
    assert_eq!(candidate.cid, 1001);
    assert_eq!(candidate.logon_time, logon);

    let merger = ReconnectionMerger::new(pool.clone());
    let merged = merger
        .merge_flight_candidate(candidate, std::time::Duration::from_secs(300))
        .await
        .expect("merge candidate");
    assert_eq!(merged.merged_logon_times, vec![logon]);

    let summarizer = FlightSummarizer::new(flights_repo.clone(), pool.clone());
    summarizer.summarize(&merged).await.expect("summarize session");

    let summaries = summarizer.list_summaries().await.expect("list summaries");
    assert_eq!(summaries.len(), 1);
    let summary = &summaries[0];
    assert_eq!(summary.callsign, "QFA1");
    assert_eq!(summary.cid, 1001);
    assert_eq!(summary.session_start_time, logon);
    assert_eq!(summary.session_end_time, t0 + Duration::seconds(60));
    assert_eq!(summary.max_groundspeed, Some(420));

    let archiver = Archiver::new(pool.clone());
    let report = archiver
        .archive_flight_session(&merged)
        .await
        .expect("archive session");
    assert_eq!(report.records_archived, 3);
    assert_eq!(report.records_deleted, 3);

    let live = flights_repo.find_by_callsign("QFA1").await.expect("lookup live row");
    assert!(live.is_none(), "live rows must be gone after archive (I-2)");

    // Idempotent retry: archiving the same merged session again is a no-op.
    let retry = archiver
        .archive_flight_session(&merged)
        .await
        .expect("archive session retry");
    assert_eq!(retry.records_archived, 0);
    assert_eq!(retry.records_deleted, 0);
}
