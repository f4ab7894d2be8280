//! End-to-end scenarios 2 and 3 from spec.md §8: reconnection merge and
//! non-merge, driven off the literal gap values the spec gives.
mod common;

use chrono::Duration;
use common::TestDatabase;
use vatsim_state::flights::Flight;
use vatsim_state::flights_repo::FlightsRepository;
use vatsim_state::session::detector::SessionDetector;
use vatsim_state::session::reconnect::ReconnectionMerger;

fn sample(callsign: &str, cid: i32, logon: chrono::DateTime<chrono::Utc>, t: chrono::DateTime<chrono::Utc>) -> Flight {
    Flight {
        callsign: callsign.into(),
        cid,
        logon_time: logon,
        name: None,
        latitude: Some(-33.9),
        longitude: Some(151.2),
        altitude: Some(35000),
        groundspeed: Some(420),
        heading: None,
        transponder: None,
        departure: None,
        arrival: None,
        route: None,
        flight_rules: None,
        aircraft_type: None,
        aircraft_faa: None,
        aircraft_short: None,
        planned_altitude: None,
        deptime: None,
        enroute_time: None,
        fuel_time: None,
        remarks: None,
        last_updated: t,
    }
}

#[tokio::test]
async fn test_reconnection_within_threshold_merges_into_one_summary() {
    let test_db = TestDatabase::new().await.expect("failed to create test database");
    let pool = test_db.pool();

    let t = chrono::Utc::now() - Duration::hours(2);
    let first_logon = t;
    let second_logon = t + Duration::minutes(42);

    let flights_repo = FlightsRepository::new(pool.clone());
    flights_repo
        .upsert_batch(vec![
            sample("BAW15", 2002, first_logon, t + Duration::minutes(40)),
            sample("BAW15", 2002, second_logon, t + Duration::minutes(60)),
        ])
        .await
        .expect("upsert ticks");

    let detector = SessionDetector::new(pool.clone());
    let cutoff = t + Duration::minutes(65);
    let candidates = detector.flight_candidates(cutoff).await.expect("scan candidates");
    assert_eq!(candidates.len(), 2, "both raw sessions are independently stale");

    let merger = ReconnectionMerger::new(pool.clone());
    let base = candidates
        .into_iter()
        .find(|c| c.logon_time == first_logon)
        .expect("base candidate present");

    let merged = merger
        .merge_flight_candidate(base, std::time::Duration::from_secs(5 * 60))
        .await
        .expect("merge candidate");

    assert_eq!(merged.merged_logon_times.len(), 2);
    assert_eq!(merged.session_start_time, first_logon);
    assert_eq!(merged.session_end_time, t + Duration::minutes(60));
}

#[tokio::test]
async fn test_reconnection_outside_threshold_does_not_merge() {
    let test_db = TestDatabase::new().await.expect("failed to create test database");
    let pool = test_db.pool();

    let t = chrono::Utc::now() - Duration::hours(2);
    let first_logon = t;
    let second_logon = t + Duration::minutes(48);

    let flights_repo = FlightsRepository::new(pool.clone());
    flights_repo
        .upsert_batch(vec![
            sample("BAW15", 2002, first_logon, t + Duration::minutes(40)),
            sample("BAW15", 2002, second_logon, t + Duration::minutes(60)),
        ])
        .await
        .expect("upsert ticks");

    let detector = SessionDetector::new(pool.clone());
    let merger = ReconnectionMerger::new(pool.clone());
    let cutoff = t + Duration::minutes(65);
    let candidates = detector.flight_candidates(cutoff).await.expect("scan candidates");
    assert_eq!(candidates.len(), 2);

    let base = candidates
        .into_iter()
        .find(|c| c.logon_time == first_logon)
        .expect("base candidate present");

    // The sibling's gap from session_end (T+40m) to its logon (T+48m) is 8
    // minutes, outside the 5-minute threshold, so no fold happens.
    let merged = merger
        .merge_flight_candidate(base, std::time::Duration::from_secs(5 * 60))
        .await
        .expect("merge candidate");

    assert_eq!(merged.merged_logon_times, vec![first_logon]);
    assert_eq!(merged.session_end_time, t + Duration::minutes(40));
}
