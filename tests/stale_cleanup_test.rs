//! End-to-end scenario 5 from spec.md §8: an aircraft enters a sector, goes
//! silent, and the cleanup job closes its open interval at the timeout
//! boundary using its last known position. Also exercises I-S1/I-S2 across
//! a real `flight_sector_occupancy` table.
mod common;

use chrono::Duration;
use common::TestDatabase;
use diesel::prelude::*;
use vatsim_state::schema::flight_sector_occupancy;
use vatsim_state::sector::engine::{LastPosition, NewInterval};
use vatsim_state::sector::repo::SectorRepository;

#[tokio::test]
async fn test_stale_aircraft_interval_closed_at_timeout_with_last_position() {
    let test_db = TestDatabase::new().await.expect("failed to create test database");
    let pool = test_db.pool();
    let repo = SectorRepository::new(pool.clone());

    let entry_time = chrono::Utc::now() - Duration::minutes(30);
    repo.open_interval(
        "QFA2".into(),
        NewInterval {
            sector_name: "BRISBANE".into(),
            entry_timestamp: entry_time,
            entry_lat: -27.4,
            entry_lon: 153.0,
            entry_altitude: Some(28000),
        },
    )
    .await
    .expect("open interval");

    let last = LastPosition {
        lat: -27.5,
        lon: 153.1,
        altitude: Some(27500),
    };
    repo.update_last_position("QFA2".into(), last)
        .await
        .expect("update last position from final sample");

    let open_before = repo.open_intervals().await.expect("list open intervals");
    assert_eq!(open_before.len(), 1);
    assert!(open_before[0].exit_timestamp.is_none());

    let timeout_at = entry_time + Duration::minutes(32);
    let closed = repo
        .close_open_intervals("QFA2".into(), timeout_at, Some(last))
        .await
        .expect("close stale interval");
    assert_eq!(closed, 1);

    let open_after = repo.open_intervals().await.expect("list open intervals");
    assert!(open_after.is_empty(), "I-S1: no open interval should remain");
}

#[tokio::test]
async fn test_closed_interval_duration_matches_entry_exit_gap() {
    // I-S2: exit_timestamp >= entry_timestamp and duration_seconds equals
    // their difference in seconds.
    let test_db = TestDatabase::new().await.expect("failed to create test database");
    let pool = test_db.pool();
    let repo = SectorRepository::new(pool.clone());

    let entry_time = chrono::Utc::now() - Duration::minutes(10);
    repo.open_interval(
        "QFA3".into(),
        NewInterval {
            sector_name: "SYDNEY".into(),
            entry_timestamp: entry_time,
            entry_lat: -33.9,
            entry_lon: 151.2,
            entry_altitude: Some(10000),
        },
    )
    .await
    .expect("open interval");

    let exit_time = entry_time + Duration::minutes(10);
    repo.close_open_intervals("QFA3".into(), exit_time, None)
        .await
        .expect("close interval");

    let open = repo.open_intervals().await.expect("list open intervals");
    assert!(open.is_empty());

    let pool = pool.clone();
    let duration: i64 = tokio::task::spawn_blocking(move || {
        let mut conn = pool.get().expect("checkout connection");
        flight_sector_occupancy::table
            .filter(flight_sector_occupancy::callsign.eq("QFA3"))
            .select(flight_sector_occupancy::duration_seconds)
            .first::<Option<i64>>(&mut conn)
            .expect("load closed row")
            .expect("duration_seconds populated on close")
    })
    .await
    .expect("blocking task");

    assert_eq!(duration, 600);
}
