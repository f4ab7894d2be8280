//! Reconnection merge: a first-class windowed-merge operator, tested in
//! isolation per spec.md §9 ("Treat the reconnection-merge rule as a
//! first-class windowed-merge operator").
//!
//! The gap is measured from the running session's *last activity*
//! (`session_end`), not the original `logon_time` — spec.md §4.6 calls
//! this out as a regression-guarded contract, since an earlier
//! implementation family measured from `logon_time` and silently dropped
//! legitimate later reconnects.

use std::time::Duration;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sql_types::{Int4, Timestamptz, Varchar};

use crate::db::{self, PgPool};
use crate::error::CoreError;
use crate::session::detector::CompletionCandidate;

/// One other raw-row group sharing the candidate's `(callsign, cid)` but a
/// different `logon_time` — a candidate follow-on session.
#[derive(Debug, Clone, PartialEq, QueryableByName)]
pub struct SiblingSession {
    #[diesel(sql_type = Timestamptz)]
    pub logon_time: DateTime<Utc>,
    #[diesel(sql_type = Timestamptz)]
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergedSession {
    pub callsign: String,
    pub cid: i32,
    /// The earliest `logon_time` folded into this session — this becomes
    /// the summary's `session_start_time` and survives even though later
    /// merges may have later `logon_time`s.
    pub session_start_time: DateTime<Utc>,
    pub session_end_time: DateTime<Utc>,
    /// Every `logon_time` folded into this session, including the base
    /// candidate's own. Used by the summarizer and archiver to select all
    /// contributing raw rows.
    pub merged_logon_times: Vec<DateTime<Utc>>,
}

/// Pure windowed-merge: fold in every sibling whose `logon_time` falls in
/// `(session_end, session_end + threshold]`, re-measuring the window from
/// the new `session_end` after each fold, until no further sibling
/// qualifies.
pub fn merge_candidate(
    base: &CompletionCandidate,
    siblings: &[SiblingSession],
    threshold: Duration,
) -> MergedSession {
    let mut session_end = base.session_end;
    let mut session_start = base.logon_time;
    let mut merged_logon_times = vec![base.logon_time];
    let mut remaining: Vec<&SiblingSession> = siblings.iter().collect();

    loop {
        let window_end = session_end + chrono::Duration::from_std(threshold).unwrap_or_default();
        let mut folded_any = false;
        let mut still_remaining = Vec::new();

        for sibling in remaining {
            if sibling.logon_time > session_end && sibling.logon_time <= window_end {
                merged_logon_times.push(sibling.logon_time);
                session_start = session_start.min(sibling.logon_time);
                session_end = session_end.max(sibling.last_updated);
                folded_any = true;
            } else {
                still_remaining.push(sibling);
            }
        }

        remaining = still_remaining;
        if !folded_any {
            break;
        }
    }

    MergedSession {
        callsign: base.callsign.clone(),
        cid: base.cid,
        session_start_time: session_start,
        session_end_time: session_end,
        merged_logon_times,
    }
}

#[derive(Clone)]
pub struct ReconnectionMerger {
    pool: PgPool,
}

const FLIGHT_SIBLINGS_SQL: &str = r#"
    SELECT logon_time, MAX(last_updated) AS last_updated
    FROM flights
    WHERE callsign = $1 AND cid = $2 AND logon_time <> $3
    GROUP BY logon_time
"#;

const CONTROLLER_SIBLINGS_SQL: &str = r#"
    SELECT logon_time, MAX(last_updated) AS last_updated
    FROM controllers
    WHERE callsign = $1 AND cid = $2 AND logon_time <> $3
    GROUP BY logon_time
"#;

impl ReconnectionMerger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn merge_flight_candidate(
        &self,
        candidate: CompletionCandidate,
        threshold: Duration,
    ) -> Result<MergedSession, CoreError> {
        let siblings = self.load_siblings(FLIGHT_SIBLINGS_SQL, &candidate).await?;
        Ok(merge_candidate(&candidate, &siblings, threshold))
    }

    pub async fn merge_controller_candidate(
        &self,
        candidate: CompletionCandidate,
        threshold: Duration,
    ) -> Result<MergedSession, CoreError> {
        let siblings = self
            .load_siblings(CONTROLLER_SIBLINGS_SQL, &candidate)
            .await?;
        Ok(merge_candidate(&candidate, &siblings, threshold))
    }

    async fn load_siblings(
        &self,
        sql: &'static str,
        candidate: &CompletionCandidate,
    ) -> Result<Vec<SiblingSession>, CoreError> {
        let pool = self.pool.clone();
        let callsign = candidate.callsign.clone();
        let cid = candidate.cid;
        let logon_time = candidate.logon_time;
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(db::transient)?;
            diesel::sql_query(sql)
                .bind::<Varchar, _>(callsign)
                .bind::<Int4, _>(cid)
                .bind::<Timestamptz, _>(logon_time)
                .load(&mut conn)
                .map_err(CoreError::from_diesel)
        })
        .await
        .map_err(db::transient)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(callsign: &str, cid: i32, logon: DateTime<Utc>, end: DateTime<Utc>) -> CompletionCandidate {
        CompletionCandidate {
            callsign: callsign.into(),
            cid,
            logon_time: logon,
            session_end: end,
        }
    }

    fn sibling(logon: DateTime<Utc>, last_updated: DateTime<Utc>) -> SiblingSession {
        SiblingSession {
            logon_time: logon,
            last_updated,
        }
    }

    #[test]
    fn test_merge_within_threshold_folds_in_one_summary() {
        // Scenario 2 from spec.md §8: logon T, last_updated T+40m; sibling
        // logon T+42m, last_updated T+60m; threshold 5 min.
        let t = Utc::now();
        let base = candidate("BAW15", 2002, t, t + chrono::Duration::minutes(40));
        let siblings = vec![sibling(
            t + chrono::Duration::minutes(42),
            t + chrono::Duration::minutes(60),
        )];
        let merged = merge_candidate(&base, &siblings, Duration::from_secs(5 * 60));

        assert_eq!(merged.session_start_time, t);
        assert_eq!(merged.session_end_time, t + chrono::Duration::minutes(60));
        assert_eq!(merged.merged_logon_times.len(), 2);
    }

    #[test]
    fn test_gap_beyond_threshold_does_not_merge() {
        // Scenario 3: sibling logon T+48m is 8 minutes after T+40m, beyond
        // the 5-minute threshold.
        let t = Utc::now();
        let base = candidate("BAW15", 2002, t, t + chrono::Duration::minutes(40));
        let siblings = vec![sibling(
            t + chrono::Duration::minutes(48),
            t + chrono::Duration::minutes(70),
        )];
        let merged = merge_candidate(&base, &siblings, Duration::from_secs(5 * 60));

        assert_eq!(merged.session_end_time, t + chrono::Duration::minutes(40));
        assert_eq!(merged.merged_logon_times.len(), 1);
    }

    #[test]
    fn test_gap_measured_from_session_end_not_original_logon() {
        // Regression guard: a second sibling's gap must be measured from
        // the session_end *after* the first merge, not from the original
        // logon_time. First sibling extends session_end to T+65m; a
        // second sibling at T+67m (2 min after the new session_end, but
        // 67 min after original logon_time) must still merge.
        let t = Utc::now();
        let base = candidate("QFA1", 1001, t, t + chrono::Duration::minutes(60));
        let siblings = vec![
            sibling(t + chrono::Duration::minutes(62), t + chrono::Duration::minutes(65)),
            sibling(t + chrono::Duration::minutes(67), t + chrono::Duration::minutes(90)),
        ];
        let merged = merge_candidate(&base, &siblings, Duration::from_secs(5 * 60));

        assert_eq!(merged.session_end_time, t + chrono::Duration::minutes(90));
        assert_eq!(merged.merged_logon_times.len(), 3);
    }

    #[test]
    fn test_no_siblings_is_a_no_op_merge() {
        let t = Utc::now();
        let base = candidate("QFA1", 1001, t, t + chrono::Duration::minutes(61));
        let merged = merge_candidate(&base, &[], Duration::from_secs(5 * 60));
        assert_eq!(merged.session_start_time, t);
        assert_eq!(merged.session_end_time, t + chrono::Duration::minutes(61));
        assert_eq!(merged.merged_logon_times, vec![t]);
    }
}
