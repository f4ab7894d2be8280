//! Completion predicate (spec.md §4.6): a session is a completion
//! candidate when its most recent `last_updated` is older than
//! `completion_minutes` and no summary row exists yet for its identity
//! triad.
//!
//! Expressed with `sql_query` rather than the query DSL: the predicate's
//! `GROUP BY … HAVING MAX(...) < … AND NOT EXISTS (...)` shape, with
//! `IS NOT DISTINCT FROM` on `cid` to dedupe through NULL-shaped CIDs, is
//! exactly the shape spec.md §4.6 gives as "illustrative, not
//! prescriptive" — kept close to that literal shape rather than
//! reconstructed through the DSL, and the `NOT IN` on tuples the spec
//! explicitly forbids never appears here. `ORDER BY logon_time ASC` is
//! load-bearing, not cosmetic: the reconnection merger in
//! `session/reconnect.rs` only folds siblings newer than its base, so the
//! earliest candidate in a reconnect chain must always be scanned first.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sql_types::{Int4, Timestamptz, Varchar};

use crate::db::{self, PgPool};
use crate::error::CoreError;

#[derive(Debug, Clone, PartialEq, QueryableByName)]
pub struct CompletionCandidate {
    #[diesel(sql_type = Varchar)]
    pub callsign: String,
    #[diesel(sql_type = Int4)]
    pub cid: i32,
    #[diesel(sql_type = Timestamptz)]
    pub logon_time: DateTime<Utc>,
    #[diesel(sql_type = Timestamptz)]
    pub session_end: DateTime<Utc>,
}

#[derive(Clone)]
pub struct SessionDetector {
    pool: PgPool,
}

const FLIGHT_CANDIDATES_SQL: &str = r#"
    SELECT callsign, cid, logon_time, MAX(last_updated) AS session_end
    FROM flights
    GROUP BY callsign, cid, logon_time
    HAVING MAX(last_updated) < $1
       AND NOT EXISTS (
         SELECT 1 FROM flight_summaries s
         WHERE s.callsign = flights.callsign
           AND s.cid IS NOT DISTINCT FROM flights.cid
           AND s.session_start_time = flights.logon_time
       )
    ORDER BY logon_time ASC
"#;

const CONTROLLER_CANDIDATES_SQL: &str = r#"
    SELECT callsign, cid, logon_time, MAX(last_updated) AS session_end
    FROM controllers
    GROUP BY callsign, cid, logon_time
    HAVING MAX(last_updated) < $1
       AND NOT EXISTS (
         SELECT 1 FROM controller_summaries s
         WHERE s.callsign = controllers.callsign
           AND s.cid IS NOT DISTINCT FROM controllers.cid
           AND s.session_start_time = controllers.logon_time
       )
    ORDER BY logon_time ASC
"#;

impl SessionDetector {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn flight_candidates(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<CompletionCandidate>, CoreError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(db::transient)?;
            diesel::sql_query(FLIGHT_CANDIDATES_SQL)
                .bind::<Timestamptz, _>(cutoff)
                .load(&mut conn)
                .map_err(CoreError::from_diesel)
        })
        .await
        .map_err(db::transient)?
    }

    pub async fn controller_candidates(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<CompletionCandidate>, CoreError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(db::transient)?;
            diesel::sql_query(CONTROLLER_CANDIDATES_SQL)
                .bind::<Timestamptz, _>(cutoff)
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

    #[test]
    fn test_sql_shapes_use_is_not_distinct_from_not_not_in() {
        // Regression guard (spec.md §4.6): `NOT IN` on tuples is explicitly
        // forbidden because it mishandles NULL CIDs; assert the literal
        // SQL text never regresses to it.
        assert!(FLIGHT_CANDIDATES_SQL.contains("IS NOT DISTINCT FROM"));
        assert!(!FLIGHT_CANDIDATES_SQL.to_uppercase().contains("NOT IN"));
        assert!(CONTROLLER_CANDIDATES_SQL.contains("IS NOT DISTINCT FROM"));
        assert!(!CONTROLLER_CANDIDATES_SQL.to_uppercase().contains("NOT IN"));
    }

    #[test]
    fn test_candidates_ordered_earliest_logon_first() {
        // Regression guard: the reconnection merger (session/reconnect.rs)
        // only folds siblings whose logon_time is later than the base
        // candidate's session_end. If a later reconnect group were scanned
        // before its earlier base, it would be summarized on its own and
        // the base would never fold it in, producing two summaries instead
        // of one (spec.md §4.6, §8 scenarios 2/3). `GROUP BY` output order
        // is otherwise unspecified, so the base must always sort first.
        assert!(FLIGHT_CANDIDATES_SQL.to_uppercase().contains("ORDER BY LOGON_TIME ASC"));
        assert!(CONTROLLER_CANDIDATES_SQL.to_uppercase().contains("ORDER BY LOGON_TIME ASC"));
    }
}
