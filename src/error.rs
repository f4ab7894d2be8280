//! Error kinds shared across the ingestion and session-reconstruction pipeline.
//!
//! These map onto the error-kind taxonomy the pipeline is specified against:
//! upstream fetch/parse failures, transient vs. integrity database failures,
//! invalid configuration, and self-healed invariant violations.

use thiserror::Error;

/// Top-level error kind. Most call sites propagate `anyhow::Error` and only
/// match on this enum at the boundaries that need to branch on kind (the
/// scheduler's per-tick failure handling, the batch writer's retry logic).
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("upstream response malformed: {0}")]
    UpstreamMalformed(String),

    #[error("transient database error: {0}")]
    DbTransient(#[source] diesel::result::Error),

    #[error("database integrity violation (already summarized): {0}")]
    DbIntegrity(#[source] diesel::result::Error),

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("invariant violated (self-healed): {0}")]
    InvariantViolated(String),
}

impl CoreError {
    /// Classify a Diesel error into a transient-vs-integrity `CoreError`.
    ///
    /// Unique-constraint violations on a summary table mean "this session
    /// was already summarized by a previous tick" per the completion
    /// predicate's existence check — not a real failure.
    pub fn from_diesel(err: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error as DieselError};
        match err {
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                CoreError::DbIntegrity(err)
            }
            other => CoreError::DbTransient(other),
        }
    }

    /// Whether this error kind should be surfaced as "already complete"
    /// (archive+delete should still proceed) rather than a hard failure.
    pub fn is_already_summarized(&self) -> bool {
        matches!(self, CoreError::DbIntegrity(_))
    }
}
