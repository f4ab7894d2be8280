//! Connection pool plumbing shared by every repository.
//!
//! Diesel's `PgConnection` is synchronous, so every repository call dips
//! into `spawn_blocking` around a pooled connection rather than using an
//! async driver directly — the same shape as the teacher's `device_repo.rs`.

use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::PgConnection;

use crate::error::CoreError;

pub type PgPool = Pool<ConnectionManager<PgConnection>>;
pub type PgPooledConnection = PooledConnection<ConnectionManager<PgConnection>>;

pub fn build_pool(database_url: &str) -> Result<PgPool, CoreError> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    Pool::builder()
        .build(manager)
        .map_err(|e| CoreError::ConfigInvalid(format!("failed to build database pool: {e}")))
}

/// Wrap a pool-checkout or task-join failure as a transient `CoreError`.
/// Neither has a Diesel error to carry, so this builds a synthetic one the
/// same way Diesel itself reports driver-level failures.
pub fn transient<E: std::error::Error + Send + Sync + 'static>(err: E) -> CoreError {
    CoreError::DbTransient(diesel::result::Error::QueryBuilderError(Box::new(err)))
}

/// Run Diesel's embedded migrations against the pool. Called once at
/// startup so a fresh database is brought up to date without a separate
/// `diesel migration run` step.
pub mod migrations {
    use diesel::prelude::*;
    use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

    use super::PgPool;
    use crate::error::CoreError;

    pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

    pub fn run(pool: &PgPool) -> Result<(), CoreError> {
        let mut conn = pool
            .get()
            .map_err(|e| CoreError::ConfigInvalid(format!("failed to get connection for migrations: {e}")))?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|e| CoreError::ConfigInvalid(format!("migration failed: {e}")))?;
        Ok(())
    }
}
