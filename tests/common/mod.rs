//! Shared test-database harness for the end-to-end scenario tests in this
//! directory. Each test gets its own freshly migrated Postgres database,
//! dropped on `Drop`, so scenario tests can run in parallel without
//! interfering with each other.

use anyhow::{Context, Result};
use diesel::prelude::*;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use rand::Rng;

use vatsim_state::db::PgPool;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations/");

pub struct TestDatabase {
    db_name: String,
    pool: PgPool,
    admin_url: String,
}

impl TestDatabase {
    pub async fn new() -> Result<Self> {
        dotenvy::dotenv().ok();

        let base_url = std::env::var("TEST_DATABASE_URL")
            .unwrap_or_else(|_| "postgresql://localhost/vatsim_state_test".to_string());

        let (admin_url, db_name) = Self::generate_database_info(&base_url)?;
        Self::create_database(&admin_url, &db_name)
            .await
            .context("failed to create test database")?;

        let test_db_url = Self::build_database_url(&base_url, &db_name);
        Self::run_migrations(&test_db_url)
            .await
            .context("failed to run migrations")?;

        let pool = vatsim_state::db::build_pool(&test_db_url).context("failed to build pool")?;

        Ok(TestDatabase {
            db_name,
            pool,
            admin_url,
        })
    }

    pub fn pool(&self) -> PgPool {
        self.pool.clone()
    }

    fn generate_database_info(base_url: &str) -> Result<(String, String)> {
        let suffix = rand::rng().next_u64();
        let db_name = format!("vatsim_state_test_{suffix:016x}");
        let admin_url = base_url
            .replace("/vatsim_state_test", "/postgres")
            .replace("/vatsim_state_test_template", "/postgres");
        Ok((admin_url, db_name))
    }

    fn build_database_url(base_url: &str, db_name: &str) -> String {
        base_url
            .replace("/vatsim_state_test", &format!("/{db_name}"))
            .replace("/vatsim_state_test_template", &format!("/{db_name}"))
    }

    async fn create_database(admin_url: &str, db_name: &str) -> Result<()> {
        let admin_url = admin_url.to_string();
        let db_name = db_name.to_string();
        tokio::task::spawn_blocking(move || {
            let mut conn = PgConnection::establish(&admin_url)
                .context("failed to connect to postgres for database creation")?;
            diesel::sql_query(format!("CREATE DATABASE \"{db_name}\""))
                .execute(&mut conn)
                .with_context(|| format!("failed to create database '{db_name}'"))?;
            Ok::<(), anyhow::Error>(())
        })
        .await
        .context("database creation task panicked")?
    }

    async fn run_migrations(db_url: &str) -> Result<()> {
        let db_url = db_url.to_string();
        tokio::task::spawn_blocking(move || {
            let mut conn = PgConnection::establish(&db_url)
                .context("failed to connect to test database for migrations")?;
            conn.run_pending_migrations(MIGRATIONS)
                .map_err(|e| anyhow::anyhow!("failed to run migrations: {e}"))?;
            Ok::<(), anyhow::Error>(())
        })
        .await
        .context("migration task panicked")?
    }

    fn cleanup(&self) {
        let db_name = self.db_name.clone();
        let admin_url = self.admin_url.clone();
        if let Ok(mut conn) = PgConnection::establish(&admin_url) {
            let _ = diesel::sql_query(format!("DROP DATABASE IF EXISTS \"{db_name}\" WITH (FORCE)"))
                .execute(&mut conn);
        }
    }
}

impl Drop for TestDatabase {
    fn drop(&mut self) {
        self.cleanup();
    }
}
