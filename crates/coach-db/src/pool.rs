use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use tracing::info;

use crate::config::DbConfig;

/// Migrations embedded at compile time from `crates/coach-db/migrations/`.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

/// Tables owned by the coaching core, in dependency order.
pub const CORE_TABLES: &[&str] = &[
    "questions",
    "training_plans",
    "daily_tasks",
    "sessions",
    "qa_records",
    "student_weaknesses",
];

/// Create a connection pool from the given config.
pub async fn create_pool(config: &DbConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect(&config.database_url)
        .await
        .with_context(|| format!("failed to connect to database at {}", config.database_url))?;
    Ok(pool)
}

/// Run all pending embedded migrations against the pool.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    MIGRATOR
        .run(pool)
        .await
        .context("failed to run database migrations")?;

    info!("migrations applied successfully");
    Ok(())
}

/// Create the target database when it is missing. Returns `true` if it was
/// created by this call.
///
/// Runs against the server's `postgres` maintenance database.
pub async fn ensure_database_exists(config: &DbConfig) -> Result<bool> {
    let db_name = config
        .database_name()
        .context("database URL has no database name")?;
    let create = create_database_statement(db_name)?;

    let maint = PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(config.acquire_timeout)
        .connect(&config.maintenance_url())
        .await
        .context("failed to reach the postgres maintenance database")?;

    let outcome: Result<bool> = async {
        let present: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
                .bind(db_name)
                .fetch_one(&maint)
                .await
                .context("failed to look up database")?;
        if present {
            return Ok(false);
        }
        maint
            .execute(create.as_str())
            .await
            .with_context(|| format!("failed to create database {db_name}"))?;
        Ok(true)
    }
    .await;

    maint.close().await;
    if let Ok(created) = outcome {
        info!(db = db_name, created, "database ready");
    }
    outcome
}

/// `CREATE DATABASE` cannot bind its name, so only plain identifiers pass.
fn create_database_statement(db_name: &str) -> Result<String> {
    let plain = !db_name.is_empty()
        && db_name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !plain {
        anyhow::bail!("refusing to create database {db_name:?}: name must be [A-Za-z0-9_]+");
    }
    Ok(format!("CREATE DATABASE {db_name}"))
}

/// Row count per core table, in [`CORE_TABLES`] order.
pub async fn table_counts(pool: &PgPool) -> Result<Vec<(String, i64)>> {
    let sql = CORE_TABLES
        .iter()
        .map(|t| format!("SELECT '{t}'::text, COUNT(*) FROM {t}"))
        .collect::<Vec<_>>()
        .join(" UNION ALL ");
    let rows: Vec<(String, i64)> = sqlx::query_as(&sql)
        .fetch_all(pool)
        .await
        .context("failed to count core tables")?;

    // UNION ALL does not promise order.
    let mut counts = Vec::with_capacity(rows.len());
    for table in CORE_TABLES {
        if let Some(row) = rows.iter().find(|(name, _)| name == table) {
            counts.push(row.clone());
        }
    }
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_statement_accepts_plain_names() {
        assert_eq!(
            create_database_statement("coach_test_1").unwrap(),
            "CREATE DATABASE coach_test_1"
        );
    }

    #[test]
    fn create_statement_rejects_injection() {
        assert!(create_database_statement("coach; DROP DATABASE x").is_err());
        assert!(create_database_statement("").is_err());
        assert!(create_database_statement("coach-dev").is_err());
    }
}
