//! Shared PostgreSQL fixtures for coach integration tests.
//!
//! One PostgreSQL server is shared per test binary; every test gets its own
//! freshly migrated database inside it.
//!
//! Set `COACH_TEST_PG_URL` (server root, no database name) to reuse an
//! already running server. Otherwise a container is started through
//! testcontainers on first use.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use testcontainers::ContainerAsync;
use testcontainers::ImageExt;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use uuid::Uuid;

use coach_db::Gateway;
use coach_db::models::{Difficulty, Question, QuestionSource};
use coach_db::pool;
use coach_db::queries::questions::{self, NewQuestion};

struct SharedPg {
    base_url: String,
    /// Keeps the container alive. `None` when using an external server.
    _container: Option<ContainerAsync<Postgres>>,
}

static SHARED_PG: OnceCell<SharedPg> = OnceCell::const_new();

async fn init_shared_pg() -> SharedPg {
    if let Ok(url) = std::env::var("COACH_TEST_PG_URL") {
        return SharedPg {
            base_url: url.trim_end_matches('/').to_owned(),
            _container: None,
        };
    }

    let container = Postgres::default()
        .with_tag("16")
        .start()
        .await
        .expect("failed to start PostgreSQL container");

    let host = container.get_host().await.expect("failed to get host");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("failed to get mapped port");

    SharedPg {
        base_url: format!("postgresql://postgres:postgres@{host}:{port}"),
        _container: Some(container),
    }
}

/// Server root URL of the shared PostgreSQL.
pub async fn pg_url() -> &'static str {
    let shared = SHARED_PG.get_or_init(init_shared_pg).await;
    &shared.base_url
}

async fn maintenance_pool() -> PgPool {
    let maint_url = format!("{}/postgres", pg_url().await);
    PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&maint_url)
        .await
        .expect("failed to connect to maintenance database")
}

/// Create a migrated temporary database. Returns `(pool, db_name)`.
pub async fn create_test_db() -> (PgPool, String) {
    let db_name = format!("coach_test_{}", Uuid::new_v4().simple());

    let maint = maintenance_pool().await;
    maint
        .execute(format!("CREATE DATABASE {db_name}").as_str())
        .await
        .unwrap_or_else(|e| panic!("failed to create temp database {db_name}: {e}"));
    maint.close().await;

    let url = format!("{}/{db_name}", pg_url().await);
    let test_pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&url)
        .await
        .unwrap_or_else(|e| panic!("failed to connect to temp database {db_name}: {e}"));

    pool::run_migrations(&test_pool)
        .await
        .expect("migrations should succeed");

    (test_pool, db_name)
}

/// Terminate connections to `db_name` and drop it. Idempotent.
pub async fn drop_test_db(db_name: &str) {
    let maint = maintenance_pool().await;
    let terminate = format!(
        "SELECT pg_terminate_backend(pid) FROM pg_stat_activity \
         WHERE datname = '{db_name}' AND pid <> pg_backend_pid()"
    );
    let _ = maint.execute(terminate.as_str()).await;
    let _ = maint
        .execute(format!("DROP DATABASE IF EXISTS {db_name}").as_str())
        .await;
    maint.close().await;
}

/// A migrated temporary database with a gateway over it.
pub struct TestDb {
    pub gateway: Gateway,
    pub name: String,
}

impl TestDb {
    pub async fn new() -> Self {
        let (pool, name) = create_test_db().await;
        Self {
            gateway: Gateway::with_default_cache(pool),
            name,
        }
    }

    pub fn pool(&self) -> &PgPool {
        self.gateway.pool()
    }

    /// Close the gateway and drop the database.
    pub async fn teardown(self) {
        self.gateway.close().await;
        drop_test_db(&self.name).await;
    }
}

/// Insert `count` seed questions into `category`, numbered from 1.
pub async fn seed_questions(gateway: &Gateway, category: &str, count: usize) -> Vec<Question> {
    let mut out = Vec::with_capacity(count);
    for n in 1..=count {
        let text = format!("{category} question {n}");
        let q = questions::insert_question(
            gateway,
            &NewQuestion {
                category,
                difficulty: Difficulty::Medium,
                question_text: &text,
                reference_answer: "",
                tags: &[],
                school_code: None,
                source: QuestionSource::Seed,
            },
        )
        .await
        .expect("seed question insert should succeed");
        out.push(q);
    }
    out
}
