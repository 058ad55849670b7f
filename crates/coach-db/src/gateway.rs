//! Cached query gateway.
//!
//! Every read and write of the coaching tables goes through [`Gateway`].
//! Reads flagged as cacheable are served from the [`QueryCache`] when a live
//! entry exists. Every write drops the cached reads of the table it touched,
//! so a read issued after a completed write never sees pre-write data.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::{Arguments, FromRow, PgPool, Postgres, Transaction};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::{QueryCache, TtlCache};

/// Queries slower than this are logged at warn level.
pub const SLOW_QUERY_THRESHOLD: Duration = Duration::from_millis(100);

/// Upper bound for any page size or bound LIMIT.
pub const MAX_PAGE_SIZE: i64 = 1000;

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// A positional query parameter (`$1`, `$2`, ...).
///
/// `None` binds SQL `NULL` of the variant's type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "t", content = "v", rename_all = "snake_case")]
pub enum SqlParam {
    Bool(Option<bool>),
    Int(Option<i64>),
    Float(Option<f64>),
    Text(Option<String>),
    Uuid(Option<Uuid>),
    Date(Option<NaiveDate>),
    Json(Option<Value>),
}

impl From<bool> for SqlParam {
    fn from(v: bool) -> Self {
        Self::Bool(Some(v))
    }
}

impl From<i64> for SqlParam {
    fn from(v: i64) -> Self {
        Self::Int(Some(v))
    }
}

impl From<i32> for SqlParam {
    fn from(v: i32) -> Self {
        Self::Int(Some(i64::from(v)))
    }
}

impl From<f64> for SqlParam {
    fn from(v: f64) -> Self {
        Self::Float(Some(v))
    }
}

impl From<&str> for SqlParam {
    fn from(v: &str) -> Self {
        Self::Text(Some(v.to_owned()))
    }
}

impl From<String> for SqlParam {
    fn from(v: String) -> Self {
        Self::Text(Some(v))
    }
}

impl From<Option<&str>> for SqlParam {
    fn from(v: Option<&str>) -> Self {
        Self::Text(v.map(str::to_owned))
    }
}

impl From<Option<String>> for SqlParam {
    fn from(v: Option<String>) -> Self {
        Self::Text(v)
    }
}

impl From<Uuid> for SqlParam {
    fn from(v: Uuid) -> Self {
        Self::Uuid(Some(v))
    }
}

impl From<Option<Uuid>> for SqlParam {
    fn from(v: Option<Uuid>) -> Self {
        Self::Uuid(v)
    }
}

impl From<NaiveDate> for SqlParam {
    fn from(v: NaiveDate) -> Self {
        Self::Date(Some(v))
    }
}

impl From<Value> for SqlParam {
    fn from(v: Value) -> Self {
        Self::Json(Some(v))
    }
}

fn to_arguments(params: &[SqlParam]) -> Result<PgArguments> {
    let mut args = PgArguments::default();
    for (index, param) in params.iter().enumerate() {
        let added = match param {
            SqlParam::Bool(v) => args.add(*v),
            SqlParam::Int(v) => args.add(*v),
            SqlParam::Float(v) => args.add(*v),
            SqlParam::Text(v) => args.add(v.clone()),
            SqlParam::Uuid(v) => args.add(*v),
            SqlParam::Date(v) => args.add(*v),
            SqlParam::Json(v) => args.add(v.clone()),
        };
        added.map_err(|e| anyhow!("failed to encode parameter ${}: {e}", index + 1))?;
    }
    Ok(args)
}

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

/// A LIMIT/OFFSET pair, clamped on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    limit: i64,
    offset: i64,
}

impl Page {
    /// Limit is clamped to `1..=MAX_PAGE_SIZE`, offset to `>= 0`.
    pub fn new(limit: i64, offset: i64) -> Self {
        Self {
            limit: clamp_limit(limit),
            offset: offset.max(0),
        }
    }

    pub fn limit(&self) -> i64 {
        self.limit
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(50, 0)
    }
}

/// Clamp a caller-supplied row count into `1..=MAX_PAGE_SIZE`.
pub fn clamp_limit(limit: i64) -> i64 {
    limit.clamp(1, MAX_PAGE_SIZE)
}

// ---------------------------------------------------------------------------
// SQL inspection
// ---------------------------------------------------------------------------

/// Whether `sql` is a plain SELECT and therefore eligible for caching.
pub fn is_select(sql: &str) -> bool {
    let head: String = sql
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    head.eq_ignore_ascii_case("select")
}

/// The table a write statement targets.
///
/// Recognises `INSERT INTO t`, `UPDATE t` and `DELETE FROM t`, case
/// insensitively, anywhere in the statement (so CTE-prefixed writes work).
pub fn referenced_table(sql: &str) -> Option<String> {
    let tokens: Vec<String> = sql
        .split(|c: char| c.is_whitespace() || c == '(' || c == ';')
        .filter(|t| !t.is_empty())
        .map(str::to_ascii_lowercase)
        .collect();

    for (i, token) in tokens.iter().enumerate() {
        let target = match token.as_str() {
            "insert" if tokens.get(i + 1).is_some_and(|t| t == "into") => tokens.get(i + 2),
            "delete" if tokens.get(i + 1).is_some_and(|t| t == "from") => tokens.get(i + 2),
            "update" => match tokens.get(i + 1) {
                Some(t) if t == "only" => tokens.get(i + 2),
                other => other,
            },
            _ => None,
        };
        if let Some(name) = target {
            let name = name.rsplit('.').next().unwrap_or(name).trim_matches('"');
            if !name.is_empty() {
                return Some(name.to_owned());
            }
        }
    }
    None
}

/// Cache key for a read: the SQL text plus its serialized parameters.
pub fn cache_key(sql: &str, params: &[SqlParam]) -> Result<String> {
    let encoded = serde_json::to_string(params).context("failed to encode cache key params")?;
    Ok(format!("{sql}|{encoded}"))
}

/// Whether `err` (or anything it wraps) is a unique-constraint violation.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<sqlx::Error>()
            .and_then(sqlx::Error::as_database_error)
            .is_some_and(|db| db.is_unique_violation())
    })
}

fn preview(sql: &str) -> String {
    let flat = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > 120 {
        let cut: String = flat.chars().take(120).collect();
        format!("{cut}...")
    } else {
        flat
    }
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

/// Database access with a read cache and write-triggered invalidation.
#[derive(Clone)]
pub struct Gateway {
    pool: PgPool,
    cache: Arc<dyn QueryCache>,
}

impl Gateway {
    pub fn new(pool: PgPool, cache: Arc<dyn QueryCache>) -> Self {
        Self { pool, cache }
    }

    /// Gateway backed by an in-process [`TtlCache`] with the default TTL.
    pub fn with_default_cache(pool: PgPool) -> Self {
        Self::new(pool, Arc::new(TtlCache::default()))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn cache(&self) -> &Arc<dyn QueryCache> {
        &self.cache
    }

    /// Run a read and decode every row.
    ///
    /// With `use_cache`, a SELECT is answered from the cache when possible
    /// and the fresh result is stored otherwise. Non-SELECT statements are
    /// never cached.
    pub async fn query<T>(&self, sql: &str, params: &[SqlParam], use_cache: bool) -> Result<Vec<T>>
    where
        T: for<'r> FromRow<'r, PgRow> + Serialize + DeserializeOwned + Send + Unpin,
    {
        let key = if use_cache && is_select(sql) {
            Some(cache_key(sql, params)?)
        } else {
            None
        };

        if let Some(key) = &key {
            if let Some(hit) = self.cache.get(key).await {
                match serde_json::from_value::<Vec<T>>(hit) {
                    Ok(rows) => {
                        debug!(sql = %preview(sql), rows = rows.len(), "cache hit");
                        return Ok(rows);
                    }
                    Err(e) => warn!(error = %e, "discarding undecodable cache entry"),
                }
            }
        }

        let args = to_arguments(params)?;
        let started = Instant::now();
        let rows = sqlx::query_as_with::<Postgres, T, PgArguments>(sql, args)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("query failed: {}", preview(sql)))?;
        self.observe(sql, started.elapsed(), rows.len() as u64);

        if let Some(key) = key {
            match serde_json::to_value(&rows) {
                Ok(value) => self.cache.set(&key, value).await,
                Err(e) => warn!(error = %e, "failed to cache query result"),
            }
        }
        Ok(rows)
    }

    /// Like [`query`](Self::query) but returns only the first row.
    pub async fn query_one<T>(
        &self,
        sql: &str,
        params: &[SqlParam],
        use_cache: bool,
    ) -> Result<Option<T>>
    where
        T: for<'r> FromRow<'r, PgRow> + Serialize + DeserializeOwned + Send + Unpin,
    {
        let rows = self.query::<T>(sql, params, use_cache).await?;
        Ok(rows.into_iter().next())
    }

    /// Run a write that returns no rows. Returns the affected row count.
    ///
    /// Cached reads of the target table are dropped whether or not the
    /// statement succeeded.
    pub async fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<u64> {
        let args = to_arguments(params)?;
        let started = Instant::now();
        let outcome = sqlx::query_with::<Postgres, PgArguments>(sql, args)
            .execute(&self.pool)
            .await;
        self.invalidate_for(sql).await;

        let result = outcome.with_context(|| format!("statement failed: {}", preview(sql)))?;
        self.observe(sql, started.elapsed(), result.rows_affected());
        Ok(result.rows_affected())
    }

    /// Run an `INSERT ... RETURNING *` (or any write returning one row).
    pub async fn insert<T>(&self, sql: &str, params: &[SqlParam]) -> Result<T>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let args = to_arguments(params)?;
        let started = Instant::now();
        let outcome = sqlx::query_as_with::<Postgres, T, PgArguments>(sql, args)
            .fetch_one(&self.pool)
            .await;
        self.invalidate_for(sql).await;

        let row = outcome.with_context(|| format!("insert failed: {}", preview(sql)))?;
        self.observe(sql, started.elapsed(), 1);
        Ok(row)
    }

    /// Run a write with a `RETURNING` clause and collect every returned row.
    pub async fn execute_returning<T>(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<T>>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let args = to_arguments(params)?;
        let started = Instant::now();
        let outcome = sqlx::query_as_with::<Postgres, T, PgArguments>(sql, args)
            .fetch_all(&self.pool)
            .await;
        self.invalidate_for(sql).await;

        let rows = outcome.with_context(|| format!("statement failed: {}", preview(sql)))?;
        self.observe(sql, started.elapsed(), rows.len() as u64);
        Ok(rows)
    }

    /// Begin a transaction on the underlying pool.
    ///
    /// Writes inside a transaction bypass the automatic invalidation; call
    /// [`invalidate_tables`](Self::invalidate_tables) after commit.
    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>> {
        self.pool
            .begin()
            .await
            .context("failed to begin transaction")
    }

    /// Drop cached reads mentioning any of `tables`.
    pub async fn invalidate_tables(&self, tables: &[&str]) {
        for table in tables {
            let removed = self.cache.invalidate_by_pattern(table).await;
            debug!(table, removed, "invalidated cached reads");
        }
    }

    /// Clear the cache and close the pool.
    pub async fn close(&self) {
        self.cache.clear().await;
        self.pool.close().await;
    }

    async fn invalidate_for(&self, sql: &str) {
        match referenced_table(sql) {
            Some(table) => self.invalidate_tables(&[table.as_str()]).await,
            None => {
                debug!(sql = %preview(sql), "write target unknown, clearing cache");
                self.cache.clear().await;
            }
        }
    }

    fn observe(&self, sql: &str, elapsed: Duration, rows: u64) {
        let elapsed_ms = elapsed.as_millis() as u64;
        if elapsed > SLOW_QUERY_THRESHOLD {
            warn!(elapsed_ms, rows, sql = %preview(sql), "slow query");
        } else {
            debug!(elapsed_ms, rows, sql = %preview(sql), "query");
        }
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("pool_size", &self.pool.size())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;
    use sqlx::postgres::PgPoolOptions;

    use super::*;

    #[derive(Debug, Serialize, Deserialize, FromRow, PartialEq)]
    struct Row {
        id: i64,
    }

    fn unreachable_gateway() -> Gateway {
        let pool = PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(300))
            .connect_lazy("postgresql://127.0.0.1:1/unreachable")
            .expect("lazy pool");
        Gateway::with_default_cache(pool)
    }

    #[test]
    fn select_detection() {
        assert!(is_select("SELECT * FROM questions"));
        assert!(is_select("  select id from sessions"));
        assert!(is_select("SELECT(1)"));
        assert!(!is_select("UPDATE sessions SET status = 'completed'"));
        assert!(!is_select("selected"));
        assert!(!is_select("WITH x AS (DELETE FROM qa_records RETURNING *) SELECT * FROM x"));
    }

    #[test]
    fn referenced_table_for_writes() {
        assert_eq!(
            referenced_table("INSERT INTO questions(category) VALUES ($1)").as_deref(),
            Some("questions")
        );
        assert_eq!(
            referenced_table("update daily_tasks set status = 'pending'").as_deref(),
            Some("daily_tasks")
        );
        assert_eq!(
            referenced_table("DELETE FROM qa_records WHERE session_id = $1").as_deref(),
            Some("qa_records")
        );
        assert_eq!(
            referenced_table("UPDATE ONLY public.\"sessions\" SET ended_at = now()").as_deref(),
            Some("sessions")
        );
        assert_eq!(referenced_table("VACUUM"), None);
    }

    #[test]
    fn cache_key_depends_on_params() {
        let a = cache_key("SELECT 1", &["x".into()]).unwrap();
        let b = cache_key("SELECT 1", &["y".into()]).unwrap();
        let c = cache_key("SELECT 1", &[SqlParam::Text(None)]).unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("SELECT 1|"));
    }

    #[test]
    fn page_is_clamped() {
        assert_eq!(Page::new(0, -5), Page::new(1, 0));
        assert_eq!(Page::new(5000, 10).limit(), MAX_PAGE_SIZE);
        assert_eq!(Page::new(20, 40).offset(), 40);
        assert_eq!(clamp_limit(-3), 1);
    }

    #[tokio::test]
    async fn cached_select_is_served_without_touching_the_pool() {
        let gateway = unreachable_gateway();
        let sql = "SELECT id FROM questions WHERE category = $1";
        let params = [SqlParam::from("english-oral")];
        let key = cache_key(sql, &params).unwrap();
        gateway.cache().set(&key, json!([{"id": 7}])).await;

        let rows: Vec<Row> = gateway.query(sql, &params, true).await.unwrap();
        assert_eq!(rows, vec![Row { id: 7 }]);
    }

    #[tokio::test]
    async fn uncached_read_bypasses_cache() {
        let gateway = unreachable_gateway();
        let sql = "SELECT id FROM questions";
        let key = cache_key(sql, &[]).unwrap();
        gateway.cache().set(&key, json!([{"id": 1}])).await;

        let result = gateway.query::<Row>(sql, &[], false).await;
        assert!(result.is_err(), "use_cache = false must hit the database");
    }

    #[tokio::test]
    async fn failed_write_still_invalidates_target_table() {
        let gateway = unreachable_gateway();
        let qa_key = cache_key("SELECT * FROM qa_records", &[]).unwrap();
        let plan_key = cache_key("SELECT * FROM training_plans", &[]).unwrap();
        gateway.cache().set(&qa_key, json!([])).await;
        gateway.cache().set(&plan_key, json!([])).await;

        let result = gateway
            .execute("DELETE FROM qa_records WHERE session_id = $1", &[Uuid::nil().into()])
            .await;
        assert!(result.is_err());
        assert!(gateway.cache().get(&qa_key).await.is_none());
        assert!(gateway.cache().get(&plan_key).await.is_some());
    }
}
