use analysis_core::{AnalysisResult, Fingerprint};
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
use std::time::Duration;

/// Datastore configuration, env-overridable at bootstrap
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub database_url: String,
    /// Handles pre-allocated by the pool
    pub max_connections: u32,
    /// Bounded wait when the pool is exhausted; acquiring errors after this.
    /// No overflow handles are opened.
    pub acquire_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:newsiq.db".to_string(),
            max_connections: 5,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

impl StoreConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:newsiq.db".to_string()),
            max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
            acquire_timeout: Duration::from_secs(
                std::env::var("DB_ACQUIRE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
        }
    }
}

/// A cache entry as persisted, for hydration at startup
#[derive(Debug, Clone)]
pub struct PersistedEntry {
    pub fingerprint: String,
    pub payload: AnalysisResult,
    pub cached_at: DateTime<Utc>,
    pub ttl: Duration,
}

/// Bounded connection pool over the durable local datastore, plus optional
/// persistence of rate-limit windows and cache entries across restarts.
#[derive(Clone)]
pub struct AnalysisStore {
    pool: SqlitePool,
}

impl AnalysisStore {
    pub async fn connect(config: StoreConfig) -> Result<Self> {
        let options =
            SqliteConnectOptions::from_str(&config.database_url)?.create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        tracing::info!(
            "Store: connected ({} handles, {}s acquire timeout)",
            config.max_connections,
            config.acquire_timeout.as_secs()
        );

        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        let schema = include_str!("../../../schema.sql");

        // sqlx executes one statement at a time
        for statement in schema.split(';') {
            let stmt = statement.trim();
            if !stmt.is_empty() {
                sqlx::query(stmt).execute(&self.pool).await?;
            }
        }

        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // -- Rate-limit persistence ---------------------------------------------

    pub async fn record_admission(&self, user_id: &str, admitted_at: DateTime<Utc>) -> Result<()> {
        sqlx::query("INSERT INTO rate_limit_events (user_id, admitted_at) VALUES (?, ?)")
            .bind(user_id)
            .bind(admitted_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Admissions still inside the window, grouped per user and ordered
    /// oldest-first, ready for `SlidingWindowLimiter::hydrate`.
    pub async fn load_windows(&self, window: Duration) -> Result<Vec<(String, Vec<DateTime<Utc>>)>> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::seconds(60));

        let rows = sqlx::query(
            "SELECT user_id, admitted_at FROM rate_limit_events \
             WHERE admitted_at > ? ORDER BY user_id, admitted_at",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        let mut windows: Vec<(String, Vec<DateTime<Utc>>)> = Vec::new();
        for row in rows {
            let user_id: String = row.try_get("user_id")?;
            let admitted_at: DateTime<Utc> = row.try_get("admitted_at")?;
            if let Some((last_user, timestamps)) = windows.last_mut() {
                if *last_user == user_id {
                    timestamps.push(admitted_at);
                    continue;
                }
            }
            windows.push((user_id, vec![admitted_at]));
        }
        Ok(windows)
    }

    /// Drop admissions that can no longer affect any decision.
    pub async fn prune_admissions(&self, window: Duration) -> Result<u64> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::seconds(60));
        let result = sqlx::query("DELETE FROM rate_limit_events WHERE admitted_at <= ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    // -- Cache persistence --------------------------------------------------

    pub async fn save_entry(
        &self,
        fingerprint: &Fingerprint,
        payload: &AnalysisResult,
        ttl: Duration,
    ) -> Result<()> {
        let json = serde_json::to_string(payload)?;
        sqlx::query(
            "INSERT OR REPLACE INTO cache_entries (fingerprint, payload, cached_at, ttl_secs) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(fingerprint.as_str())
        .bind(json)
        .bind(Utc::now())
        .bind(ttl.as_secs() as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Unexpired entries for cache hydration. Undecodable payloads are
    /// skipped with a warning rather than failing the whole load.
    pub async fn load_entries(&self) -> Result<Vec<PersistedEntry>> {
        let rows = sqlx::query("SELECT fingerprint, payload, cached_at, ttl_secs FROM cache_entries")
            .fetch_all(&self.pool)
            .await?;

        let now = Utc::now();
        let mut entries = Vec::new();
        for row in rows {
            let fingerprint: String = row.try_get("fingerprint")?;
            let json: String = row.try_get("payload")?;
            let cached_at: DateTime<Utc> = row.try_get("cached_at")?;
            let ttl_secs: i64 = row.try_get("ttl_secs")?;
            let ttl = Duration::from_secs(ttl_secs.max(0) as u64);

            let expired = (now - cached_at)
                .to_std()
                .map(|age| age >= ttl)
                .unwrap_or(false);
            if expired {
                continue;
            }

            match serde_json::from_str(&json) {
                Ok(payload) => entries.push(PersistedEntry {
                    fingerprint,
                    payload,
                    cached_at,
                    ttl,
                }),
                Err(e) => tracing::warn!("Store: skipping undecodable cache entry: {}", e),
            }
        }
        Ok(entries)
    }

    pub async fn purge_expired_entries(&self) -> Result<u64> {
        let rows = sqlx::query("SELECT fingerprint, cached_at, ttl_secs FROM cache_entries")
            .fetch_all(&self.pool)
            .await?;

        let now = Utc::now();
        let mut purged = 0u64;
        for row in rows {
            let fingerprint: String = row.try_get("fingerprint")?;
            let cached_at: DateTime<Utc> = row.try_get("cached_at")?;
            let ttl_secs: i64 = row.try_get("ttl_secs")?;

            let expired = (now - cached_at)
                .to_std()
                .map(|age| age.as_secs() as i64 >= ttl_secs)
                .unwrap_or(false);
            if expired {
                sqlx::query("DELETE FROM cache_entries WHERE fingerprint = ?")
                    .bind(&fingerprint)
                    .execute(&self.pool)
                    .await?;
                purged += 1;
            }
        }
        Ok(purged)
    }
}
