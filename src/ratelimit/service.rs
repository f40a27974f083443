//! Coordinated counter service
//!
//! Server side of [`super::CoordinatedRateLimiter`]. Each named counter is
//! serialized by its own async mutex held across the read-modify-write, so
//! concurrent checks for one name are linearizable within a service instance.
//! Counters persist in SQLite and are evicted two windows after last use.

use super::apply_check;
use super::coordinated::{CheckRequest, CheckResponse};
use super::RateCounter;
use crate::clock::SharedClock;
use crate::config::{Config, CounterServiceConfig};
use crate::constants::{COUNTER_EVICTION_WINDOWS, RATE_WINDOW_MS};
use crate::error::StorageError;
use crate::http::AppError;
use crate::{GatewayError, Result};
use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::{Path as AxumPath, State},
    routing::{get, post},
};
use dashmap::DashMap;
use serde_json::{Value, json};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;

/// Run an eviction sweep every this many checks
const SWEEP_EVERY_CHECKS: u64 = 512;

/// Longest accepted counter instance name
const MAX_INSTANCE_LEN: usize = 128;

/// Durable counter storage for the counter service
#[async_trait]
pub trait CounterBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<RateCounter>>;

    /// Upsert `counter`, to be evicted once `evict_at_ms` has passed
    async fn put(&self, counter: &RateCounter, evict_at_ms: i64) -> Result<()>;

    /// Delete counters whose eviction time has passed; returns rows removed
    async fn sweep_expired(&self, now_ms: i64) -> Result<u64>;
}

/// SQLite-backed [`CounterBackend`]
pub struct SqliteCounterStore {
    pool: SqlitePool,
}

impl SqliteCounterStore {
    /// Open (and migrate) the counter database
    ///
    /// # Arguments
    /// * `dsn` - `sqlite::memory:`, `sqlite:counters.db` or a bare file path
    pub async fn new(dsn: &str) -> Result<Self> {
        let connection_string = if dsn.starts_with("sqlite:") {
            dsn.to_string()
        } else {
            format!("sqlite:{}", dsn)
        };

        let file_path = connection_string
            .strip_prefix("sqlite:")
            .unwrap_or(&connection_string)
            .trim_start_matches("//");
        if file_path.contains("..") {
            return Err(GatewayError::config(
                "Database path cannot contain '..' (path traversal not allowed)",
            ));
        }

        // Every connection to an in-memory database sees its own empty database
        let in_memory = file_path.starts_with(":memory:");

        let options = SqliteConnectOptions::from_str(&connection_string)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| {
                GatewayError::Storage(StorageError::Connection(format!(
                    "Failed to connect to SQLite: {}",
                    e
                )))
            })?;

        if !in_memory {
            sqlx::query("PRAGMA journal_mode = WAL")
                .execute(&pool)
                .await?;
            sqlx::query("PRAGMA synchronous = NORMAL")
                .execute(&pool)
                .await?;
        }

        sqlx::migrate!("./migrations/sqlite")
            .run(&pool)
            .await
            .map_err(|e| GatewayError::storage(format!("Failed to run migrations: {}", e)))?;

        Ok(Self { pool })
    }

    /// Number of stored counters
    pub async fn len(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM rate_counters")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("n")?)
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}

#[async_trait]
impl CounterBackend for SqliteCounterStore {
    async fn get(&self, key: &str) -> Result<Option<RateCounter>> {
        let row = sqlx::query(
            "SELECT counter_key, count, window_start_ms FROM rate_counters WHERE counter_key = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let count: i64 = row.try_get("count")?;
                Ok(Some(RateCounter {
                    key: row.try_get("counter_key")?,
                    count: u32::try_from(count).unwrap_or(u32::MAX),
                    window_start_ms: row.try_get("window_start_ms")?,
                }))
            }
            None => Ok(None),
        }
    }

    async fn put(&self, counter: &RateCounter, evict_at_ms: i64) -> Result<()> {
        sqlx::query(
            "INSERT INTO rate_counters (counter_key, count, window_start_ms, evict_at_ms)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(counter_key) DO UPDATE SET
                count = excluded.count,
                window_start_ms = excluded.window_start_ms,
                evict_at_ms = excluded.evict_at_ms",
        )
        .bind(&counter.key)
        .bind(i64::from(counter.count))
        .bind(counter.window_start_ms)
        .bind(evict_at_ms)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn sweep_expired(&self, now_ms: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM rate_counters WHERE evict_at_ms <= ?")
            .bind(now_ms)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

/// Named counters with per-name serialization
pub struct CounterService {
    store: Arc<dyn CounterBackend>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    clock: SharedClock,
    checks: AtomicU64,
}

impl CounterService {
    pub fn new(store: Arc<dyn CounterBackend>, clock: SharedClock) -> Self {
        Self {
            store,
            locks: DashMap::new(),
            clock,
            checks: AtomicU64::new(0),
        }
    }

    /// Count one request against `instance`; returns whether it is within `limit_per_minute`
    pub async fn check(&self, instance: &str, limit_per_minute: u32) -> Result<bool> {
        validate_instance(instance)?;

        if self.checks.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY_CHECKS
            == SWEEP_EVERY_CHECKS - 1
        {
            self.sweep().await?;
        }

        let lock = Arc::clone(
            &self
                .locks
                .entry(instance.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        );

        let outcome = {
            let _guard = lock.lock().await;
            let now_ms = self.clock.now_millis();
            let existing = self.store.get(instance).await;
            match existing {
                Ok(existing) => {
                    let (counter, allowed) =
                        apply_check(existing, instance, limit_per_minute, now_ms);
                    let evict_at_ms = now_ms + COUNTER_EVICTION_WINDOWS * RATE_WINDOW_MS;
                    self.store
                        .put(&counter, evict_at_ms)
                        .await
                        .map(|_| allowed)
                }
                Err(e) => Err(e),
            }
        };

        drop(lock);
        // Only the map holds the lock once no check for this name is in flight
        self.locks
            .remove_if(instance, |_, lock| Arc::strong_count(lock) == 1);

        outcome
    }

    /// Evict counters idle for two windows
    pub async fn sweep(&self) -> Result<u64> {
        let removed = self.store.sweep_expired(self.clock.now_millis()).await?;
        if removed > 0 {
            tracing::debug!(removed, "Evicted idle counters");
        }
        Ok(removed)
    }

    /// Number of names with a check in flight
    pub fn active_locks(&self) -> usize {
        self.locks.len()
    }
}

fn validate_instance(instance: &str) -> Result<()> {
    if instance.is_empty() || instance.len() > MAX_INSTANCE_LEN {
        return Err(GatewayError::validation("Invalid counter name"));
    }
    if !instance
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(GatewayError::validation("Invalid counter name"));
    }
    Ok(())
}

/// Counter service routes: `POST /{instance}/check`, `GET /healthz`
pub fn create_counter_routes(service: Arc<CounterService>) -> Router {
    Router::new()
        .route("/{instance}/check", post(check_handler))
        .route("/healthz", get(health_handler))
        .with_state(service)
}

async fn check_handler(
    State(service): State<Arc<CounterService>>,
    AxumPath(instance): AxumPath<String>,
    Json(request): Json<CheckRequest>,
) -> std::result::Result<Json<CheckResponse>, AppError> {
    let allowed = service.check(&instance, request.limit_per_minute).await?;
    Ok(Json(CheckResponse { allowed }))
}

async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Run the counter service until the listener fails
pub async fn serve_counters(config: &Config) -> Result<()> {
    let counters = config.counters.clone().unwrap_or_else(CounterServiceConfig::default);

    let store = Arc::new(SqliteCounterStore::new(&counters.dsn).await?);
    let service = Arc::new(CounterService::new(store, crate::clock::system_clock()));

    if counters.sweep_interval_secs > 0 {
        let sweeper = Arc::clone(&service);
        let interval = Duration::from_secs(counters.sweep_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(e) = sweeper.sweep().await {
                    tracing::warn!("Counter sweep failed: {}", e);
                }
            }
        });
    }

    let app = create_counter_routes(service).layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", counters.host, counters.port);
    let socket_addr: SocketAddr = addr
        .parse()
        .map_err(|e| GatewayError::config(format!("Invalid address {}: {}", addr, e)))?;

    tracing::info!("Starting counter service on {}", socket_addr);

    let listener = tokio::net::TcpListener::bind(socket_addr).await?;
    axum::serve(listener, app)
        .await
        .map_err(|e| GatewayError::config(format!("Server error: {}", e)))?;

    Ok(())
}
