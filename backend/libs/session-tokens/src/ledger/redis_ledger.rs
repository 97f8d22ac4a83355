/// Redis-backed revocation ledger
///
/// Shares revocations across every instance that points at the same Redis.
///
/// ## Implementation
///
/// - **Key format**: `session:revoked:{jti}`, value is the JSON entry
/// - **Conditional insert**: `SET key value NX EX ttl`, so concurrent revokes
///   across processes resolve to a single winner inside Redis
/// - **TTL**: runs to the end of the entry's `expires_at` second; Redis drops
///   the key itself, which makes `purge_expired` a no-op
use super::{LedgerError, RevocationEntry, RevocationLedger};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::{Client, RedisError};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Shared Redis connection manager guarded by a Tokio mutex.
pub type SharedConnectionManager = Arc<Mutex<ConnectionManager>>;

const DEFAULT_KEY_PREFIX: &str = "session:revoked:";
const SCAN_BATCH: usize = 500;

#[derive(Clone)]
pub struct RedisRevocationLedger {
    redis: SharedConnectionManager,
    key_prefix: String,
}

impl RedisRevocationLedger {
    pub fn new(redis: SharedConnectionManager) -> Self {
        Self {
            redis,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }

    /// Open a dedicated connection manager for `redis_url`
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url).context("failed to construct Redis client")?;
        let manager = ConnectionManager::new(client)
            .await
            .context("failed to initialize Redis connection manager")?;

        info!("Redis revocation ledger connected");
        Ok(Self::new(Arc::new(Mutex::new(manager))))
    }

    /// Namespace keys, e.g. per environment or per test run
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    fn key(&self, token_id: &str) -> String {
        format!("{}{}", self.key_prefix, token_id)
    }

    async fn connection(&self) -> ConnectionManager {
        self.redis.lock().await.clone()
    }
}

/// Seconds until the key may go, at least 1 (Redis rejects `EX 0`)
///
/// `now` is truncated and expiry accepts `now == expires_at`, so the key must
/// survive the whole `expires_at` second: one extra second past the difference.
fn ttl_secs(expires_at: i64, now: i64) -> u64 {
    u64::try_from(expires_at.saturating_sub(now).saturating_add(1))
        .unwrap_or(0)
        .max(1)
}

fn backend_error(err: RedisError) -> LedgerError {
    LedgerError::Backend(err.to_string())
}

#[async_trait]
impl RevocationLedger for RedisRevocationLedger {
    async fn lookup(&self, token_id: &str) -> Result<Option<RevocationEntry>, LedgerError> {
        let mut conn = self.connection().await;
        let raw: Option<String> = redis::cmd("GET")
            .arg(self.key(token_id))
            .query_async(&mut conn)
            .await
            .map_err(backend_error)?;

        raw.map(|value| {
            serde_json::from_str(&value).map_err(|e| LedgerError::Corrupt {
                token_id: token_id.to_string(),
                detail: e.to_string(),
            })
        })
        .transpose()
    }

    async fn revoke(&self, entry: RevocationEntry) -> Result<bool, LedgerError> {
        let key = self.key(&entry.token_id);
        let ttl = ttl_secs(entry.expires_at, Utc::now().timestamp());
        let value = serde_json::to_string(&entry).map_err(|e| LedgerError::Corrupt {
            token_id: entry.token_id.clone(),
            detail: e.to_string(),
        })?;

        let mut conn = self.connection().await;
        let reply: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl)
            .query_async(&mut conn)
            .await
            .map_err(backend_error)?;

        let inserted = reply.is_some();
        debug!(
            jti = %entry.token_id,
            ttl = ttl,
            inserted = inserted,
            "Revocation written to Redis"
        );
        Ok(inserted)
    }

    async fn purge_expired(&self, _now: i64) -> Result<usize, LedgerError> {
        // keys carry their own TTL
        Ok(0)
    }

    async fn len(&self) -> Result<usize, LedgerError> {
        let pattern = format!("{}*", self.key_prefix);
        let mut conn = self.connection().await;
        let mut cursor: u64 = 0;
        let mut count = 0usize;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(backend_error)?;

            count += keys.len();
            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(count)
    }
}
