//! Revocation ledger
//!
//! Tracks token identifiers that must be rejected even though their signature
//! and expiry still pass. Entries carry the instant after which the token
//! would be rejected by expiry alone, so they can be dropped from then on.
//!
//! ## Backends
//!
//! - [`MemoryRevocationLedger`]: process-local, DashMap backed
//! - [`RedisRevocationLedger`]: shared across instances, native key TTL

pub mod memory;
pub mod redis_ledger;

pub use memory::MemoryRevocationLedger;
pub use redis_ledger::RedisRevocationLedger;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger backend error: {0}")]
    Backend(String),

    #[error("ledger operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("corrupt ledger entry for {token_id}: {detail}")]
    Corrupt { token_id: String, detail: String },
}

/// Why a token identifier is in the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevocationReason {
    /// Explicitly revoked (logout, security incident)
    Revoked,
    /// Replaced by a refresh
    Superseded,
}

impl RevocationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevocationReason::Revoked => "revoked",
            RevocationReason::Superseded => "superseded",
        }
    }
}

impl std::str::FromStr for RevocationReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "revoked" => Ok(RevocationReason::Revoked),
            "superseded" => Ok(RevocationReason::Superseded),
            other => Err(format!("unknown revocation reason: {other}")),
        }
    }
}

/// One revoked token identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationEntry {
    pub token_id: String,
    /// Unix seconds after which the token is rejected by expiry alone
    pub expires_at: i64,
    pub reason: RevocationReason,
    pub revoked_at: i64,
}

impl RevocationEntry {
    pub fn new(
        token_id: impl Into<String>,
        expires_at: i64,
        reason: RevocationReason,
        revoked_at: i64,
    ) -> Self {
        Self {
            token_id: token_id.into(),
            expires_at,
            reason,
            revoked_at,
        }
    }

    /// Safe to drop once `now` has passed the token's expiry
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at < now
    }
}

/// Storage contract for revoked token identifiers
///
/// All methods must be safe under concurrent use. `revoke` is a conditional
/// insert: exactly one of any number of concurrent calls for the same
/// identifier observes `true`.
#[async_trait]
pub trait RevocationLedger: Send + Sync {
    /// Entry for `token_id`, if present
    async fn lookup(&self, token_id: &str) -> Result<Option<RevocationEntry>, LedgerError>;

    async fn is_revoked(&self, token_id: &str) -> Result<bool, LedgerError> {
        Ok(self.lookup(token_id).await?.is_some())
    }

    /// Insert `entry` unless its identifier is already present.
    ///
    /// Returns `true` if this call created the entry, `false` if it already
    /// existed (the existing entry is left untouched).
    async fn revoke(&self, entry: RevocationEntry) -> Result<bool, LedgerError>;

    /// Remove entries whose `expires_at < now`; returns how many were removed.
    /// Entries with `expires_at >= now` are never removed.
    async fn purge_expired(&self, now: i64) -> Result<usize, LedgerError>;

    /// Number of tracked entries (for monitoring)
    async fn len(&self) -> Result<usize, LedgerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_expiry_is_strict() {
        let entry = RevocationEntry::new("jti", 100, RevocationReason::Revoked, 50);
        assert!(!entry.is_expired(99));
        assert!(!entry.is_expired(100));
        assert!(entry.is_expired(101));
    }

    #[test]
    fn test_reason_round_trip() {
        for reason in [RevocationReason::Revoked, RevocationReason::Superseded] {
            assert_eq!(reason.as_str().parse::<RevocationReason>(), Ok(reason));
        }
        assert!("other".parse::<RevocationReason>().is_err());
    }
}
