/// In-memory revocation ledger
///
/// # Guarantees
/// - O(1) lookup and conditional insert (DashMap entry API, shard-locked)
/// - Concurrent revokes of one identifier: exactly one inserts
/// - No automatic expiry; entries stay until `purge_expired` passes them
use super::{LedgerError, RevocationEntry, RevocationLedger};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Default)]
pub struct MemoryRevocationLedger {
    entries: Arc<DashMap<String, RevocationEntry>>,
}

impl MemoryRevocationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current number of tracked entries
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    /// Clear all entries (for testing)
    #[cfg(test)]
    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[async_trait]
impl RevocationLedger for MemoryRevocationLedger {
    async fn lookup(&self, token_id: &str) -> Result<Option<RevocationEntry>, LedgerError> {
        Ok(self.entries.get(token_id).map(|entry| entry.value().clone()))
    }

    async fn revoke(&self, entry: RevocationEntry) -> Result<bool, LedgerError> {
        match self.entries.entry(entry.token_id.clone()) {
            Entry::Occupied(existing) => {
                debug!(
                    jti = %existing.key(),
                    reason = existing.get().reason.as_str(),
                    "Token already in revocation ledger"
                );
                Ok(false)
            }
            Entry::Vacant(slot) => {
                slot.insert(entry);
                Ok(true)
            }
        }
    }

    async fn purge_expired(&self, now: i64) -> Result<usize, LedgerError> {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before.saturating_sub(self.entries.len());

        if removed > 0 {
            info!(
                removed = removed,
                remaining = self.entries.len(),
                "Purged expired revocation entries"
            );
        }
        Ok(removed)
    }

    async fn len(&self) -> Result<usize, LedgerError> {
        Ok(self.entries.len())
    }
}
