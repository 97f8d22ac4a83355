//! Token lifecycle manager
//!
//! Orchestrates issuance, validation, refresh and revocation on top of the
//! claims codec, the signer and a revocation ledger.
//!
//! ## Lifecycle
//!
//! ```text
//! Issued → Valid (now <= exp + skew AND jti not in ledger) → Expired | Revoked
//! refresh(old): old Valid → Revoked (superseded), new Issued → Valid
//! ```
//!
//! ## Refresh
//!
//! Refresh runs under a per-identifier async mutex for the whole
//! validate → issue → revoke sequence. The old identifier is retired with a
//! conditional ledger insert after the new token is signed; if the insert
//! loses (another instance got there first) the new token is dropped and the
//! caller receives `AlreadyRefreshed`, or `Revoked` if an explicit revocation
//! won.

use crate::claims::{ClaimSet, ClaimsCodec, ExtraClaims, Identity};
use crate::clock::{Clock, SystemClock};
use crate::config::TokenSettings;
use crate::error::{Result, TokenError};
use crate::ledger::{LedgerError, RevocationEntry, RevocationLedger, RevocationReason};
use crate::metrics::TokenMetrics;
use crate::signer::{SignedToken, TokenSigner};
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct SessionTokenManager {
    codec: ClaimsCodec,
    signer: TokenSigner,
    ledger: Arc<dyn RevocationLedger>,
    clock: Arc<dyn Clock>,
    /// In-flight refreshes keyed by old token identifier
    refresh_locks: DashMap<String, Arc<Mutex<()>>>,
    ledger_timeout: Duration,
    refresh_grace_secs: i64,
    carry_forward_claims: bool,
}

impl SessionTokenManager {
    pub fn new(settings: &TokenSettings, ledger: Arc<dyn RevocationLedger>) -> Result<Self> {
        Self::with_clock(settings, ledger, Arc::new(SystemClock))
    }

    pub fn with_clock(
        settings: &TokenSettings,
        ledger: Arc<dyn RevocationLedger>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let signer = TokenSigner::from_settings(settings)?;

        info!(
            algorithm = ?signer.algorithm(),
            lifetime_secs = settings.lifetime_secs,
            refresh_grace_secs = settings.refresh_grace_secs,
            clock_skew_secs = settings.clock_skew_secs,
            "Session token manager initialized"
        );

        Ok(Self {
            codec: ClaimsCodec::new(settings.lifetime()),
            signer,
            ledger,
            clock,
            refresh_locks: DashMap::new(),
            ledger_timeout: settings.ledger_timeout(),
            refresh_grace_secs: i64::try_from(settings.refresh_grace_secs).unwrap_or(i64::MAX),
            carry_forward_claims: settings.carry_forward_claims,
        })
    }

    pub fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    pub fn ledger(&self) -> &Arc<dyn RevocationLedger> {
        &self.ledger
    }

    /// Sign a new token for `identity`. No ledger state is touched.
    ///
    /// ## Errors
    ///
    /// - `ClaimConflict` if `extra` uses a reserved claim name
    /// - `MalformedClaims` if a float claim is NaN or infinite
    pub fn issue(&self, identity: &Identity, extra: Option<ExtraClaims>) -> Result<SignedToken> {
        let claims = self
            .codec
            .build_claims(identity, extra, self.clock.now())?;
        let token = self.signer.sign(&claims)?;

        TokenMetrics::record_issued();
        debug!(
            jti = %token.token_id(),
            sub = %identity.id,
            expires_at = token.expires_at(),
            "Token issued"
        );
        Ok(token)
    }

    /// Signature, expiry, then revocation status
    ///
    /// The stateless checks run first so malformed or expired tokens never
    /// reach the ledger.
    pub async fn validate(&self, token: &str) -> Result<ClaimSet> {
        let result = self.validate_inner(token).await;

        match &result {
            Ok(claims) => {
                TokenMetrics::record_validation("ok");
                debug!(jti = %claims.token_id(), sub = %claims.subject(), "Token validated");
            }
            Err(err) => {
                TokenMetrics::record_validation(err.kind().as_str());
                warn!(kind = %err.kind(), "Token validation rejected");
            }
        }

        result
    }

    async fn validate_inner(&self, token: &str) -> Result<ClaimSet> {
        let claims = self.signer.verify(token, self.clock.now())?;

        if self.ledger_call(self.ledger.is_revoked(claims.token_id())).await? {
            return Err(TokenError::Revoked);
        }

        Ok(claims)
    }

    /// Validate and return the subject identity
    pub async fn authenticate(&self, token: &str) -> Result<Identity> {
        let claims = self.validate(token).await?;
        ClaimsCodec::extract_subject(&claims)
    }

    /// Replace `token` with a fresh one and retire it.
    ///
    /// Extra claims are carried forward when `carry_forward_claims` is set.
    ///
    /// ## Errors
    ///
    /// - Any verification kind of [`validate`](Self::validate)
    /// - `AlreadyRefreshed` if the token was already superseded
    /// - `Revoked` if the token was explicitly revoked, before or during refresh
    /// - `LedgerUnavailable` if the ledger or the refresh lock timed out
    pub async fn refresh(&self, token: &str) -> Result<SignedToken> {
        self.refresh_inner(token, None).await
    }

    /// Refresh with caller-supplied extra claims replacing the old ones
    pub async fn refresh_with_claims(
        &self,
        token: &str,
        extra: ExtraClaims,
    ) -> Result<SignedToken> {
        self.refresh_inner(token, Some(extra)).await
    }

    async fn refresh_inner(&self, token: &str, extra: Option<ExtraClaims>) -> Result<SignedToken> {
        let result = self.refresh_checked(token, extra).await;

        match &result {
            Ok(new_token) => {
                TokenMetrics::record_refresh("ok");
                info!(new_jti = %new_token.token_id(), "Token refreshed");
            }
            Err(TokenError::AlreadyRefreshed) => {
                TokenMetrics::record_refresh(TokenError::AlreadyRefreshed.kind().as_str());
                warn!("Refresh rejected: token already superseded");
            }
            Err(err) => {
                TokenMetrics::record_refresh(err.kind().as_str());
                warn!(kind = %err.kind(), "Refresh rejected");
            }
        }

        result
    }

    async fn refresh_checked(
        &self,
        token: &str,
        extra: Option<ExtraClaims>,
    ) -> Result<SignedToken> {
        let now = self.clock.now();
        let old = self.signer.verify_signature(token)?;
        self.signer
            .check_expiry(&old, now, self.refresh_grace_secs)?;

        let slot = RefreshSlot::acquire(&self.refresh_locks, old.token_id());
        let result = self.refresh_locked(slot.lock(), &old, extra, now).await;
        drop(slot);
        result
    }

    async fn refresh_locked(
        &self,
        lock: &Mutex<()>,
        old: &ClaimSet,
        extra: Option<ExtraClaims>,
        now: i64,
    ) -> Result<SignedToken> {
        let _guard = tokio::time::timeout(self.ledger_timeout, lock.lock())
            .await
            .map_err(|_| {
                TokenError::LedgerUnavailable(format!(
                    "timed out after {:?} waiting for refresh lock",
                    self.ledger_timeout
                ))
            })?;

        if let Some(entry) = self.ledger_call(self.ledger.lookup(old.token_id())).await? {
            return Err(retired_error(&entry));
        }

        let identity = ClaimsCodec::extract_subject(old)?;
        let claims = match extra {
            Some(supplied) => self.codec.build_claims(&identity, Some(supplied), now)?,
            None if self.carry_forward_claims => self.codec.carry_forward(old, now)?,
            None => self.codec.build_claims(&identity, None, now)?,
        };

        // Sign before retiring the old token: a signing failure must leave it usable.
        let new_token = self.signer.sign(&claims)?;

        let entry = RevocationEntry::new(
            old.token_id(),
            self.retention_deadline(old),
            RevocationReason::Superseded,
            now,
        );
        if !self.ledger_call(self.ledger.revoke(entry)).await? {
            // lost to a concurrent refresh or revoke; report whichever won
            let winner = self.ledger_call(self.ledger.lookup(old.token_id())).await?;
            return Err(winner.as_ref().map_or(TokenError::AlreadyRefreshed, retired_error));
        }

        TokenMetrics::record_revoked(RevocationReason::Superseded.as_str());
        info!(
            jti = %old.token_id(),
            new_jti = %new_token.token_id(),
            sub = %identity.id,
            "Token superseded by refresh"
        );
        Ok(new_token)
    }

    /// Revoke `token` until its natural expiry.
    ///
    /// Returns `Ok(false)` for tokens that are unparseable or not signed with
    /// our key, `Ok(true)` once the token is unusable (including tokens that
    /// already expired, for which nothing is written). Revoking twice is not
    /// an error.
    pub async fn revoke(&self, token: &str) -> Result<bool> {
        let claims = match self.signer.verify_signature(token) {
            Ok(claims) => claims,
            Err(err @ (TokenError::Malformed(_) | TokenError::BadSignature)) => {
                warn!(kind = %err.kind(), "Revocation skipped: token not verifiable");
                return Ok(false);
            }
            Err(err) => return Err(err),
        };

        let now = self.clock.now();
        if self
            .signer
            .check_expiry(&claims, now, self.refresh_grace_secs)
            .is_err()
        {
            debug!(jti = %claims.token_id(), "Revocation skipped: token already expired");
            return Ok(true);
        }

        let entry = RevocationEntry::new(
            claims.token_id(),
            self.retention_deadline(&claims),
            RevocationReason::Revoked,
            now,
        );
        let expires_at = entry.expires_at;

        if self.ledger_call(self.ledger.revoke(entry)).await? {
            TokenMetrics::record_revoked(RevocationReason::Revoked.as_str());
            info!(
                jti = %claims.token_id(),
                sub = %claims.subject(),
                expires_at = expires_at,
                "Token revoked"
            );
        } else {
            debug!(jti = %claims.token_id(), "Token was already revoked");
        }

        Ok(true)
    }

    /// Ledger lookup by the token's identifier, without verifying the token
    ///
    /// ## Errors
    ///
    /// `Malformed` if no identifier can be extracted.
    pub async fn is_revoked(&self, token: &str) -> Result<bool> {
        let claims = TokenSigner::inspect(token)?;
        self.ledger_call(self.ledger.is_revoked(claims.token_id())).await
    }

    /// Drop ledger entries whose tokens can no longer pass expiry checks
    pub async fn purge_expired(&self) -> Result<usize> {
        let removed = self
            .ledger_call(self.ledger.purge_expired(self.clock.now()))
            .await?;
        TokenMetrics::record_purged(removed);
        Ok(removed)
    }

    /// Last instant any operation would still accept the token
    fn retention_deadline(&self, claims: &ClaimSet) -> i64 {
        claims
            .expires_at()
            .saturating_add(self.signer.clock_skew_secs())
            .saturating_add(self.refresh_grace_secs)
    }

    async fn ledger_call<T>(
        &self,
        op: impl Future<Output = std::result::Result<T, LedgerError>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.ledger_timeout, op).await {
            Ok(result) => result.map_err(TokenError::from),
            Err(_) => Err(TokenError::from(LedgerError::Timeout(self.ledger_timeout))),
        }
    }
}

/// Refresh failure for an identifier already in the ledger
fn retired_error(entry: &RevocationEntry) -> TokenError {
    match entry.reason {
        RevocationReason::Superseded => TokenError::AlreadyRefreshed,
        RevocationReason::Revoked => TokenError::Revoked,
    }
}

/// One refresh's claim on the per-identifier lock
///
/// Dropping the slot (including when the refresh future is cancelled) removes
/// the map entry unless another refresh still holds it.
struct RefreshSlot<'a> {
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    token_id: String,
    lock: Arc<Mutex<()>>,
}

impl<'a> RefreshSlot<'a> {
    fn acquire(locks: &'a DashMap<String, Arc<Mutex<()>>>, token_id: &str) -> Self {
        let lock = Arc::clone(&locks.entry(token_id.to_string()).or_default());
        Self {
            locks,
            token_id: token_id.to_string(),
            lock,
        }
    }

    fn lock(&self) -> &Mutex<()> {
        &self.lock
    }
}

impl Drop for RefreshSlot<'_> {
    fn drop(&mut self) {
        // map entry plus this slot; the shard lock keeps new clones out
        self.locks.remove_if(&self.token_id, |_, lock| {
            Arc::ptr_eq(lock, &self.lock) && Arc::strong_count(lock) == 2
        });
    }
}

/// Periodic ledger purge, stopped when dropped
pub struct PurgeTask {
    shutdown_tx: watch::Sender<()>,
    handle: JoinHandle<()>,
}

impl PurgeTask {
    pub fn spawn(manager: Arc<SessionTokenManager>, interval: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(());

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        info!("Revocation purge task shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        match manager.purge_expired().await {
                            Ok(removed) => debug!(removed = removed, "Revocation purge completed"),
                            Err(err) => warn!(error = %err, "Revocation purge failed"),
                        }
                    }
                }
            }
        });

        Self {
            shutdown_tx,
            handle,
        }
    }
}

impl Drop for PurgeTask {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
        self.handle.abort();
    }
}
