/// Prometheus metrics for the session token lifecycle
#[cfg(feature = "metrics")]
use prometheus::{register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec};

#[cfg(feature = "metrics")]
use once_cell::sync::Lazy;

#[cfg(feature = "metrics")]
static TOKENS_ISSUED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "session_tokens_issued_total",
        "Total number of session tokens issued"
    )
    .expect("Failed to register tokens issued metric")
});

#[cfg(feature = "metrics")]
static TOKEN_VALIDATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "session_tokens_validation_total",
        "Total number of token validations by outcome",
        &["outcome"]
    )
    .expect("Failed to register token validation metric")
});

#[cfg(feature = "metrics")]
static TOKENS_REVOKED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "session_tokens_revoked_total",
        "Total number of revocation entries written",
        &["reason"]
    )
    .expect("Failed to register tokens revoked metric")
});

#[cfg(feature = "metrics")]
static TOKEN_REFRESHES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "session_tokens_refresh_total",
        "Total number of refresh attempts by outcome",
        &["outcome"]
    )
    .expect("Failed to register token refresh metric")
});

#[cfg(feature = "metrics")]
static LEDGER_PURGED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "session_tokens_ledger_purged_total",
        "Total number of revocation entries purged after expiry"
    )
    .expect("Failed to register ledger purged metric")
});

/// Metrics collector for token lifecycle events
#[cfg(feature = "metrics")]
pub struct TokenMetrics;

#[cfg(feature = "metrics")]
impl TokenMetrics {
    pub fn record_issued() {
        TOKENS_ISSUED.inc();
    }

    pub fn record_validation(outcome: &str) {
        TOKEN_VALIDATIONS.with_label_values(&[outcome]).inc();
    }

    pub fn record_revoked(reason: &str) {
        TOKENS_REVOKED.with_label_values(&[reason]).inc();
    }

    pub fn record_refresh(outcome: &str) {
        TOKEN_REFRESHES.with_label_values(&[outcome]).inc();
    }

    pub fn record_purged(count: usize) {
        LEDGER_PURGED.inc_by(count as u64);
    }
}

// No-op implementation when metrics feature is disabled
#[cfg(not(feature = "metrics"))]
pub struct TokenMetrics;

#[cfg(not(feature = "metrics"))]
impl TokenMetrics {
    pub fn record_issued() {}
    pub fn record_validation(_outcome: &str) {}
    pub fn record_revoked(_reason: &str) {}
    pub fn record_refresh(_outcome: &str) {}
    pub fn record_purged(_count: usize) {}
}

#[cfg(all(test, feature = "metrics"))]
mod tests {
    use super::*;

    #[test]
    fn test_counters_increment() {
        let before = TOKEN_VALIDATIONS.with_label_values(&["expired"]).get();
        TokenMetrics::record_validation("expired");
        assert!(TOKEN_VALIDATIONS.with_label_values(&["expired"]).get() > before);

        let purged_before = LEDGER_PURGED.get();
        TokenMetrics::record_purged(3);
        assert!(LEDGER_PURGED.get() >= purged_before + 3);
    }
}
