//! Session Token Library
//!
//! Issues signed, self-describing session tokens and tracks which of them
//! are no longer acceptable before their natural expiry.
//!
//! **Features**:
//! - Canonical claim sets with a unique `jti` per token
//! - HMAC (HS256/384/512) and asymmetric (RS*, PS*, ES*, EdDSA) signing
//! - Revocation ledger with in-memory (DashMap) and Redis backends
//! - Refresh rotation: the old token is superseded exactly once, even under
//!   concurrent refresh attempts
//! - Injectable clock, clock skew and refresh grace windows
//!
//! **Cargo features**: `metrics` (default) registers Prometheus counters;
//! `test-utils` exposes [`test_utils`] for downstream tests.
//!
//! ```ignore
//! let settings = TokenSettings::from_env()?;
//! let ledger = Arc::new(MemoryRevocationLedger::new());
//! let manager = SessionTokenManager::new(&settings, ledger)?;
//!
//! let token = manager.issue(&Identity::new(user_id, "alice"), None)?;
//! let claims = manager.validate(token.as_str()).await?;
//! let rotated = manager.refresh(token.as_str()).await?;
//! ```

pub mod claims;
pub mod clock;
pub mod config;
pub mod error;
pub mod ledger;
pub mod manager;
pub mod metrics;
pub mod secret_validation;
pub mod signer;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use claims::{ClaimSet, ClaimValue, ClaimsCodec, ExtraClaims, Identity, RESERVED_CLAIMS};
pub use clock::{Clock, SystemClock};
pub use config::{KeyMaterial, TokenSettings};
pub use error::{Result, TokenError, TokenErrorKind};
pub use ledger::{
    LedgerError, MemoryRevocationLedger, RedisRevocationLedger, RevocationEntry,
    RevocationLedger, RevocationReason,
};
pub use manager::{PurgeTask, SessionTokenManager};
pub use secret_validation::{validate_secret_strength, SecretStrength};
pub use signer::{SignedToken, TokenSigner};
