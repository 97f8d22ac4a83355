//! Configuration for the session token core
//!
//! Loads settings from `SESSION_TOKEN_*` environment variables, falling back
//! to defaults for everything except key material.
//!
//! # Example
//!
//! ```no_run
//! use session_tokens::config::TokenSettings;
//!
//! fn main() -> anyhow::Result<()> {
//!     let settings = TokenSettings::from_env()?;
//!     println!("token lifetime: {}s", settings.lifetime_secs);
//!     Ok(())
//! }
//! ```

use crate::error::TokenError;
use crate::secret_validation::{validate_secret_strength, SecretStrength};
use anyhow::{Context, Result};
use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;
use zeroize::Zeroize;

const DEFAULT_ALGORITHM: &str = "HS256";
const DEFAULT_LIFETIME_SECS: u64 = 3600; // 1 hour
const DEFAULT_LEDGER_TIMEOUT_MS: u64 = 2000;

/// Session token settings
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenSettings {
    /// JWS algorithm name (HS256, RS256, ES256, EdDSA, ...)
    pub algorithm: String,
    /// HMAC secret for HS* algorithms
    pub secret: Option<String>,
    /// PEM private key for asymmetric algorithms
    pub private_key_pem: Option<String>,
    /// PEM public key for asymmetric algorithms
    pub public_key_pem: Option<String>,
    pub lifetime_secs: u64,
    /// How long after expiry a token may still be refreshed
    pub refresh_grace_secs: u64,
    pub clock_skew_secs: u64,
    pub ledger_timeout_ms: u64,
    /// Carry extra claims from the old token into the refreshed one
    pub carry_forward_claims: bool,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            algorithm: DEFAULT_ALGORITHM.to_string(),
            secret: None,
            private_key_pem: None,
            public_key_pem: None,
            lifetime_secs: DEFAULT_LIFETIME_SECS,
            refresh_grace_secs: 0,
            clock_skew_secs: 0,
            ledger_timeout_ms: DEFAULT_LEDGER_TIMEOUT_MS,
            carry_forward_claims: true,
        }
    }
}

impl std::fmt::Debug for TokenSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSettings")
            .field("algorithm", &self.algorithm)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field(
                "private_key_pem",
                &self.private_key_pem.as_ref().map(|_| "<redacted>"),
            )
            .field("public_key_pem", &self.public_key_pem.is_some())
            .field("lifetime_secs", &self.lifetime_secs)
            .field("refresh_grace_secs", &self.refresh_grace_secs)
            .field("clock_skew_secs", &self.clock_skew_secs)
            .field("ledger_timeout_ms", &self.ledger_timeout_ms)
            .field("carry_forward_claims", &self.carry_forward_claims)
            .finish()
    }
}

impl TokenSettings {
    /// HS256 settings with the given secret and default lifetimes
    pub fn hmac(secret: impl Into<String>) -> Self {
        Self {
            secret: Some(secret.into()),
            ..Self::default()
        }
    }

    /// Asymmetric settings from a PEM key pair
    pub fn asymmetric(
        algorithm: &str,
        private_key_pem: impl Into<String>,
        public_key_pem: impl Into<String>,
    ) -> Self {
        Self {
            algorithm: algorithm.to_string(),
            private_key_pem: Some(private_key_pem.into()),
            public_key_pem: Some(public_key_pem.into()),
            ..Self::default()
        }
    }

    /// Load from environment variables
    ///
    /// - `SESSION_TOKEN_ALGORITHM` (default: HS256)
    /// - `SESSION_TOKEN_SECRET` (HS* algorithms)
    /// - `SESSION_TOKEN_PRIVATE_KEY` / `SESSION_TOKEN_PUBLIC_KEY` (PEM, asymmetric algorithms)
    /// - `SESSION_TOKEN_LIFETIME_SECS` (default: 3600)
    /// - `SESSION_TOKEN_REFRESH_GRACE_SECS` (default: 0)
    /// - `SESSION_TOKEN_CLOCK_SKEW_SECS` (default: 0)
    /// - `SESSION_TOKEN_LEDGER_TIMEOUT_MS` (default: 2000)
    /// - `SESSION_TOKEN_CARRY_FORWARD_CLAIMS` (default: true)
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            algorithm: env::var("SESSION_TOKEN_ALGORITHM")
                .unwrap_or_else(|_| DEFAULT_ALGORITHM.to_string()),
            secret: env::var("SESSION_TOKEN_SECRET").ok(),
            private_key_pem: env::var("SESSION_TOKEN_PRIVATE_KEY").ok(),
            public_key_pem: env::var("SESSION_TOKEN_PUBLIC_KEY").ok(),
            lifetime_secs: env::var("SESSION_TOKEN_LIFETIME_SECS")
                .unwrap_or_else(|_| DEFAULT_LIFETIME_SECS.to_string())
                .parse()
                .context("Invalid SESSION_TOKEN_LIFETIME_SECS")?,
            refresh_grace_secs: env::var("SESSION_TOKEN_REFRESH_GRACE_SECS")
                .unwrap_or_else(|_| "0".to_string())
                .parse()
                .context("Invalid SESSION_TOKEN_REFRESH_GRACE_SECS")?,
            clock_skew_secs: env::var("SESSION_TOKEN_CLOCK_SKEW_SECS")
                .unwrap_or_else(|_| "0".to_string())
                .parse()
                .context("Invalid SESSION_TOKEN_CLOCK_SKEW_SECS")?,
            ledger_timeout_ms: env::var("SESSION_TOKEN_LEDGER_TIMEOUT_MS")
                .unwrap_or_else(|_| DEFAULT_LEDGER_TIMEOUT_MS.to_string())
                .parse()
                .context("Invalid SESSION_TOKEN_LEDGER_TIMEOUT_MS")?,
            carry_forward_claims: env::var("SESSION_TOKEN_CARRY_FORWARD_CLAIMS")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .context("Invalid SESSION_TOKEN_CARRY_FORWARD_CLAIMS")?,
        })
    }

    pub fn lifetime(&self) -> Duration {
        Duration::from_secs(self.lifetime_secs)
    }

    pub fn refresh_grace(&self) -> Duration {
        Duration::from_secs(self.refresh_grace_secs)
    }

    pub fn clock_skew(&self) -> Duration {
        Duration::from_secs(self.clock_skew_secs)
    }

    pub fn ledger_timeout(&self) -> Duration {
        Duration::from_millis(self.ledger_timeout_ms)
    }

    pub fn signing_algorithm(&self) -> Result<Algorithm, TokenError> {
        Algorithm::from_str(self.algorithm.trim()).map_err(|_| {
            TokenError::Configuration(format!("unsupported algorithm: {}", self.algorithm))
        })
    }

    /// Resolve the configured key material for the configured algorithm
    ///
    /// ## Errors
    ///
    /// `Configuration` if the algorithm is unknown, the required key material
    /// is missing, or an HMAC secret is classified weak.
    pub fn key_material(&self) -> Result<KeyMaterial, TokenError> {
        let algorithm = self.signing_algorithm()?;

        if is_hmac(algorithm) {
            let secret = self.secret.as_deref().ok_or_else(|| {
                TokenError::Configuration(format!("{:?} requires a secret", algorithm))
            })?;

            match validate_secret_strength(secret.as_bytes()) {
                SecretStrength::Weak => {
                    return Err(TokenError::Configuration(
                        "signing secret is too weak".to_string(),
                    ))
                }
                SecretStrength::Acceptable => {
                    warn!("Signing secret is acceptable but shorter than recommended");
                }
                SecretStrength::Strong => {}
            }

            return Ok(KeyMaterial::Secret(secret.as_bytes().to_vec()));
        }

        match (&self.private_key_pem, &self.public_key_pem) {
            (Some(private_key_pem), Some(public_key_pem)) => Ok(KeyMaterial::Pem {
                private_key_pem: private_key_pem.clone(),
                public_key_pem: public_key_pem.clone(),
            }),
            _ => Err(TokenError::Configuration(format!(
                "{:?} requires both private and public PEM keys",
                algorithm
            ))),
        }
    }
}

pub(crate) fn is_hmac(algorithm: Algorithm) -> bool {
    matches!(
        algorithm,
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
    )
}

/// Signing and verification key material. Secret bytes are zeroed on drop.
pub enum KeyMaterial {
    Secret(Vec<u8>),
    Pem {
        private_key_pem: String,
        public_key_pem: String,
    },
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyMaterial::Secret(_) => f.write_str("KeyMaterial::Secret(<redacted>)"),
            KeyMaterial::Pem { .. } => f.write_str("KeyMaterial::Pem(<redacted>)"),
        }
    }
}

impl Drop for KeyMaterial {
    fn drop(&mut self) {
        match self {
            KeyMaterial::Secret(bytes) => bytes.zeroize(),
            KeyMaterial::Pem {
                private_key_pem, ..
            } => private_key_pem.zeroize(),
        }
    }
}
