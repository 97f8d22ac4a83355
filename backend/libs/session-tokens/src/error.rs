//! Error taxonomy for session token operations
//!
//! Every rejected operation maps to exactly one [`TokenErrorKind`] so callers
//! (audit logging, rate limiting) can tell *why* a token was refused.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TokenError>;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Malformed token: {0}")]
    Malformed(String),

    #[error("Invalid token signature")]
    BadSignature,

    #[error("Token expired")]
    Expired,

    #[error("Token revoked")]
    Revoked,

    #[error("Claim conflicts with a mandatory claim: {0}")]
    ClaimConflict(String),

    #[error("Malformed claims: {0}")]
    MalformedClaims(String),

    #[error("Token was already refreshed")]
    AlreadyRefreshed,

    #[error("Revocation ledger unavailable: {0}")]
    LedgerUnavailable(String),

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Discriminant of [`TokenError`] without its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenErrorKind {
    Malformed,
    BadSignature,
    Expired,
    Revoked,
    ClaimConflict,
    MalformedClaims,
    AlreadyRefreshed,
    LedgerUnavailable,
    Signing,
    Configuration,
}

impl TokenErrorKind {
    /// Stable label used in logs and metric labels
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenErrorKind::Malformed => "malformed",
            TokenErrorKind::BadSignature => "bad_signature",
            TokenErrorKind::Expired => "expired",
            TokenErrorKind::Revoked => "revoked",
            TokenErrorKind::ClaimConflict => "claim_conflict",
            TokenErrorKind::MalformedClaims => "malformed_claims",
            TokenErrorKind::AlreadyRefreshed => "already_refreshed",
            TokenErrorKind::LedgerUnavailable => "ledger_unavailable",
            TokenErrorKind::Signing => "signing",
            TokenErrorKind::Configuration => "configuration",
        }
    }
}

impl std::fmt::Display for TokenErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TokenError {
    pub fn kind(&self) -> TokenErrorKind {
        match self {
            TokenError::Malformed(_) => TokenErrorKind::Malformed,
            TokenError::BadSignature => TokenErrorKind::BadSignature,
            TokenError::Expired => TokenErrorKind::Expired,
            TokenError::Revoked => TokenErrorKind::Revoked,
            TokenError::ClaimConflict(_) => TokenErrorKind::ClaimConflict,
            TokenError::MalformedClaims(_) => TokenErrorKind::MalformedClaims,
            TokenError::AlreadyRefreshed => TokenErrorKind::AlreadyRefreshed,
            TokenError::LedgerUnavailable(_) => TokenErrorKind::LedgerUnavailable,
            TokenError::Signing(_) => TokenErrorKind::Signing,
            TokenError::Configuration(_) => TokenErrorKind::Configuration,
        }
    }

    /// Only transient storage failures may be retried.
    ///
    /// Verification failures are cryptographic or temporal facts, and
    /// `AlreadyRefreshed` must reach the caller untouched.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TokenError::LedgerUnavailable(_))
    }

    /// True for the four kinds produced by checking a presented token
    pub fn is_verification_failure(&self) -> bool {
        matches!(
            self,
            TokenError::Malformed(_)
                | TokenError::BadSignature
                | TokenError::Expired
                | TokenError::Revoked
        )
    }
}

// Conversions from external error types
impl From<crate::ledger::LedgerError> for TokenError {
    fn from(err: crate::ledger::LedgerError) -> Self {
        tracing::error!(error = %err, "Revocation ledger error");
        TokenError::LedgerUnavailable(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => TokenError::BadSignature,
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidToken
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_)
            | ErrorKind::MissingRequiredClaim(_)
            | ErrorKind::MissingAlgorithm
            | ErrorKind::InvalidAlgorithmName => TokenError::Malformed(err.to_string()),
            ErrorKind::InvalidEcdsaKey
            | ErrorKind::InvalidRsaKey(_)
            | ErrorKind::RsaFailedSigning
            | ErrorKind::InvalidKeyFormat => TokenError::Signing(err.to_string()),
            _ => TokenError::Malformed(err.to_string()),
        }
    }
}
