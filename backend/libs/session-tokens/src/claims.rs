//! Claims codec
//!
//! Maps an [`Identity`] plus optional caller-supplied claims into a canonical
//! [`ClaimSet`] and back. Serialization order is fixed: mandatory claims in
//! declaration order, then extra claims sorted by name (`BTreeMap`), so the
//! signed payload is deterministic.

use crate::error::{Result, TokenError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

/// Claim names owned by the codec. Extra claims may not use them.
pub const RESERVED_CLAIMS: &[&str] = &["sub", "name", "jti", "iat", "exp", "nbf", "iss", "aud"];

/// User identity as supplied by the identity store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub name: String,
}

impl Identity {
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Value of an extra claim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClaimValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl From<&str> for ClaimValue {
    fn from(value: &str) -> Self {
        ClaimValue::String(value.to_string())
    }
}

impl From<String> for ClaimValue {
    fn from(value: String) -> Self {
        ClaimValue::String(value)
    }
}

impl From<i64> for ClaimValue {
    fn from(value: i64) -> Self {
        ClaimValue::Integer(value)
    }
}

impl From<i32> for ClaimValue {
    fn from(value: i32) -> Self {
        ClaimValue::Integer(i64::from(value))
    }
}

impl From<bool> for ClaimValue {
    fn from(value: bool) -> Self {
        ClaimValue::Bool(value)
    }
}

impl From<f64> for ClaimValue {
    fn from(value: f64) -> Self {
        ClaimValue::Float(value)
    }
}

/// Caller-supplied claims, ordered by name
pub type ExtraClaims = BTreeMap<String, ClaimValue>;

/// Full claim collection embedded in one token. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimSet {
    /// Subject (identity id as UUID string)
    sub: String,
    /// Identity display name
    name: String,
    /// Token identifier used for revocation lookups
    jti: String,
    /// Issued at (Unix timestamp)
    iat: i64,
    /// Expiration time (Unix timestamp)
    exp: i64,
    #[serde(flatten)]
    extra: ExtraClaims,
}

impl ClaimSet {
    pub fn subject(&self) -> &str {
        &self.sub
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn token_id(&self) -> &str {
        &self.jti
    }

    pub fn issued_at(&self) -> i64 {
        self.iat
    }

    pub fn expires_at(&self) -> i64 {
        self.exp
    }

    pub fn extra(&self) -> &ExtraClaims {
        &self.extra
    }

    pub fn get(&self, claim: &str) -> Option<&ClaimValue> {
        self.extra.get(claim)
    }
}

/// Builds and reads claim sets for a fixed token lifetime
#[derive(Debug, Clone)]
pub struct ClaimsCodec {
    lifetime_secs: i64,
}

impl ClaimsCodec {
    pub fn new(lifetime: Duration) -> Self {
        Self {
            lifetime_secs: i64::try_from(lifetime.as_secs()).unwrap_or(i64::MAX),
        }
    }

    pub fn lifetime_secs(&self) -> i64 {
        self.lifetime_secs
    }

    /// Merge mandatory claims (fresh `jti`, `iat = now`, `exp = now + lifetime`)
    /// with extra claims.
    ///
    /// ## Errors
    ///
    /// - `ClaimConflict` if an extra claim uses a reserved name
    /// - `MalformedClaims` if a float claim is NaN or infinite
    pub fn build_claims(
        &self,
        identity: &Identity,
        extra: Option<ExtraClaims>,
        now: i64,
    ) -> Result<ClaimSet> {
        let extra = extra.unwrap_or_default();

        if let Some(conflict) = extra
            .keys()
            .find(|name| RESERVED_CLAIMS.contains(&name.as_str()))
        {
            return Err(TokenError::ClaimConflict(conflict.clone()));
        }

        // JSON has no NaN or infinity; serde_json would write `null`
        if let Some((name, _)) = extra
            .iter()
            .find(|(_, value)| matches!(value, ClaimValue::Float(f) if !f.is_finite()))
        {
            return Err(TokenError::MalformedClaims(format!(
                "claim {name} is not a finite number"
            )));
        }

        Ok(ClaimSet {
            sub: identity.id.to_string(),
            name: identity.name.clone(),
            jti: Uuid::new_v4().to_string(),
            iat: now,
            exp: now.saturating_add(self.lifetime_secs),
            extra,
        })
    }

    /// Fresh claim set for the same identity and extra claims as `previous`
    pub fn carry_forward(&self, previous: &ClaimSet, now: i64) -> Result<ClaimSet> {
        let identity = Self::extract_subject(previous)?;
        self.build_claims(&identity, Some(previous.extra.clone()), now)
    }

    /// Pull the subject identity back out of a claim set
    pub fn extract_subject(claims: &ClaimSet) -> Result<Identity> {
        if claims.sub.trim().is_empty() {
            return Err(TokenError::MalformedClaims("missing sub claim".to_string()));
        }

        let id = Uuid::parse_str(&claims.sub)
            .map_err(|e| TokenError::MalformedClaims(format!("invalid sub claim: {e}")))?;

        Ok(Identity {
            id,
            name: claims.name.clone(),
        })
    }
}
