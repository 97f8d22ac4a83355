/// Token signing and verification
///
/// Produces compact JWS tokens (`header.payload.signature`, base64url
/// segments) from a [`ClaimSet`] and checks presented tokens.
///
/// ## Security Design
///
/// - **Single algorithm**: the verifier accepts only the configured algorithm;
///   a header naming any other algorithm is a signature failure
/// - **Pure**: verification depends only on the token bytes, the key and the
///   supplied time, never on ledger state
/// - **Ordered checks**: format, then signature, then claims, then expiry
use crate::claims::ClaimSet;
use crate::config::{is_hmac, KeyMaterial, TokenSettings};
use crate::error::{Result, TokenError};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use std::time::Duration;

/// A signed token and the metadata needed to track it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedToken {
    encoded: String,
    token_id: String,
    issued_at: i64,
    expires_at: i64,
}

impl SignedToken {
    /// Compact wire form
    pub fn as_str(&self) -> &str {
        &self.encoded
    }

    pub fn token_id(&self) -> &str {
        &self.token_id
    }

    pub fn issued_at(&self) -> i64 {
        self.issued_at
    }

    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }

    pub fn into_string(self) -> String {
        self.encoded
    }
}

impl std::fmt::Display for SignedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encoded)
    }
}

impl AsRef<str> for SignedToken {
    fn as_ref(&self) -> &str {
        &self.encoded
    }
}

pub struct TokenSigner {
    algorithm: Algorithm,
    encoding: EncodingKey,
    decoding: DecodingKey,
    clock_skew_secs: i64,
}

impl TokenSigner {
    /// Build a signer for `algorithm` from the given key material
    ///
    /// ## Errors
    ///
    /// - `Configuration` if the key material kind does not fit the algorithm
    /// - `Signing` if the PEM keys cannot be parsed
    pub fn new(algorithm: Algorithm, material: &KeyMaterial, clock_skew: Duration) -> Result<Self> {
        let (encoding, decoding) = match material {
            KeyMaterial::Secret(secret) if is_hmac(algorithm) => (
                EncodingKey::from_secret(secret),
                DecodingKey::from_secret(secret),
            ),
            KeyMaterial::Pem {
                private_key_pem,
                public_key_pem,
            } if !is_hmac(algorithm) => pem_keys(algorithm, private_key_pem, public_key_pem)?,
            _ => {
                return Err(TokenError::Configuration(format!(
                    "key material does not match algorithm {:?}",
                    algorithm
                )))
            }
        };

        Ok(Self {
            algorithm,
            encoding,
            decoding,
            clock_skew_secs: i64::try_from(clock_skew.as_secs()).unwrap_or(i64::MAX),
        })
    }

    pub fn from_settings(settings: &TokenSettings) -> Result<Self> {
        let material = settings.key_material()?;
        Self::new(
            settings.signing_algorithm()?,
            &material,
            settings.clock_skew(),
        )
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn clock_skew_secs(&self) -> i64 {
        self.clock_skew_secs
    }

    /// Serialize `claims` canonically and sign them
    pub fn sign(&self, claims: &ClaimSet) -> Result<SignedToken> {
        if claims.expires_at() < claims.issued_at() {
            return Err(TokenError::Signing(
                "expiry precedes issued-at".to_string(),
            ));
        }

        let encoded = encode(&Header::new(self.algorithm), claims, &self.encoding)
            .map_err(|e| TokenError::Signing(format!("Failed to encode token: {e}")))?;

        Ok(SignedToken {
            encoded,
            token_id: claims.token_id().to_string(),
            issued_at: claims.issued_at(),
            expires_at: claims.expires_at(),
        })
    }

    /// Check format and signature only, ignoring expiry
    ///
    /// ## Errors
    ///
    /// - `Malformed` if the token cannot be parsed or breaks `exp >= iat`
    /// - `BadSignature` if the signature or header algorithm does not match
    pub fn verify_signature(&self, token: &str) -> Result<ClaimSet> {
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;

        let claims = decode::<ClaimSet>(token, &self.decoding, &validation)?.claims;

        if claims.expires_at() < claims.issued_at() {
            return Err(TokenError::Malformed(
                "expiry precedes issued-at".to_string(),
            ));
        }

        Ok(claims)
    }

    /// Full stateless verification: format, signature and expiry at `now`
    pub fn verify(&self, token: &str, now: i64) -> Result<ClaimSet> {
        let claims = self.verify_signature(token)?;
        self.check_expiry(&claims, now, 0)?;
        Ok(claims)
    }

    /// `Expired` once `now` passes `exp + clock_skew + extra_grace_secs`
    pub fn check_expiry(&self, claims: &ClaimSet, now: i64, extra_grace_secs: i64) -> Result<()> {
        let deadline = claims
            .expires_at()
            .saturating_add(self.clock_skew_secs)
            .saturating_add(extra_grace_secs);

        if now > deadline {
            return Err(TokenError::Expired);
        }
        Ok(())
    }

    /// Decode the payload without checking the signature
    ///
    /// Only for lookups that must not trust the content, such as checking the
    /// ledger for the token identifier.
    pub fn inspect(token: &str) -> Result<ClaimSet> {
        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 3 {
            return Err(TokenError::Malformed("Invalid JWT format".to_string()));
        }

        let payload = URL_SAFE_NO_PAD
            .decode(parts[1])
            .map_err(|e| TokenError::Malformed(format!("Failed to decode JWT payload: {e}")))?;

        serde_json::from_slice(&payload)
            .map_err(|e| TokenError::Malformed(format!("Failed to parse JWT claims: {e}")))
    }
}

fn pem_keys(
    algorithm: Algorithm,
    private_key_pem: &str,
    public_key_pem: &str,
) -> Result<(EncodingKey, DecodingKey)> {
    let private = private_key_pem.as_bytes();
    let public = public_key_pem.as_bytes();

    let keys = match algorithm {
        Algorithm::ES256 | Algorithm::ES384 => (
            EncodingKey::from_ec_pem(private)?,
            DecodingKey::from_ec_pem(public)?,
        ),
        Algorithm::EdDSA => (
            EncodingKey::from_ed_pem(private)?,
            DecodingKey::from_ed_pem(public)?,
        ),
        _ => (
            EncodingKey::from_rsa_pem(private)?,
            DecodingKey::from_rsa_pem(public)?,
        ),
    };

    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::{ClaimsCodec, ExtraClaims, Identity};
    use crate::test_utils::{TEST_PRIVATE_KEY, TEST_PUBLIC_KEY, TEST_SECRET};
    use uuid::Uuid;

    const NOW: i64 = 1_700_000_000;

    fn hs_signer() -> TokenSigner {
        TokenSigner::from_settings(&TokenSettings::hmac(TEST_SECRET)).unwrap()
    }

    fn rs_signer() -> TokenSigner {
        TokenSigner::from_settings(&TokenSettings::asymmetric(
            "RS256",
            TEST_PRIVATE_KEY,
            TEST_PUBLIC_KEY,
        ))
        .unwrap()
    }

    fn claims() -> ClaimSet {
        let mut extra = ExtraClaims::new();
        extra.insert("role".into(), "admin".into());
        ClaimsCodec::new(Duration::from_secs(3600))
            .build_claims(&Identity::new(Uuid::new_v4(), "alice"), Some(extra), NOW)
            .unwrap()
    }

    fn flip_payload_bit(token: &str, byte: usize, bit: u8) -> String {
        let parts: Vec<&str> = token.split('.').collect();
        let mut payload = URL_SAFE_NO_PAD.decode(parts[1]).unwrap();
        let index = byte % payload.len();
        payload[index] ^= 1 << bit;
        format!("{}.{}.{}", parts[0], URL_SAFE_NO_PAD.encode(payload), parts[2])
    }

    #[test]
    fn test_sign_produces_three_segments() {
        let token = hs_signer().sign(&claims()).unwrap();
        assert_eq!(token.as_str().matches('.').count(), 2);
        assert!(!token.as_str().contains('='));
    }

    #[test]
    fn test_hs256_round_trip() {
        let signer = hs_signer();
        let original = claims();
        let token = signer.sign(&original).unwrap();

        let verified = signer.verify(token.as_str(), NOW + 1).unwrap();
        assert_eq!(verified, original);
        assert_eq!(token.token_id(), original.token_id());
        assert_eq!(token.expires_at(), original.expires_at());
    }

    #[test]
    fn test_rs256_round_trip() {
        let signer = rs_signer();
        let original = claims();
        let token = signer.sign(&original).unwrap();
        assert_eq!(signer.verify(token.as_str(), NOW).unwrap(), original);
    }

    #[test]
    fn test_signing_is_deterministic_for_hmac() {
        let signer = hs_signer();
        let original = claims();
        assert_eq!(signer.sign(&original).unwrap(), signer.sign(&original).unwrap());
    }

    #[test]
    fn test_expiry_boundary() {
        let signer = hs_signer();
        let original = claims();
        let token = signer.sign(&original).unwrap();
        let exp = original.expires_at();

        assert!(signer.verify(token.as_str(), exp - 1).is_ok());
        assert!(signer.verify(token.as_str(), exp).is_ok());
        assert!(matches!(
            signer.verify(token.as_str(), exp + 1),
            Err(TokenError::Expired)
        ));
    }

    #[test]
    fn test_clock_skew_extends_acceptance() {
        let mut settings = TokenSettings::hmac(TEST_SECRET);
        settings.clock_skew_secs = 30;
        let signer = TokenSigner::from_settings(&settings).unwrap();
        let original = claims();
        let token = signer.sign(&original).unwrap();

        assert!(signer.verify(token.as_str(), original.expires_at() + 30).is_ok());
        assert!(matches!(
            signer.verify(token.as_str(), original.expires_at() + 31),
            Err(TokenError::Expired)
        ));
    }

    #[test]
    fn test_verify_signature_ignores_expiry() {
        let signer = hs_signer();
        let original = claims();
        let token = signer.sign(&original).unwrap();
        assert!(signer.verify_signature(token.as_str()).is_ok());
        assert!(signer.verify(token.as_str(), original.expires_at() + 1000).is_err());
    }

    #[test]
    fn test_tampered_payload_bad_signature() {
        let signer = hs_signer();
        let token = signer.sign(&claims()).unwrap();

        for byte in [0usize, 7, 20, 45, 90] {
            for bit in [0u8, 3, 6] {
                let tampered = flip_payload_bit(token.as_str(), byte, bit);
                assert!(
                    matches!(signer.verify(&tampered, NOW), Err(TokenError::BadSignature)),
                    "byte {byte} bit {bit} accepted"
                );
            }
        }
    }

    #[test]
    fn test_wrong_key_bad_signature() {
        let token = hs_signer().sign(&claims()).unwrap();
        let other = TokenSigner::from_settings(&TokenSettings::hmac(
            "Zq7!Lm3#Vx9$Rt2&Kp8*Wn4@Hs6^Bd1%Jf5(Yc0)Gu3+Te7=Qa9-Xo2_Ne8~Pi4",
        ))
        .unwrap();
        assert!(matches!(
            other.verify(token.as_str(), NOW),
            Err(TokenError::BadSignature)
        ));
    }

    #[test]
    fn test_algorithm_mismatch_bad_signature() {
        let token = hs_signer().sign(&claims()).unwrap();
        assert!(matches!(
            rs_signer().verify(token.as_str(), NOW),
            Err(TokenError::BadSignature)
        ));
    }

    #[test]
    fn test_garbage_is_malformed() {
        let signer = hs_signer();
        for garbage in ["", "invalid", "a.b", "not.a.token", "a.b.c.d"] {
            assert!(
                matches!(signer.verify(garbage, NOW), Err(TokenError::Malformed(_))),
                "{garbage:?} not malformed"
            );
        }
    }

    #[test]
    fn test_expiry_before_issued_at_is_malformed() {
        #[derive(serde::Serialize)]
        struct Inverted {
            sub: String,
            name: String,
            jti: String,
            iat: i64,
            exp: i64,
        }

        let inverted = Inverted {
            sub: Uuid::new_v4().to_string(),
            name: "mallory".into(),
            jti: Uuid::new_v4().to_string(),
            iat: NOW,
            exp: NOW - 10,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &inverted,
            &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
        )
        .unwrap();

        assert!(matches!(
            hs_signer().verify_signature(&token),
            Err(TokenError::Malformed(_))
        ));
    }

    #[test]
    fn test_zero_lifetime_still_signs() {
        let codec = ClaimsCodec::new(Duration::from_secs(0));
        let claims = codec
            .build_claims(&Identity::new(Uuid::new_v4(), "zero"), None, NOW)
            .unwrap();
        let token = hs_signer().sign(&claims).unwrap();
        assert_eq!(token.issued_at(), token.expires_at());
    }

    #[test]
    fn test_inspect_skips_signature() {
        let token = hs_signer().sign(&claims()).unwrap();
        let tampered = format!("{}x", token.as_str());

        let inspected = TokenSigner::inspect(&tampered).unwrap();
        assert_eq!(inspected.token_id(), token.token_id());

        assert!(matches!(
            TokenSigner::inspect("not-a-jwt"),
            Err(TokenError::Malformed(_))
        ));
        assert!(matches!(
            TokenSigner::inspect("a.!!!.c"),
            Err(TokenError::Malformed(_))
        ));
    }

    #[test]
    fn test_mismatched_key_material_rejected() {
        let material = KeyMaterial::Secret(TEST_SECRET.as_bytes().to_vec());
        let result = TokenSigner::new(Algorithm::RS256, &material, Duration::ZERO);
        assert!(matches!(result, Err(TokenError::Configuration(_))));
    }
}
