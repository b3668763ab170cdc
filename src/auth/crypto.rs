//! Bearer-secret and session-token cryptography.
//!
//! Login-link secrets are random bytes, transported URL-safe and persisted
//! only as a digest; looking a token up by hash is equivalent to looking it
//! up by secret without the secret ever touching storage.

use anyhow::{Context, Result};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Serialize, de::DeserializeOwned};
use sha2::{Digest, Sha256};

use crate::config::TokenConfig;

pub const SECRET_LEN: usize = 32;

/// Clock skew tolerated when validating session-token expiry.
const EXPIRY_LEEWAY_SECS: u64 = 60;

/// Fixed-length cryptographically secure secret.
pub fn generate_secret() -> [u8; SECRET_LEN] {
    let mut rng = rand::thread_rng();
    let mut bytes = [0u8; SECRET_LEN];
    rng.fill(&mut bytes[..]);
    bytes
}

/// URL-safe base64 without padding.
pub fn encode_secret(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Lowercase hex SHA-256 of the UTF-8 secret.
pub fn hash_secret(secret: &str) -> String {
    let digest = Sha256::digest(secret.as_bytes());
    digest.iter().fold(String::with_capacity(64), |mut out, b| {
        use std::fmt::Write;
        let _ = write!(out, "{b:02x}");
        out
    })
}

/// Symmetric signer for session tokens. Verification requires a valid
/// signature, the configured issuer and audience, and an unexpired `exp`.
pub struct TokenSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    audience: String,
}

impl TokenSigner {
    pub fn new(config: &TokenConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.signing_key.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.signing_key.as_bytes()),
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    pub fn sign<T: Serialize>(&self, claims: &T) -> Result<String> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .context("failed to sign session token")
    }

    pub fn verify<T: DeserializeOwned>(&self, token: &str) -> Result<T> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = EXPIRY_LEEWAY_SECS;
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);

        let data = jsonwebtoken::decode::<T>(token, &self.decoding_key, &validation)
            .context("session token rejected")?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    fn test_config() -> TokenConfig {
        TokenConfig {
            signing_key: "test-signing-key".to_string(),
            issuer: "guildpoll".to_string(),
            audience: "guildpoll".to_string(),
            session_expiry_minutes: 60,
            login_link_expiry_minutes: 5,
        }
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct TestClaims {
        sub: String,
        iss: String,
        aud: String,
        exp: i64,
    }

    fn claims_expiring_at(exp: i64) -> TestClaims {
        TestClaims {
            sub: "member-1".to_string(),
            iss: "guildpoll".to_string(),
            aud: "guildpoll".to_string(),
            exp,
        }
    }

    fn future_exp() -> i64 {
        chrono::Utc::now().timestamp() + 3600
    }

    #[test]
    fn test_generate_secret_is_fixed_length_and_random() {
        let a = generate_secret();
        let b = generate_secret();
        assert_eq!(a.len(), SECRET_LEN);
        assert_ne!(a, b);
    }

    #[test]
    fn test_encode_secret_is_urlsafe_without_padding() {
        let encoded = encode_secret(&generate_secret());
        assert_eq!(encoded.len(), 43); // 32 bytes, no padding
        assert!(!encoded.contains('='));
        assert!(!encoded.contains('+'));
        assert!(!encoded.contains('/'));
    }

    #[test]
    fn test_hash_secret_is_deterministic_hex() {
        let first = hash_secret("some-secret");
        let second = hash_secret("some-secret");
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(first, hash_secret("other-secret"));
    }

    #[test]
    fn test_sign_verify_round_trip() {
        let signer = TokenSigner::new(&test_config());
        let token = signer.sign(&claims_expiring_at(future_exp())).unwrap();
        let claims: TestClaims = signer.verify(&token).unwrap();
        assert_eq!(claims.sub, "member-1");
    }

    #[test]
    fn test_verify_rejects_expired_token() {
        let signer = TokenSigner::new(&test_config());
        // Past the leeway window.
        let exp = chrono::Utc::now().timestamp() - 2 * EXPIRY_LEEWAY_SECS as i64;
        let token = signer.sign(&claims_expiring_at(exp)).unwrap();
        assert!(signer.verify::<TestClaims>(&token).is_err());
    }

    #[test]
    fn test_verify_rejects_wrong_audience_and_issuer() {
        let signer = TokenSigner::new(&test_config());

        let mut bad_aud = claims_expiring_at(future_exp());
        bad_aud.aud = "someone-else".to_string();
        let token = signer.sign(&bad_aud).unwrap();
        assert!(signer.verify::<TestClaims>(&token).is_err());

        let mut bad_iss = claims_expiring_at(future_exp());
        bad_iss.iss = "someone-else".to_string();
        let token = signer.sign(&bad_iss).unwrap();
        assert!(signer.verify::<TestClaims>(&token).is_err());
    }

    #[test]
    fn test_verify_rejects_tampered_signature() {
        let signer = TokenSigner::new(&test_config());
        let other = TokenSigner::new(&TokenConfig {
            signing_key: "different-key".to_string(),
            ..test_config()
        });

        let token = other.sign(&claims_expiring_at(future_exp())).unwrap();
        assert!(signer.verify::<TestClaims>(&token).is_err());
    }
}
