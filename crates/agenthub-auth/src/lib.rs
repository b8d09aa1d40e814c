//! Shared-secret agent tokens: `base64url(claims).hex(hmac_sha256(secret, base64url(claims)))`.
//!
//! The MAC covers the encoded payload exactly as transmitted, so verification
//! never re-serializes JSON.

mod error;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

pub use error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Token lifetime in seconds
pub const TOKEN_TTL_SECS: i64 = 3600;

/// Signed token payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub agent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Issued-at, epoch seconds
    pub iat: i64,
    /// Expiration, epoch seconds (iat + TOKEN_TTL_SECS)
    pub exp: i64,
}

impl TokenClaims {
    pub fn issue(agent_id: impl Into<String>, session_id: Option<String>, now: DateTime<Utc>) -> Self {
        let iat = now.timestamp();
        Self {
            agent_id: agent_id.into(),
            session_id,
            iat,
            exp: iat + TOKEN_TTL_SECS,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.exp <= now.timestamp()
    }
}

/// Signs claims with the shared secret
pub fn sign(claims: &TokenClaims, secret: &str) -> Result<String> {
    let payload = serde_json::to_string(claims).map_err(Error::Encode)?;
    let encoded = URL_SAFE_NO_PAD.encode(payload.as_bytes());
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| Error::Signature)?;
    mac.update(encoded.as_bytes());
    let signature = hex_encode(&mac.finalize().into_bytes());
    Ok(format!("{}.{}", encoded, signature))
}

/// Verifies signature and expiration, returning the claims
pub fn verify(token: &str, secret: &str, now: DateTime<Utc>) -> Result<TokenClaims> {
    let (encoded, signature) = token
        .split_once('.')
        .ok_or_else(|| Error::Malformed("missing signature separator".into()))?;

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| Error::Signature)?;
    mac.update(encoded.as_bytes());
    let expected = hex_decode(signature)
        .ok_or_else(|| Error::Malformed("signature is not hex".into()))?;
    mac.verify_slice(&expected).map_err(|_| Error::Signature)?;

    let payload = URL_SAFE_NO_PAD
        .decode(encoded.as_bytes())
        .map_err(|_| Error::Malformed("payload is not base64url".into()))?;
    let claims: TokenClaims = serde_json::from_slice(&payload)
        .map_err(|e| Error::Malformed(format!("payload is not valid claims JSON: {}", e)))?;

    if claims.is_expired(now) {
        return Err(Error::Expired);
    }
    Ok(claims)
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{:02x}", b);
        out
    })
}

fn hex_decode(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(s.get(i..i + 2)?, 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SECRET: &str = "a-test-secret-that-is-long-enough-32";

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn sign_verify_round_trip() {
        let now = at(1_700_000_000);
        let claims = TokenClaims::issue("backend", Some("s1".into()), now);
        let token = sign(&claims, SECRET).unwrap();
        let verified = verify(&token, SECRET, now).unwrap();
        assert_eq!(verified, claims);
        assert_eq!(verified.exp, verified.iat + TOKEN_TTL_SECS);
    }

    #[test]
    fn token_shape_is_base64url_dot_hex() {
        let claims = TokenClaims::issue("backend", None, at(1_700_000_000));
        let token = sign(&claims, SECRET).unwrap();
        let (payload, sig) = token.split_once('.').unwrap();
        assert!(URL_SAFE_NO_PAD.decode(payload).is_ok());
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let claims = TokenClaims::issue("backend", None, at(1_700_000_000));
        let token = sign(&claims, SECRET).unwrap();
        assert!(matches!(
            verify(&token, "another-secret-entirely-0000000000", at(1_700_000_000)),
            Err(Error::Signature)
        ));
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let claims = TokenClaims::issue("backend", None, at(1_700_000_000));
        let token = sign(&claims, SECRET).unwrap();
        let forged_payload =
            URL_SAFE_NO_PAD.encode(br#"{"agent_id":"admin","iat":0,"exp":9999999999}"#);
        let sig = token.split_once('.').unwrap().1;
        let forged = format!("{}.{}", forged_payload, sig);
        assert!(matches!(verify(&forged, SECRET, at(1_700_000_000)), Err(Error::Signature)));
    }

    #[test]
    fn expired_token_is_rejected() {
        let issued = at(1_700_000_000);
        let claims = TokenClaims::issue("backend", None, issued);
        let token = sign(&claims, SECRET).unwrap();
        let later = at(1_700_000_000 + TOKEN_TTL_SECS);
        assert!(matches!(verify(&token, SECRET, later), Err(Error::Expired)));
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            verify("not-a-token", SECRET, at(0)),
            Err(Error::Malformed(_))
        ));
        assert!(matches!(
            verify("!!!.zzzz", SECRET, at(0)),
            Err(Error::Malformed(_))
        ));
    }
}
