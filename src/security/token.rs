//! Signed anti-bot tokens.
//!
//! A token proves the caller went through `?init=1` and is replaying the same
//! IP and User-Agent. It is not an identity credential and there is no
//! server-side session store: validity depends only on the signature, the
//! payload fields and the presenting client.
//!
//! Format: `base64url(header).base64url(payload).base64url(hmac)`, all
//! unpadded, where the HMAC-SHA256 covers `header.payload`.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::ProxyError;

type HmacSha256 = Hmac<Sha256>;

/// Length of the User-Agent fingerprint embedded in the payload.
const UA_HASH_LEN: usize = 16;

const TOKEN_VERSION: u8 = 1;

#[derive(Serialize)]
struct TokenHeader {
    alg: &'static str,
    typ: &'static str,
}

const HEADER: TokenHeader = TokenHeader {
    alg: "HS256",
    typ: "NSJWT",
};

/// Token payload. Fields are optional on the way in so that a signed but
/// incomplete payload fails verification instead of failing to parse.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenClaims {
    pub v: u8,
    #[serde(default)]
    pub jti: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(rename = "uaHash", default)]
    pub ua_hash: Option<String>,
    #[serde(default)]
    pub iat: Option<u64>,
    #[serde(default)]
    pub exp: Option<u64>,
}

/// A freshly issued token.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedToken {
    pub token: String,
    pub expires_in_ms: u64,
}

/// The parts of a verified token the rate limiter cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedToken {
    pub jti: String,
}

/// Issues and verifies tokens with a single operator secret.
#[derive(Clone)]
pub struct TokenService {
    mac: HmacSha256,
    ttl: Duration,
}

impl TokenService {
    /// Fails with [`ProxyError::MissingSecret`] when the secret is absent or
    /// shorter than `min_secret_len` characters.
    pub fn new(
        secret: Option<&str>,
        min_secret_len: usize,
        ttl: Duration,
    ) -> Result<Self, ProxyError> {
        let secret = secret
            .filter(|s| s.chars().count() >= min_secret_len)
            .ok_or(ProxyError::MissingSecret)?;
        let mac =
            HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| ProxyError::MissingSecret)?;
        Ok(Self { mac, ttl })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a token bound to `ip` and `user_agent`.
    pub fn issue(&self, ip: &str, user_agent: &str, now_ms: u64) -> IssuedToken {
        let ttl_ms = self.ttl.as_millis() as u64;
        let claims = TokenClaims {
            v: TOKEN_VERSION,
            jti: Some(uuid::Uuid::new_v4().to_string()),
            ip: Some(ip.to_string()),
            ua_hash: Some(self.ua_hash(user_agent)),
            iat: Some(now_ms),
            exp: Some(now_ms + ttl_ms),
        };

        let signing_input = format!("{}.{}", encode_segment(&HEADER), encode_segment(&claims));
        let signature = URL_SAFE_NO_PAD.encode(self.sign(signing_input.as_bytes()));

        IssuedToken {
            token: format!("{}.{}", signing_input, signature),
            expires_in_ms: ttl_ms,
        }
    }

    /// Verify a presented token. `None` means "treat as absent".
    pub fn verify(
        &self,
        token: &str,
        ip: &str,
        user_agent: &str,
        now_ms: u64,
    ) -> Option<VerifiedToken> {
        let claims = self.verified_claims(token)?;

        let exp = claims.exp?;
        if now_ms > exp {
            return None;
        }
        if claims.ip.as_deref() != Some(ip) {
            return None;
        }
        if claims.ua_hash.as_deref() != Some(self.ua_hash(user_agent).as_str()) {
            return None;
        }

        claims.jti.map(|jti| VerifiedToken { jti })
    }

    /// Check the signature, then decode the payload.
    fn verified_claims(&self, token: &str) -> Option<TokenClaims> {
        let mut parts = token.split('.');
        let (header, payload, signature) = (parts.next()?, parts.next()?, parts.next()?);
        if parts.next().is_some() {
            return None;
        }

        let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;
        let mut mac = self.mac.clone();
        mac.update(header.as_bytes());
        mac.update(b".");
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature).ok()?;

        let payload = URL_SAFE_NO_PAD.decode(payload).ok()?;
        serde_json::from_slice(&payload).ok()
    }

    fn sign(&self, data: &[u8]) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(data);
        mac.finalize().into_bytes().to_vec()
    }

    /// Keyed User-Agent fingerprint, truncated.
    fn ua_hash(&self, user_agent: &str) -> String {
        let mut hash = URL_SAFE_NO_PAD.encode(self.sign(user_agent.as_bytes()));
        hash.truncate(UA_HASH_LEN);
        hash
    }
}

fn encode_segment<T: Serialize>(value: &T) -> String {
    // Plain structs of strings and integers always serialize.
    let json = serde_json::to_vec(value).unwrap_or_default();
    URL_SAFE_NO_PAD.encode(json)
}

/// Wall-clock time in unix milliseconds.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
