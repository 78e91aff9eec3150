//! Slack request signature verification.
//!
//! Slack signs every request with HMAC-SHA256 over `v0:<timestamp>:<raw body>`
//! and sends the hex digest as `X-Slack-Signature: v0=<hex>`.
//! Reference: https://api.slack.com/authentication/verifying-requests-from-slack
//!
//! The body is hashed while it streams in ([`SecretsVerifier::tee`]), so the
//! bytes handed to the decoder are exactly the bytes that were verified.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::body::Body;
use axum::http::HeaderMap;
use futures::StreamExt;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

use crate::config::SigningSecret;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-slack-signature";
pub const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";

const VERSION: &str = "v0";

/// Signature verification failures.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("missing X-Slack-Signature header")]
    MissingSignature,

    #[error("missing X-Slack-Request-Timestamp header")]
    MissingTimestamp,

    #[error("malformed X-Slack-Signature header")]
    MalformedSignature,

    #[error("malformed X-Slack-Request-Timestamp header: {0:?}")]
    MalformedTimestamp(String),

    #[error("request timestamp is {age_seconds}s away from local time (max {max_age_seconds}s)")]
    Stale { age_seconds: u64, max_age_seconds: u64 },

    #[error("signing secret rejected by hmac")]
    InvalidKey,

    #[error("computed signature does not match X-Slack-Signature")]
    Mismatch,
}

impl VerifyError {
    /// Whether the request was refused as unauthenticated rather than
    /// failing verifier setup on unusable headers.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::MissingSignature | Self::Stale { .. } | Self::Mismatch
        )
    }
}

/// Failures while streaming the body through the verifier.
#[derive(Debug, Error)]
pub enum BodyError {
    #[error("failed to read request body")]
    Read(#[source] axum::Error),

    #[error("request body exceeds {limit} bytes")]
    TooLarge { limit: usize },
}

/// Incremental verifier for one request.
///
/// Built from the request headers, fed the raw body, then checked once with
/// [`SecretsVerifier::ensure`].
pub struct SecretsVerifier {
    mac: HmacSha256,
    expected: Vec<u8>,
}

impl SecretsVerifier {
    pub fn new(
        headers: &HeaderMap,
        secret: &SigningSecret,
        max_age: Duration,
    ) -> Result<Self, VerifyError> {
        Self::new_at(headers, secret, max_age, SystemTime::now())
    }

    fn new_at(
        headers: &HeaderMap,
        secret: &SigningSecret,
        max_age: Duration,
        now: SystemTime,
    ) -> Result<Self, VerifyError> {
        let signature = header_str(headers, SIGNATURE_HEADER).ok_or(VerifyError::MissingSignature)?;
        let timestamp = header_str(headers, TIMESTAMP_HEADER).ok_or(VerifyError::MissingTimestamp)?;

        let expected = signature
            .strip_prefix("v0=")
            .and_then(|hex_sig| hex::decode(hex_sig).ok())
            .ok_or(VerifyError::MalformedSignature)?;

        let sent_at: i64 = timestamp
            .parse()
            .map_err(|_| VerifyError::MalformedTimestamp(timestamp.to_string()))?;

        let current_time = now
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;
        let age_seconds = current_time.abs_diff(sent_at);
        if age_seconds > max_age.as_secs() {
            return Err(VerifyError::Stale {
                age_seconds,
                max_age_seconds: max_age.as_secs(),
            });
        }

        let mut mac =
            HmacSha256::new_from_slice(secret.expose()).map_err(|_| VerifyError::InvalidKey)?;
        mac.update(format!("{VERSION}:{timestamp}:").as_bytes());

        Ok(Self { mac, expected })
    }

    /// Feed a chunk of the raw body.
    pub fn update(&mut self, chunk: &[u8]) {
        self.mac.update(chunk);
    }

    /// Read the whole body once, hashing every chunk as it is buffered.
    pub async fn tee(&mut self, body: Body, limit: usize) -> Result<Vec<u8>, BodyError> {
        let mut stream = body.into_data_stream();
        let mut raw = Vec::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(BodyError::Read)?;
            if raw.len() + chunk.len() > limit {
                return Err(BodyError::TooLarge { limit });
            }
            self.update(&chunk);
            raw.extend_from_slice(&chunk);
        }

        Ok(raw)
    }

    /// Constant-time comparison of the computed and the received signature.
    pub fn ensure(self) -> Result<(), VerifyError> {
        self.mac
            .verify_slice(&self.expected)
            .map_err(|_| VerifyError::Mismatch)
    }
}

/// Compute the `X-Slack-Signature` value Slack would send for a body.
pub fn sign(secret: &[u8], timestamp: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(format!("{VERSION}:{timestamp}:").as_bytes());
    mac.update(body);
    format!("{VERSION}={}", hex::encode(mac.finalize().into_bytes()))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use rand::Rng;

    const SECRET: &str = "8f742231b10e8888abcd99yyyzzz85a5";
    const MAX_AGE: Duration = Duration::from_secs(300);

    fn now_secs() -> String {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
            .to_string()
    }

    fn headers(signature: Option<&str>, timestamp: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(sig) = signature {
            headers.insert(SIGNATURE_HEADER, HeaderValue::from_str(sig).unwrap());
        }
        if let Some(ts) = timestamp {
            headers.insert(TIMESTAMP_HEADER, HeaderValue::from_str(ts).unwrap());
        }
        headers
    }

    fn verify(secret: &str, headers: &HeaderMap, body: &[u8]) -> Result<(), VerifyError> {
        let mut verifier = SecretsVerifier::new(headers, &SigningSecret::new(secret), MAX_AGE)?;
        verifier.update(body);
        verifier.ensure()
    }

    #[test]
    fn test_valid_signature_passes() {
        let ts = now_secs();
        let body = b"payload=%7B%22type%22%3A%22block_actions%22%7D";
        let sig = sign(SECRET.as_bytes(), &ts, body);

        assert!(verify(SECRET, &headers(Some(&sig), Some(&ts)), body).is_ok());
    }

    #[test]
    fn test_matches_slack_documented_example() {
        // Example request from Slack's "verifying requests" guide.
        let ts = "1531420618";
        let body = b"token=xyzz0WbapA4vBCDEFasx0q6G&team_id=T1DC2JH3J&team_domain=testteamnow&channel_id=G8PSS9T3V&channel_name=foobar&user_id=U2CERLKJA&user_name=roadrunner&command=%2Fwebhook-collect&text=&response_url=https%3A%2F%2Fhooks.slack.com%2Fcommands%2FT1DC2JH3J%2F397700885554%2F96rGlfmibIGlgcZRskXaIFfN&trigger_id=398738663015.47445629121.803a0bc887a14d10d2c447fce8b6703c";
        let expected = "v0=a2114d57b48eac39b9ad189dd8316235a7b4a8d21a10bd27519666489c69b503";

        assert_eq!(sign(SECRET.as_bytes(), ts, body), expected);

        let verified_at = UNIX_EPOCH + Duration::from_secs(1531420618 + 10);
        let mut verifier = SecretsVerifier::new_at(
            &headers(Some(expected), Some(ts)),
            &SigningSecret::new(SECRET),
            MAX_AGE,
            verified_at,
        )
        .unwrap();
        verifier.update(body);
        assert!(verifier.ensure().is_ok());
    }

    #[test]
    fn test_chunked_updates_match_single_update() {
        let ts = now_secs();
        let body = b"payload=%7B%22trigger_id%22%3A%22abc%22%7D";
        let sig = sign(SECRET.as_bytes(), &ts, body);

        let mut verifier = SecretsVerifier::new(
            &headers(Some(&sig), Some(&ts)),
            &SigningSecret::new(SECRET),
            MAX_AGE,
        )
        .unwrap();
        for chunk in body.chunks(5) {
            verifier.update(chunk);
        }
        assert!(verifier.ensure().is_ok());
    }

    #[test]
    fn test_single_byte_mutation_fails() {
        let ts = now_secs();
        let body = br#"payload={"type":"block_actions","trigger_id":"abc"}"#.to_vec();
        let sig = sign(SECRET.as_bytes(), &ts, &body);
        let headers = headers(Some(&sig), Some(&ts));
        let mut rng = rand::thread_rng();

        for _ in 0..64 {
            let mut tampered = body.clone();
            let index = rng.gen_range(0..tampered.len());
            tampered[index] ^= rng.gen_range(1..=u8::MAX);

            assert!(matches!(
                verify(SECRET, &headers, &tampered),
                Err(VerifyError::Mismatch)
            ));
        }
    }

    #[test]
    fn test_wrong_secret_fails() {
        let ts = now_secs();
        let sig = sign(b"another-secret", &ts, b"body");

        assert!(matches!(
            verify(SECRET, &headers(Some(&sig), Some(&ts)), b"body"),
            Err(VerifyError::Mismatch)
        ));
    }

    #[test]
    fn test_missing_headers() {
        let ts = now_secs();
        let sig = sign(SECRET.as_bytes(), &ts, b"");

        let err = verify(SECRET, &headers(None, Some(&ts)), b"").unwrap_err();
        assert!(matches!(err, VerifyError::MissingSignature));
        assert!(err.is_rejection());

        let err = verify(SECRET, &headers(Some(&sig), None), b"").unwrap_err();
        assert!(matches!(err, VerifyError::MissingTimestamp));
        assert!(!err.is_rejection());
    }

    #[test]
    fn test_malformed_signature() {
        let ts = now_secs();

        for sig in ["a2114d57b48eac39", "v0=not-hex!", "v1=abcd"] {
            let err = verify(SECRET, &headers(Some(sig), Some(&ts)), b"").unwrap_err();
            assert!(matches!(err, VerifyError::MalformedSignature), "{sig}");
            assert!(!err.is_rejection());
        }
    }

    #[test]
    fn test_malformed_timestamp() {
        let sig = sign(SECRET.as_bytes(), "yesterday", b"");

        let err = verify(SECRET, &headers(Some(&sig), Some("yesterday")), b"").unwrap_err();
        assert!(matches!(err, VerifyError::MalformedTimestamp(_)));
    }

    #[test]
    fn test_stale_timestamp() {
        // Year 2000
        let sig = sign(SECRET.as_bytes(), "946684800", b"");

        let err = verify(SECRET, &headers(Some(&sig), Some("946684800")), b"").unwrap_err();
        assert!(matches!(err, VerifyError::Stale { max_age_seconds: 300, .. }));
        assert!(err.is_rejection());
    }

    #[test]
    fn test_future_timestamp_is_stale_too() {
        let ts = "4102444800"; // 2100-01-01
        let sig = sign(SECRET.as_bytes(), ts, b"");

        assert!(matches!(
            verify(SECRET, &headers(Some(&sig), Some(ts)), b""),
            Err(VerifyError::Stale { .. })
        ));
    }

    #[tokio::test]
    async fn test_tee_returns_exact_bytes() {
        let ts = now_secs();
        let body = b"payload=%7B%7D".to_vec();
        let sig = sign(SECRET.as_bytes(), &ts, &body);
        let mut verifier = SecretsVerifier::new(
            &headers(Some(&sig), Some(&ts)),
            &SigningSecret::new(SECRET),
            MAX_AGE,
        )
        .unwrap();

        let raw = verifier.tee(Body::from(body.clone()), 1024).await.unwrap();

        assert_eq!(raw, body);
        assert!(verifier.ensure().is_ok());
    }

    #[tokio::test]
    async fn test_tee_enforces_limit() {
        let ts = now_secs();
        let sig = sign(SECRET.as_bytes(), &ts, b"");
        let mut verifier = SecretsVerifier::new(
            &headers(Some(&sig), Some(&ts)),
            &SigningSecret::new(SECRET),
            MAX_AGE,
        )
        .unwrap();

        let err = verifier.tee(Body::from(vec![b'x'; 64]), 16).await.unwrap_err();
        assert!(matches!(err, BodyError::TooLarge { limit: 16 }));
    }
}
