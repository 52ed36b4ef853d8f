//! Push delivery to Apple devices.
//!
//! The dispatcher only sees the [`Pusher`] trait; [`ApnsPusher`] is the
//! HTTP/2 client used in production. One instance exists per APNs
//! environment (production and sandbox).

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use p256::pkcs8::DecodePrivateKey;
use pushnode_shared::types::encode_b64url;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

pub const APNS_PRODUCTION_URL: &str = "https://api.push.apple.com";
pub const APNS_SANDBOX_URL: &str = "https://api.sandbox.push.apple.com";

/// `apns-priority` value for immediate delivery.
pub const APNS_PRIORITY_IMMEDIATE: i32 = 10;

// Apple rejects provider tokens older than one hour.
const JWT_REFRESH_SECS: i64 = 50 * 60;

/// One notification for one device.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Hex-encoded APNs device token.
    pub device_token: String,
    pub topic: String,
    /// Unix seconds after which APNs drops the notification.
    pub expiration: i64,
    /// Sent as `apns-priority` when set.
    pub priority: Option<i32>,
    pub payload: serde_json::Value,
}

#[derive(Debug, Error)]
pub enum PushError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("rejected with status {status}: {reason}")]
    Rejected { status: u16, reason: String },

    #[error("provider key error: {0}")]
    Auth(String),
}

#[async_trait]
pub trait Pusher: Send + Sync {
    async fn push(&self, notification: &Notification) -> Result<(), PushError>;
}

/// Signs APNs provider tokens (ES256 JWT) and caches the current one.
pub struct ApnsAuth {
    key: SigningKey,
    key_id: String,
    team_id: String,
    cached: Mutex<Option<(i64, String)>>,
}

impl ApnsAuth {
    /// Load a `.p8` key (PKCS#8 PEM).
    pub fn from_pem(pem: &str, key_id: &str, team_id: &str) -> Result<Self, PushError> {
        let key = SigningKey::from_pkcs8_pem(pem).map_err(|e| PushError::Auth(e.to_string()))?;
        Ok(Self {
            key,
            key_id: key_id.to_string(),
            team_id: team_id.to_string(),
            cached: Mutex::new(None),
        })
    }

    /// Current bearer token, re-signed when older than 50 minutes.
    pub fn bearer(&self) -> String {
        self.bearer_at(chrono::Utc::now().timestamp())
    }

    fn bearer_at(&self, now: i64) -> String {
        let mut cached = self.cached.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((issued_at, jwt)) = cached.as_ref() {
            if now - issued_at < JWT_REFRESH_SECS {
                return jwt.clone();
            }
        }
        let jwt = self.sign_jwt(now);
        *cached = Some((now, jwt.clone()));
        jwt
    }

    fn sign_jwt(&self, issued_at: i64) -> String {
        let header = json!({ "alg": "ES256", "kid": self.key_id });
        let claims = json!({ "iss": self.team_id, "iat": issued_at });
        let signing_input = format!(
            "{}.{}",
            encode_b64url(header.to_string().as_bytes()),
            encode_b64url(claims.to_string().as_bytes())
        );
        // JOSE wants the fixed-size r ‖ s form, not DER.
        let signature: Signature = self.key.sign(signing_input.as_bytes());
        format!("{}.{}", signing_input, encode_b64url(&signature.to_bytes()))
    }
}

pub struct ApnsPusher {
    client: reqwest::Client,
    base_url: String,
    auth: Arc<ApnsAuth>,
}

impl ApnsPusher {
    pub fn new(
        base_url: &str,
        auth: Arc<ApnsAuth>,
        timeout: Duration,
    ) -> Result<Self, PushError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PushError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
        })
    }
}

#[async_trait]
impl Pusher for ApnsPusher {
    async fn push(&self, notification: &Notification) -> Result<(), PushError> {
        let url = format!("{}/3/device/{}", self.base_url, notification.device_token);
        let mut request = self
            .client
            .post(url)
            .header("authorization", format!("bearer {}", self.auth.bearer()))
            .header("apns-topic", &notification.topic)
            .header("apns-expiration", notification.expiration.to_string())
            .header("apns-push-type", "alert")
            .json(&notification.payload);
        if let Some(priority) = notification.priority {
            request = request.header("apns-priority", priority.to_string());
        }

        let response = request
            .send()
            .await
            .map_err(|e| PushError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            debug!(status = status.as_u16(), "APNs accepted notification");
            return Ok(());
        }

        let reason = response
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|body| body["reason"].as_str().map(str::to_string))
            .unwrap_or_default();
        Err(PushError::Rejected {
            status: status.as_u16(),
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::ecdsa::signature::Verifier;
    use p256::pkcs8::{EncodePrivateKey, LineEnding};
    use pushnode_shared::types::decode_b64url;
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_auth() -> (Arc<ApnsAuth>, SigningKey) {
        let key = SigningKey::random(&mut rand::rngs::OsRng);
        let pem = key.to_pkcs8_pem(LineEnding::LF).unwrap();
        let auth = ApnsAuth::from_pem(&pem, "KEYID12345", "TEAMID6789").unwrap();
        (Arc::new(auth), key)
    }

    fn notification(priority: Option<i32>) -> Notification {
        Notification {
            device_token: "a1b2c3".into(),
            topic: "net.chanify.ios".into(),
            expiration: 1_700_000_000,
            priority,
            payload: json!({ "aps": { "mutable-content": 1 }, "msg": "AAAA" }),
        }
    }

    #[test]
    fn test_jwt_is_verifiable() {
        let (auth, key) = test_auth();
        let jwt = auth.bearer_at(1_700_000_000);
        let parts: Vec<&str> = jwt.split('.').collect();
        assert_eq!(parts.len(), 3);

        let jose: serde_json::Value =
            serde_json::from_slice(&decode_b64url(parts[0]).unwrap()).unwrap();
        assert_eq!(jose["alg"], "ES256");
        assert_eq!(jose["kid"], "KEYID12345");
        let claims: serde_json::Value =
            serde_json::from_slice(&decode_b64url(parts[1]).unwrap()).unwrap();
        assert_eq!(claims["iss"], "TEAMID6789");
        assert_eq!(claims["iat"], 1_700_000_000);

        let signature = Signature::from_slice(&decode_b64url(parts[2]).unwrap()).unwrap();
        let signed = format!("{}.{}", parts[0], parts[1]);
        assert!(key
            .verifying_key()
            .verify(signed.as_bytes(), &signature)
            .is_ok());
    }

    #[test]
    fn test_jwt_cached_then_refreshed() {
        let (auth, _) = test_auth();
        let first = auth.bearer_at(1_000);
        assert_eq!(auth.bearer_at(1_000 + JWT_REFRESH_SECS - 1), first);
        assert_ne!(auth.bearer_at(1_000 + JWT_REFRESH_SECS), first);
    }

    #[test]
    fn test_rejects_bad_pem() {
        assert!(matches!(
            ApnsAuth::from_pem("not a key", "K", "T"),
            Err(PushError::Auth(_))
        ));
    }

    #[tokio::test]
    async fn test_push_sends_apns_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/3/device/a1b2c3"))
            .and(header("apns-topic", "net.chanify.ios"))
            .and(header("apns-expiration", "1700000000"))
            .and(header("apns-push-type", "alert"))
            .and(header("apns-priority", "10"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let (auth, _) = test_auth();
        let pusher = ApnsPusher::new(&server.uri(), auth, Duration::from_secs(5)).unwrap();
        pusher.push(&notification(Some(10))).await.unwrap();
    }

    #[tokio::test]
    async fn test_push_reports_rejection_reason() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(410).set_body_json(json!({ "reason": "Unregistered" })),
            )
            .mount(&server)
            .await;

        let (auth, _) = test_auth();
        let pusher = ApnsPusher::new(&server.uri(), auth, Duration::from_secs(5)).unwrap();
        match pusher.push(&notification(None)).await {
            Err(PushError::Rejected { status, reason }) => {
                assert_eq!(status, 410);
                assert_eq!(reason, "Unregistered");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
