//! User and device registration.
//!
//! Every request body is signed by the user key (`CHUserSign`) and, when a
//! device is involved, by the device key (`CHDevSign`). Signatures are
//! base64url DER ECDSA over the exact body bytes.

use std::collections::HashSet;
use std::sync::Arc;

use pushnode_shared::crypto::PublicKey;
use pushnode_shared::error::CryptoError;
use pushnode_shared::identity::{calc_device_key, calc_user_key};
use pushnode_shared::types::{decode_b64url, encode_b64url};
use pushnode_shared::UserSecret;
use pushnode_store::{NodeStore, StoreError, User, USER_FLAG_SERVERFUL};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::RelayError;

pub const USER_SIGN_HEADER: &str = "CHUserSign";
pub const DEVICE_SIGN_HEADER: &str = "CHDevSign";

type SecretSource = Box<dyn Fn() -> Result<UserSecret, CryptoError> + Send + Sync>;

#[derive(Deserialize)]
struct KeyClaim {
    uid: String,
    key: String,
}

#[derive(Deserialize)]
struct DeviceClaim {
    uuid: String,
    key: String,
    /// base64url APNs token.
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    sandbox: bool,
    #[serde(default, rename = "type")]
    device_type: i32,
}

// The `nonce` field is covered by the signature and otherwise ignored.
#[derive(Deserialize)]
struct BindUserRequest {
    user: KeyClaim,
    #[serde(default)]
    device: Option<DeviceClaim>,
}

#[derive(Deserialize)]
struct DeviceRequest {
    user: String,
    device: String,
}

#[derive(Deserialize)]
struct PushTokenRequest {
    user: String,
    device: String,
    token: String,
    #[serde(default)]
    sandbox: bool,
}

#[derive(Debug, Serialize)]
pub struct BindUserResponse {
    pub uid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    /// `base64url(ECIES(user key, user secret))`.
    pub key: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct DeviceAck {
    pub uid: String,
    pub uuid: String,
}

pub struct Registrar {
    store: Arc<dyn NodeStore>,
    registerable: bool,
    whitelist: HashSet<String>,
    secrets: SecretSource,
}

impl Registrar {
    pub fn new(
        store: Arc<dyn NodeStore>,
        registerable: bool,
        whitelist: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            store,
            registerable,
            whitelist: whitelist.into_iter().collect(),
            secrets: Box::new(|| UserSecret::generate(&mut OsRng)),
        }
    }

    /// Replace the source of fresh user secrets.
    pub fn with_secret_source<F>(mut self, source: F) -> Self
    where
        F: Fn() -> Result<UserSecret, CryptoError> + Send + Sync + 'static,
    {
        self.secrets = Box::new(source);
        self
    }

    pub fn can_register(&self, uid: &str) -> bool {
        self.registerable || self.whitelist.contains(uid)
    }

    /// Register (or refresh) a user, optionally binding a device, and hand
    /// the user their secret sealed to their own key.
    pub fn bind_user(
        &self,
        body: &[u8],
        user_sign: Option<&str>,
        device_sign: Option<&str>,
    ) -> Result<BindUserResponse, RelayError> {
        let request: BindUserRequest = parse_body(body)?;
        let uid = request.user.uid;
        let user_key = calc_user_key(&uid, &request.user.key)?;
        check_signature(&user_key, body, user_sign)?;

        // A passphrase-derived store has nowhere to keep devices.
        let device = match request.device {
            Some(claim) if self.store.stores_devices() => {
                let key = calc_device_key(&claim.uuid, &claim.key)?;
                check_signature(&key, body, device_sign)?;
                let token = match claim.token.as_deref().filter(|t| !t.is_empty()) {
                    Some(encoded) => Some(decode_push_token(encoded)?),
                    None => None,
                };
                Some((claim, key, token))
            }
            Some(claim) => {
                debug!(uuid = %claim.uuid, "store keeps no devices; ignoring device block");
                None
            }
            None => None,
        };

        let secret = match self.store.get_user(&uid) {
            Ok(existing) => existing.secret,
            Err(StoreError::NotFound) => {
                if !self.can_register(&uid) {
                    warn!(%uid, "registration refused");
                    return Err(RelayError::SystemLimited);
                }
                (self.secrets)().map_err(|e| RelayError::Internal(format!("user secret: {e}")))?
            }
            Err(e) => return Err(e.into()),
        };

        let flags = if device.is_some() { USER_FLAG_SERVERFUL } else { 0 };
        self.store.upsert_user(&User {
            uid: uid.clone(),
            public_key: user_key.to_bytes(),
            secret,
            flags,
        })?;

        let uuid = match device {
            Some((claim, key, token)) => {
                self.store
                    .bind_device(&uid, &claim.uuid, &key.to_bytes(), claim.device_type)?;
                if let Some(token) = token {
                    self.store
                        .update_push_token(&uid, &claim.uuid, &token, claim.sandbox)?;
                }
                info!(%uid, uuid = %claim.uuid, "device bound");
                Some(claim.uuid)
            }
            None => None,
        };

        // Re-read so racing first registrations all return the stored secret.
        let stored = self.store.get_user(&uid)?;
        let sealed = user_key
            .encrypt(stored.secret.as_bytes())
            .map_err(|e| RelayError::Internal(format!("seal user secret: {e}")))?;

        info!(%uid, serverless = stored.is_serverless(), "user bound");
        Ok(BindUserResponse {
            uid,
            uuid,
            key: encode_b64url(&sealed),
        })
    }

    /// Remove a device binding. Unknown users succeed without effect.
    pub fn unbind_user(&self, body: &[u8], user_sign: Option<&str>) -> Result<DeviceAck, RelayError> {
        let request: DeviceRequest = parse_body(body)?;
        let ack = DeviceAck {
            uid: request.user,
            uuid: request.device,
        };
        if !self.store.stores_devices() {
            return Ok(ack);
        }

        let user = match self.store.get_user(&ack.uid) {
            Ok(user) => user,
            Err(StoreError::NotFound) => return Ok(ack),
            Err(e) => return Err(e.into()),
        };
        let user_key = user.public_key().map_err(|_| RelayError::InvalidUser)?;
        check_signature(&user_key, body, user_sign)?;

        self.store.unbind_device(&ack.uid, &ack.uuid)?;
        info!(uid = %ack.uid, uuid = %ack.uuid, "device unbound");
        Ok(ack)
    }

    /// Attach an APNs token to an already bound device.
    pub fn update_push_token(
        &self,
        body: &[u8],
        user_sign: Option<&str>,
        device_sign: Option<&str>,
    ) -> Result<DeviceAck, RelayError> {
        let request: PushTokenRequest = parse_body(body)?;

        let user = match self.store.get_user(&request.user) {
            Ok(user) => user,
            Err(StoreError::NotFound) => return Err(RelayError::InvalidUserId),
            Err(e) => return Err(e.into()),
        };
        if user.is_serverless() {
            return Err(RelayError::BadRequest("invalid user mode".into()));
        }
        let user_key = user.public_key().map_err(|_| RelayError::InvalidUser)?;
        check_signature(&user_key, body, user_sign)?;

        let device_key = match self.store.get_device_key(&request.device) {
            Ok(bytes) => PublicKey::from_bytes(&bytes).map_err(|_| RelayError::InvalidDeviceId)?,
            Err(StoreError::NotFound) => return Err(RelayError::InvalidDeviceId),
            Err(e) => return Err(e.into()),
        };
        check_signature(&device_key, body, device_sign)?;

        let token = decode_push_token(&request.token)?;
        match self
            .store
            .update_push_token(&request.user, &request.device, &token, request.sandbox)
        {
            Ok(()) => {}
            Err(StoreError::NotFound) => return Err(RelayError::InvalidDeviceId),
            Err(e) => return Err(e.into()),
        }

        debug!(uid = %request.user, uuid = %request.device, sandbox = request.sandbox, "push token updated");
        Ok(DeviceAck {
            uid: request.user,
            uuid: request.device,
        })
    }
}

fn parse_body<'a, T: Deserialize<'a>>(body: &'a [u8]) -> Result<T, RelayError> {
    serde_json::from_slice(body).map_err(|_| RelayError::BadRequest("invalid params".into()))
}

fn check_signature(key: &PublicKey, body: &[u8], signature: Option<&str>) -> Result<(), RelayError> {
    let der = signature
        .and_then(decode_b64url)
        .ok_or(RelayError::InvalidSignature)?;
    if key.verify(body, &der) {
        Ok(())
    } else {
        Err(RelayError::InvalidSignature)
    }
}

fn decode_push_token(encoded: &str) -> Result<Vec<u8>, RelayError> {
    decode_b64url(encoded).ok_or_else(|| RelayError::BadRequest("invalid push token".into()))
}
