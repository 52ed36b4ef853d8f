//! Message delivery.
//!
//! Serverful users (devices bound to this node) get an APNs notification per
//! device carrying the whole sealed envelope. Serverless users have their
//! content sealed and handed to the upstream relay.

use std::sync::Arc;

use pushnode_shared::clock::NonceClock;
use pushnode_shared::constants::MAX_PUSH_PAYLOAD;
use pushnode_shared::types::encode_b64url;
use pushnode_shared::{Message, Token};
use pushnode_store::{NodeStore, User};
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::RelayError;
use crate::pusher::{Notification, Pusher, APNS_PRIORITY_IMMEDIATE};
use crate::upstream::{ForwardResponse, Upstream};

const NOTIFICATION_TTL_SECS: i64 = 24 * 60 * 60;

/// APNs clients per environment, plus the app topic.
pub struct PushClients {
    pub production: Arc<dyn Pusher>,
    pub sandbox: Arc<dyn Pusher>,
    pub topic: String,
}

#[derive(Debug)]
pub enum Delivery {
    Pushed { request_id: Uuid, delivered: usize },
    Forwarded(ForwardResponse),
}

pub struct RelayDispatcher {
    node_id: String,
    store: Arc<dyn NodeStore>,
    pushers: Option<PushClients>,
    upstream: Option<Upstream>,
    clock: NonceClock,
}

impl RelayDispatcher {
    pub fn new(
        node_id: String,
        store: Arc<dyn NodeStore>,
        pushers: Option<PushClients>,
        upstream: Option<Upstream>,
    ) -> Self {
        Self {
            node_id,
            store,
            pushers,
            upstream,
            clock: NonceClock::new(),
        }
    }

    pub async fn dispatch(
        &self,
        token: &Token,
        message: Message,
        user: &User,
    ) -> Result<Delivery, RelayError> {
        if user.is_serverless() {
            self.forward(token, message, user)
                .await
                .map(Delivery::Forwarded)
        } else {
            self.push_direct(&message, user).await
        }
    }

    async fn push_direct(&self, message: &Message, user: &User) -> Result<Delivery, RelayError> {
        let devices = self.store.get_devices(&user.uid)?;

        let data = message.encrypt_data(&user.secret, self.clock.now())?;
        if data.len() > MAX_PUSH_PAYLOAD {
            debug!(uid = %user.uid, len = data.len(), "sealed message too large to push");
            return Err(RelayError::TooLargeContent);
        }

        let Some(pushers) = &self.pushers else {
            warn!(uid = %user.uid, "no APNs credentials configured; cannot push");
            return Err(RelayError::NotFound);
        };

        let payload = json!({
            "aps": {
                "alert": { "loc-key": "NewMsg" },
                "mutable-content": 1,
            },
            "uid": user.uid,
            "src": self.node_id,
            "msg": encode_b64url(&data),
        });
        let priority = (message.priority() == APNS_PRIORITY_IMMEDIATE).then_some(APNS_PRIORITY_IMMEDIATE);
        let expiration = chrono::Utc::now().timestamp() + NOTIFICATION_TTL_SECS;

        let mut delivered = 0;
        for device in &devices {
            let notification = Notification {
                device_token: hex::encode(&device.push_token),
                topic: pushers.topic.clone(),
                expiration,
                priority,
                payload: payload.clone(),
            };
            let pusher = if device.sandbox {
                &pushers.sandbox
            } else {
                &pushers.production
            };
            match pusher.push(&notification).await {
                Ok(()) => delivered += 1,
                Err(e) => warn!(uuid = %device.uuid, sandbox = device.sandbox, error = %e, "push failed"),
            }
        }

        if delivered == 0 {
            return Err(RelayError::NotFound);
        }

        let request_id = Uuid::new_v4();
        info!(uid = %user.uid, %request_id, delivered, "message pushed");
        Ok(Delivery::Pushed {
            request_id,
            delivered,
        })
    }

    async fn forward(
        &self,
        token: &Token,
        mut message: Message,
        user: &User,
    ) -> Result<ForwardResponse, RelayError> {
        let Some(upstream) = &self.upstream else {
            return Err(RelayError::Internal("no upstream configured".into()));
        };

        message.disable_token();
        message.encrypt_content(&user.secret)?;

        let response = upstream.push(token.raw(), message.encode()).await?;
        info!(uid = %user.uid, status = response.status, upstream = upstream.endpoint(), "message forwarded");
        Ok(response)
    }
}
