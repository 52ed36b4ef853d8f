//! Node identity and the signed info document clients pin.

use pushnode_shared::types::encode_b64url;
use pushnode_shared::SecretKey;
use pushnode_store::NodeStore;
use serde::Serialize;
use tracing::info;

use crate::error::RelayError;

pub const NODE_SIGN_HEADER: &str = "CHSign-Node";

const NODE_KEY_OPTION: &str = "secret";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NodeInfo {
    pub nodeid: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    pub version: String,
    pub pubkey: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub endpoint: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<String>,
}

pub struct Node {
    key: SecretKey,
    info: NodeInfo,
}

impl Node {
    pub fn new(key: SecretKey, name: &str, endpoint: &str, features: Vec<String>) -> Self {
        let public_key = key.public_key();
        let info = NodeInfo {
            nodeid: key.node_id(),
            name: name.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            pubkey: public_key.to_base64(),
            endpoint: endpoint.to_string(),
            features,
        };
        Self { key, info }
    }

    pub fn id(&self) -> &str {
        &self.info.nodeid
    }

    pub fn info(&self) -> &NodeInfo {
        &self.info
    }

    /// JSON body and its `CHSign-Node` signature.
    pub fn signed_info(&self) -> Result<(Vec<u8>, String), RelayError> {
        let body = serde_json::to_vec(&self.info)
            .map_err(|e| RelayError::Internal(format!("encode node info: {e}")))?;
        let signature = encode_b64url(&self.key.sign(&body));
        Ok((body, signature))
    }
}

/// Feature tags advertised in the info document.
pub fn features(registerable: bool, stores_devices: bool) -> Vec<String> {
    let mut features: Vec<String> = ["msg.text", "msg.link", "msg.action", "msg.timeline"]
        .iter()
        .map(|f| f.to_string())
        .collect();
    if !registerable {
        features.push("register.limit".into());
    }
    if stores_devices {
        features.push("store.device".into());
    }
    features
}

/// The node key: derived from the passphrase when there is one, otherwise
/// generated once and persisted as an option.
pub fn load_node_key(
    passphrase: Option<&str>,
    store: &dyn NodeStore,
) -> Result<SecretKey, RelayError> {
    if let Some(passphrase) = passphrase {
        return SecretKey::from_seed(passphrase.as_bytes())
            .map_err(|e| RelayError::Internal(format!("derive node key: {e}")));
    }

    let stored = match store.get_option(NODE_KEY_OPTION)? {
        Some(bytes) => bytes,
        None => {
            let fresh = SecretKey::generate();
            let stored = store.insert_option_if_absent(NODE_KEY_OPTION, &fresh.to_bytes())?;
            info!("generated node key");
            stored
        }
    };
    SecretKey::from_bytes(&stored)
        .map_err(|e| RelayError::Internal(format!("stored node key: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pushnode_shared::types::decode_b64url;
    use pushnode_shared::PublicKey;
    use pushnode_store::{Database, SecretStore};

    #[test]
    fn test_passphrase_key_is_stable() {
        let store = SecretStore::new(b"unused");
        let a = load_node_key(Some("passphrase"), &store).unwrap();
        let b = load_node_key(Some("passphrase"), &store).unwrap();
        assert_eq!(a.node_id(), b.node_id());
        assert!(a.node_id().starts_with('A'));
    }

    #[test]
    fn test_generated_key_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.db");
        let first = {
            let db = Database::open_at(&path).unwrap();
            load_node_key(None, &db).unwrap()
        };
        let db = Database::open_at(&path).unwrap();
        let second = load_node_key(None, &db).unwrap();
        assert_eq!(first.to_bytes(), second.to_bytes());
    }

    #[test]
    fn test_signed_info_verifies() {
        let key = SecretKey::generate();
        let node = Node::new(key, "home", "https://push.example.com", features(false, true));
        let (body, signature) = node.signed_info().unwrap();

        let doc: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(doc["nodeid"], node.id());
        assert_eq!(doc["name"], "home");
        assert_eq!(doc["endpoint"], "https://push.example.com");
        let tags: Vec<&str> = doc["features"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert!(tags.contains(&"register.limit"));
        assert!(tags.contains(&"store.device"));

        let pubkey = PublicKey::from_base64(doc["pubkey"].as_str().unwrap()).unwrap();
        assert!(pubkey.verify(&body, &decode_b64url(&signature).unwrap()));
    }

    #[test]
    fn test_open_serverless_features() {
        let tags = features(true, false);
        assert!(!tags.iter().any(|t| t == "register.limit" || t == "store.device"));
    }
}
