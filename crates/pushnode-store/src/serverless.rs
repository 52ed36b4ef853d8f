//! A store without storage, for nodes that only forward.
//!
//! Every user's secret is derived from the operator passphrase:
//!
//! ```text
//! material = passphrase ‖ sha256("")
//! secret   = sha512(material ‖ base32decode(uid))
//! ```
//!
//! so any node configured with the same passphrase verifies the same
//! tokens. Users are always serverless and no devices are kept.

use data_encoding::BASE32_NOPAD;
use pushnode_shared::UserSecret;
use sha2::{Digest, Sha256, Sha512};

use crate::error::{Result, StoreError};
use crate::models::{Device, User};
use crate::store::NodeStore;

pub struct SecretStore {
    material: Vec<u8>,
}

impl SecretStore {
    pub fn new(passphrase: &[u8]) -> Self {
        let mut material = passphrase.to_vec();
        material.extend_from_slice(&Sha256::digest(b""));
        Self { material }
    }

    fn derive_secret(&self, uid: &str) -> Result<UserSecret> {
        let raw_id = BASE32_NOPAD
            .decode(uid.as_bytes())
            .map_err(|_| StoreError::NotFound)?;
        let mut hasher = Sha512::new();
        hasher.update(&self.material);
        hasher.update(&raw_id);
        UserSecret::from_slice(&hasher.finalize()).ok_or(StoreError::Corrupt("derived secret"))
    }
}

impl NodeStore for SecretStore {
    fn get_option(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    // Nothing is persisted; the caller's value is returned as-is.
    fn insert_option_if_absent(&self, _key: &str, value: &[u8]) -> Result<Vec<u8>> {
        Ok(value.to_vec())
    }

    fn get_user(&self, uid: &str) -> Result<User> {
        Ok(User {
            uid: uid.to_string(),
            public_key: Vec::new(),
            secret: self.derive_secret(uid)?,
            flags: 0,
        })
    }

    fn upsert_user(&self, _user: &User) -> Result<()> {
        Ok(())
    }

    fn bind_device(&self, _uid: &str, _uuid: &str, _key: &[u8], _device_type: i32) -> Result<()> {
        Err(StoreError::Unsupported)
    }

    fn unbind_device(&self, _uid: &str, _uuid: &str) -> Result<()> {
        Ok(())
    }

    fn update_push_token(&self, _uid: &str, _uuid: &str, _token: &[u8], _sandbox: bool) -> Result<()> {
        Err(StoreError::Unsupported)
    }

    fn get_device_key(&self, _uuid: &str) -> Result<Vec<u8>> {
        Err(StoreError::NotFound)
    }

    fn get_devices(&self, _uid: &str) -> Result<Vec<Device>> {
        Ok(Vec::new())
    }

    fn stores_devices(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UID: &str = "ABOO6TSIXKSEVIJKXLDQSUXQRXUAOXGGYY";

    #[test]
    fn test_secret_derivation() {
        let store = SecretStore::new(b"passphrase");
        let user = store.get_user(UID).unwrap();
        assert!(user.is_serverless());

        let mut hasher = Sha512::new();
        hasher.update(b"passphrase");
        hasher.update(Sha256::digest(b""));
        hasher.update(BASE32_NOPAD.decode(UID.as_bytes()).unwrap());
        assert_eq!(user.secret.as_bytes().as_slice(), hasher.finalize().as_slice());
    }

    #[test]
    fn test_same_passphrase_same_secret() {
        let a = SecretStore::new(b"shared").get_user(UID).unwrap();
        let b = SecretStore::new(b"shared").get_user(UID).unwrap();
        let c = SecretStore::new(b"other").get_user(UID).unwrap();
        assert_eq!(a.secret, b.secret);
        assert_ne!(a.secret, c.secret);
    }

    #[test]
    fn test_invalid_uid_is_unknown() {
        let store = SecretStore::new(b"passphrase");
        assert!(matches!(store.get_user("not-base32!"), Err(StoreError::NotFound)));
    }

    #[test]
    fn test_devices_unsupported() {
        let store = SecretStore::new(b"passphrase");
        assert!(!store.stores_devices());
        assert!(store.get_devices(UID).unwrap().is_empty());
        assert!(matches!(
            store.bind_device(UID, "DEV", b"key", 0),
            Err(StoreError::Unsupported)
        ));
    }
}
