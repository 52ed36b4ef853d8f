//! The persistence contract the relay runs against.

use crate::error::Result;
use crate::models::{Device, User};

/// Storage used by registration and dispatch.
///
/// Implementations must make each write atomic: upserts never interleave
/// into a half-written record, and [`NodeStore::insert_option_if_absent`]
/// lets exactly one concurrent writer win.
pub trait NodeStore: Send + Sync {
    fn get_option(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `value` unless `key` already exists. Returns whatever value is
    /// stored afterwards.
    fn insert_option_if_absent(&self, key: &str, value: &[u8]) -> Result<Vec<u8>>;

    /// `StoreError::NotFound` when the user is unknown.
    fn get_user(&self, uid: &str) -> Result<User>;

    /// Create the user, or refresh key and flags of an existing one. The
    /// secret of an existing user is never replaced.
    fn upsert_user(&self, user: &User) -> Result<()>;

    fn bind_device(&self, uid: &str, uuid: &str, public_key: &[u8], device_type: i32)
        -> Result<()>;

    fn unbind_device(&self, uid: &str, uuid: &str) -> Result<()>;

    fn update_push_token(&self, uid: &str, uuid: &str, token: &[u8], sandbox: bool)
        -> Result<()>;

    fn get_device_key(&self, uuid: &str) -> Result<Vec<u8>>;

    /// Devices with a push token, most recently updated first, at most
    /// `MAX_PUSH_DEVICES`.
    fn get_devices(&self, uid: &str) -> Result<Vec<Device>>;

    /// Whether device registrations are kept at all.
    fn stores_devices(&self) -> bool {
        true
    }
}

impl NodeStore for crate::Database {
    fn get_option(&self, key: &str) -> Result<Option<Vec<u8>>> {
        crate::Database::get_option(self, key)
    }

    fn insert_option_if_absent(&self, key: &str, value: &[u8]) -> Result<Vec<u8>> {
        crate::Database::insert_option_if_absent(self, key, value)
    }

    fn get_user(&self, uid: &str) -> Result<User> {
        crate::Database::get_user(self, uid)
    }

    fn upsert_user(&self, user: &User) -> Result<()> {
        crate::Database::upsert_user(self, user)
    }

    fn bind_device(
        &self,
        uid: &str,
        uuid: &str,
        public_key: &[u8],
        device_type: i32,
    ) -> Result<()> {
        crate::Database::bind_device(self, uid, uuid, public_key, device_type)
    }

    fn unbind_device(&self, uid: &str, uuid: &str) -> Result<()> {
        crate::Database::unbind_device(self, uid, uuid)
    }

    fn update_push_token(&self, uid: &str, uuid: &str, token: &[u8], sandbox: bool) -> Result<()> {
        crate::Database::update_push_token(self, uid, uuid, token, sandbox)
    }

    fn get_device_key(&self, uuid: &str) -> Result<Vec<u8>> {
        crate::Database::get_device_key(self, uuid)
    }

    fn get_devices(&self, uid: &str) -> Result<Vec<Device>> {
        crate::Database::get_devices(self, uid)
    }
}
