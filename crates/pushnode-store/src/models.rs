//! Records kept by a node.

use pushnode_shared::crypto::PublicKey;
use pushnode_shared::error::CryptoError;
use pushnode_shared::UserSecret;

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// Set once a user has bound at least one device to this node.
pub const USER_FLAG_SERVERFUL: u32 = 0x01;

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Self-certifying id, see `pushnode_shared::identity`.
    pub uid: String,
    /// Uncompressed SEC1 key. Empty for users derived by a serverless store.
    pub public_key: Vec<u8>,
    /// Token and envelope secret shared with the user's devices.
    pub secret: UserSecret,
    pub flags: u32,
}

impl User {
    /// Serverless users have no devices here; their messages go upstream.
    pub fn is_serverless(&self) -> bool {
        self.flags & USER_FLAG_SERVERFUL == 0
    }

    pub fn public_key(&self) -> Result<PublicKey, CryptoError> {
        PublicKey::from_bytes(&self.public_key)
    }
}

impl AsRef<UserSecret> for User {
    fn as_ref(&self) -> &UserSecret {
        &self.secret
    }
}

// ---------------------------------------------------------------------------
// Device
// ---------------------------------------------------------------------------

/// A device bound to a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub uuid: String,
    pub uid: String,
    pub public_key: Vec<u8>,
    /// APNs device token, empty until the device reports one.
    pub push_token: Vec<u8>,
    /// Deliver through the APNs development environment.
    pub sandbox: bool,
    pub device_type: i32,
}
