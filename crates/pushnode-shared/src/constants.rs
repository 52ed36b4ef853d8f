/// Application name, also used as the context string for seeded key
/// generation.
pub const APP_NAME: &str = "pushnode";

/// Length of an uncompressed SEC1 P-256 point (`0x04 ‖ X ‖ Y`).
pub const PUBLIC_KEY_SIZE: usize = 65;

/// Raw P-256 scalar size in bytes.
pub const SECRET_KEY_SIZE: usize = 32;

/// Per-user secret: `[0:32]` key material, `[32:64]` associated data.
pub const USER_SECRET_SIZE: usize = 64;

/// Output of the X9.63 KDF used by the ECIES scheme.
pub const ECIES_KDF_SIZE: usize = 32;

/// AES-128 key length inside the ECIES derived block.
pub const ECIES_KEY_SIZE: usize = 16;

/// Fixed prefix of the timestamped AES-256-GCM nonce.
pub const DATA_NONCE_PREFIX: [u8; 4] = [0x01, 0x01, 0x00, 0x08];

/// AES-GCM nonce length for both envelope policies.
pub const AEAD_NONCE_SIZE: usize = 12;

/// Identifier namespace byte for user ids.
pub const USER_ID_CODE: u8 = 0x00;

/// Identifier namespace byte for node ids.
pub const NODE_ID_CODE: u8 = 0x01;

/// Maximum number of action buttons on one message.
pub const MAX_ACTION_ITEMS: usize = 4;

/// Maximum number of devices that receive a single direct push.
pub const MAX_PUSH_DEVICES: usize = 4;

/// Largest encrypted payload (nonce included) accepted for a direct push.
pub const MAX_PUSH_PAYLOAD: usize = 4000;
