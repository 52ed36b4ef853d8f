//! Self-certifying identifiers.
//!
//! A user id commits to the user's public key, so a claimed `(uid, key)`
//! pair can be checked without any registry:
//!
//! ```text
//! uid    = base32(0x00 ‖ sha1(sha256(pk) ‖ pk))
//! nodeId = base32(0x01 ‖ sha1(sha256(pk) ‖ pk))
//! uuid   = UPPER(hex(sha1(pk)))
//! ```
//!
//! base32 is the RFC 4648 alphabet without padding.

use data_encoding::BASE32_NOPAD;
use sha1::{Digest, Sha1};
use sha2::Sha256;

use crate::constants::USER_ID_CODE;
use crate::crypto::PublicKey;
use crate::error::IdentityError;
use crate::types::decode_b64url;

/// Namespaced key fingerprint shared by user and node identifiers.
pub fn format_id(code: u8, public_key: &[u8]) -> String {
    let inner = Sha256::digest(public_key);
    let mut hasher = Sha1::new();
    hasher.update(inner);
    hasher.update(public_key);
    let fingerprint = hasher.finalize();

    let mut raw = Vec::with_capacity(1 + fingerprint.len());
    raw.push(code);
    raw.extend_from_slice(&fingerprint);
    BASE32_NOPAD.encode(&raw)
}

pub fn format_device_id(public_key: &[u8]) -> String {
    hex::encode_upper(Sha1::digest(public_key))
}

pub fn is_user_id(uid: &str, public_key: &[u8]) -> bool {
    format_id(USER_ID_CODE, public_key) == uid
}

pub fn is_device_id(uuid: &str, public_key: &[u8]) -> bool {
    format_device_id(public_key) == uuid
}

/// Decode a claimed user key and check that it hashes to `uid`.
pub fn calc_user_key(uid: &str, encoded_key: &str) -> Result<PublicKey, IdentityError> {
    let bytes = decode_b64url(encoded_key).ok_or(IdentityError::InvalidPublicKey)?;
    let key = PublicKey::from_bytes(&bytes).map_err(|_| IdentityError::InvalidPublicKey)?;
    if !is_user_id(uid, &bytes) {
        return Err(IdentityError::InvalidUserId);
    }
    Ok(key)
}

/// Decode a claimed device key and check that it hashes to `uuid`.
pub fn calc_device_key(uuid: &str, encoded_key: &str) -> Result<PublicKey, IdentityError> {
    let bytes = decode_b64url(encoded_key).ok_or(IdentityError::InvalidPublicKey)?;
    let key = PublicKey::from_bytes(&bytes).map_err(|_| IdentityError::InvalidPublicKey)?;
    if !is_device_id(uuid, &bytes) {
        return Err(IdentityError::InvalidDeviceId);
    }
    Ok(key)
}
