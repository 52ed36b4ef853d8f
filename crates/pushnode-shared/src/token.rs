//! Sender capability tokens.
//!
//! Wire form is three base64url (no padding) segments joined by `.`:
//!
//! 0. protobuf [`TokenPayload`]
//! 1. reserved issuer signature, carried but not checked
//! 2. HMAC-SHA256 over the raw bytes of segment 0, keyed with the first half
//!    of the recipient's [`UserSecret`]
//!
//! A token is only usable once [`Token::verify`] has checked expiry and the
//! tag against the secret of the user it names.

use chrono::Utc;
use data_encoding::BASE32_NOPAD;
use hmac::{Hmac, Mac};
use prost::Message;
use sha1::{Digest, Sha1};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::TokenError;
use crate::protocol::TokenPayload;
use crate::types::{decode_b64url, encode_b64url, UserSecret};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone)]
pub struct Token {
    raw: String,
    payload: TokenPayload,
    payload_bytes: Vec<u8>,
    reserved_sign: Vec<u8>,
    user_sign: Vec<u8>,
}

impl Token {
    /// Split and decode a token without checking any signature.
    pub fn parse(raw: &str) -> Result<Self, TokenError> {
        let mut segments = raw.split('.');
        let (Some(payload_seg), Some(reserved_seg), Some(sign_seg)) =
            (segments.next(), segments.next(), segments.next())
        else {
            return Err(TokenError::InvalidToken);
        };

        let payload_bytes = decode_b64url(payload_seg).ok_or(TokenError::InvalidToken)?;
        let reserved_sign = decode_b64url(reserved_seg).ok_or(TokenError::InvalidToken)?;
        let user_sign = decode_b64url(sign_seg).ok_or(TokenError::InvalidToken)?;
        let payload =
            TokenPayload::decode(payload_bytes.as_slice()).map_err(|_| TokenError::InvalidToken)?;

        Ok(Self {
            raw: raw.to_string(),
            payload,
            payload_bytes,
            reserved_sign,
            user_sign,
        })
    }

    /// Parse, reject expired tokens, resolve the user and check the HMAC tag.
    ///
    /// `lookup` receives the token's user id and returns the stored user
    /// record, if any.
    pub fn verify<T, F>(raw: &str, lookup: F) -> Result<(Self, T), TokenError>
    where
        T: AsRef<UserSecret>,
        F: FnOnce(&str) -> Option<T>,
    {
        let token = Self::parse(raw)?;
        if token.is_expired() {
            return Err(TokenError::Expired);
        }
        let user = lookup(token.user_id()).ok_or(TokenError::InvalidUser)?;
        if !token.verify_signature(user.as_ref()) {
            return Err(TokenError::InvalidToken);
        }
        Ok((token, user))
    }

    /// Sign `payload` for the holder of `secret`. The reserved segment is
    /// left empty.
    pub fn issue(payload: &TokenPayload, secret: &UserSecret) -> Result<String, TokenError> {
        let bytes = payload.encode_to_vec();
        let tag = hmac_tag(secret)?
            .chain_update(&bytes)
            .finalize()
            .into_bytes();
        Ok(format!("{}..{}", encode_b64url(&bytes), encode_b64url(&tag)))
    }

    pub fn verify_signature(&self, secret: &UserSecret) -> bool {
        let Ok(mac) = hmac_tag(secret) else {
            return false;
        };
        mac.chain_update(&self.payload_bytes)
            .verify_slice(&self.user_sign)
            .is_ok()
    }

    pub fn is_expired(&self) -> bool {
        let now = Utc::now().timestamp().max(0) as u64;
        self.is_expired_at(now)
    }

    pub fn is_expired_at(&self, now_secs: u64) -> bool {
        now_secs >= self.payload.expires
    }

    /// True only when the token carries a data hash equal to `sha1(path)`.
    pub fn verify_data_hash(&self, path: &str) -> bool {
        if self.payload.data_hash.is_empty() || path.is_empty() {
            return false;
        }
        let digest = Sha1::digest(path.as_bytes());
        digest.as_slice().ct_eq(&self.payload.data_hash).into()
    }

    /// Empty unless the token is scoped to a single request path.
    pub fn data_hash(&self) -> &[u8] {
        &self.payload.data_hash
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn user_id(&self) -> &str {
        &self.payload.user_id
    }

    pub fn node_id(&self) -> &str {
        &self.payload.node_id
    }

    /// Decoded node id, as carried in the envelope `from` field. Empty when
    /// the id is not base32.
    pub fn node_id_bytes(&self) -> Vec<u8> {
        BASE32_NOPAD
            .decode(self.payload.node_id.as_bytes())
            .unwrap_or_default()
    }

    pub fn channel(&self) -> &[u8] {
        &self.payload.channel
    }

    pub fn expires(&self) -> u64 {
        self.payload.expires
    }

    pub fn reserved_signature(&self) -> &[u8] {
        &self.reserved_sign
    }
}

fn hmac_tag(secret: &UserSecret) -> Result<HmacSha256, TokenError> {
    <HmacSha256 as Mac>::new_from_slice(secret.key()).map_err(|_| TokenError::InvalidToken)
}
