use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::{CryptoRng, RngCore};

use crate::constants::USER_SECRET_SIZE;
use crate::error::CryptoError;

/// A user's 64-byte shared secret.
///
/// The first half keys HMAC-SHA256 token tags and AES-256-GCM envelopes,
/// the second half is the AEAD associated data. The two halves are only
/// reachable through [`UserSecret::key`] and [`UserSecret::aad`].
#[derive(Clone, PartialEq, Eq)]
pub struct UserSecret([u8; USER_SECRET_SIZE]);

impl UserSecret {
    pub fn new(bytes: [u8; USER_SECRET_SIZE]) -> Self {
        Self(bytes)
    }

    /// Fill a fresh secret from `rng`. A failing generator is an error,
    /// never a zeroed secret.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Result<Self, CryptoError> {
        let mut bytes = [0u8; USER_SECRET_SIZE];
        rng.try_fill_bytes(&mut bytes).map_err(|_| CryptoError::Rng)?;
        Ok(Self(bytes))
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; USER_SECRET_SIZE] = bytes.try_into().ok()?;
        Some(Self(arr))
    }

    pub fn key(&self) -> &[u8] {
        &self.0[..32]
    }

    pub fn aad(&self) -> &[u8] {
        &self.0[32..]
    }

    pub fn as_bytes(&self) -> &[u8; USER_SECRET_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for UserSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("UserSecret(..)")
    }
}

/// base64url without padding, the encoding used for keys, signatures and
/// token segments on the wire.
pub fn encode_b64url(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

pub fn decode_b64url(data: &str) -> Option<Vec<u8>> {
    URL_SAFE_NO_PAD.decode(data).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    struct BrokenRng;

    impl RngCore for BrokenRng {
        fn next_u32(&mut self) -> u32 {
            0
        }
        fn next_u64(&mut self) -> u64 {
            0
        }
        fn fill_bytes(&mut self, dest: &mut [u8]) {
            dest.fill(0)
        }
        fn try_fill_bytes(&mut self, _dest: &mut [u8]) -> Result<(), rand::Error> {
            Err(rand::Error::new(std::io::Error::other("entropy unavailable")))
        }
    }

    impl CryptoRng for BrokenRng {}

    #[test]
    fn test_secret_halves() {
        let mut bytes = [0u8; 64];
        bytes[..32].fill(1);
        bytes[32..].fill(2);
        let secret = UserSecret::new(bytes);
        assert_eq!(secret.key(), &[1u8; 32]);
        assert_eq!(secret.aad(), &[2u8; 32]);
    }

    #[test]
    fn test_generate_is_random() {
        let a = UserSecret::generate(&mut OsRng).unwrap();
        let b = UserSecret::generate(&mut OsRng).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_generate_propagates_rng_failure() {
        assert_eq!(
            UserSecret::generate(&mut BrokenRng).unwrap_err(),
            CryptoError::Rng
        );
    }

    #[test]
    fn test_from_slice_requires_64_bytes() {
        assert!(UserSecret::from_slice(&[0u8; 63]).is_none());
        assert!(UserSecret::from_slice(&[0u8; 64]).is_some());
    }

    #[test]
    fn test_debug_is_redacted() {
        let secret = UserSecret::new([7u8; 64]);
        assert_eq!(format!("{secret:?}"), "UserSecret(..)");
    }
}
