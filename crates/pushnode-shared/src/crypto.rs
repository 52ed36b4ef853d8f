//! P-256 key handling: ECIES encryption, ECDSA signatures and key
//! (de)serialisation.
//!
//! The ECIES scheme is ephemeral ECDH followed by an X9.63 SHA-256 KDF
//! whose shared info is the ephemeral public key. The 32 derived bytes are
//! split into an AES-128 key and a 16-byte GCM nonce. Ciphertexts are laid
//! out as `ephemeral_pub(65) ‖ ciphertext ‖ tag`.

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::aes::Aes128;
use aes_gcm::{AesGcm, Nonce};
use p256::ecdh::diffie_hellman;
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;

use crate::constants::{APP_NAME, ECIES_KDF_SIZE, ECIES_KEY_SIZE, PUBLIC_KEY_SIZE, SECRET_KEY_SIZE};
use crate::error::CryptoError;
use crate::identity;
use crate::kdf::{x963_kdf, SeedExpander};
use crate::types::{decode_b64url, encode_b64url};

type EciesCipher = AesGcm<Aes128, U16>;

/// A P-256 private key.
#[derive(Clone)]
pub struct SecretKey {
    inner: p256::SecretKey,
}

/// A P-256 public key, always exported as an uncompressed SEC1 point.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicKey {
    inner: p256::PublicKey,
}

impl SecretKey {
    /// Generate a new random key from the OS RNG.
    pub fn generate() -> Self {
        Self {
            inner: p256::SecretKey::random(&mut OsRng),
        }
    }

    /// Derive a key deterministically from an operator seed.
    ///
    /// 32-byte candidates are read from the HKDF-SHA1 expand stream until
    /// one is a valid non-zero scalar below the curve order.
    pub fn from_seed(seed: &[u8]) -> Result<Self, CryptoError> {
        let mut stream = SeedExpander::new(seed, APP_NAME.as_bytes())?;
        loop {
            let mut candidate = [0u8; SECRET_KEY_SIZE];
            stream.fill(&mut candidate)?;
            if let Ok(inner) = p256::SecretKey::from_slice(&candidate) {
                return Ok(Self { inner });
            }
        }
    }

    /// Restore from the raw 32-byte scalar.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != SECRET_KEY_SIZE {
            return Err(CryptoError::InvalidKey);
        }
        let inner = p256::SecretKey::from_slice(bytes).map_err(|_| CryptoError::InvalidKey)?;
        Ok(Self { inner })
    }

    pub fn to_bytes(&self) -> [u8; SECRET_KEY_SIZE] {
        self.inner.to_bytes().into()
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            inner: self.inner.public_key(),
        }
    }

    /// Identifier of the node owning this key.
    pub fn node_id(&self) -> String {
        self.public_key().to_id(crate::constants::NODE_ID_CODE)
    }

    /// ECDSA over SHA-256, DER-encoded.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        let signing_key = SigningKey::from(&self.inner);
        let signature: Signature = signing_key.sign(message);
        signature.to_der().as_bytes().to_vec()
    }

    /// Open an ECIES ciphertext addressed to this key.
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let Some(&marker) = data.first() else {
            return Err(CryptoError::InvalidMessage);
        };
        if !matches!(marker, 0x02..=0x04) {
            return Err(CryptoError::InvalidKey);
        }
        // The point length comes from the curve size, not from the marker.
        if data.len() < PUBLIC_KEY_SIZE {
            return Err(CryptoError::InvalidKey);
        }
        let (point, ciphertext) = data.split_at(PUBLIC_KEY_SIZE);
        let ephemeral =
            p256::PublicKey::from_sec1_bytes(point).map_err(|_| CryptoError::InvalidKey)?;

        let shared = diffie_hellman(self.inner.to_nonzero_scalar(), ephemeral.as_affine());
        ecies_cipher(shared.raw_secret_bytes(), point)?.open(ciphertext)
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretKey(..)")
    }
}

impl PublicKey {
    /// Parse an uncompressed SEC1 point.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != PUBLIC_KEY_SIZE || bytes[0] != 0x04 {
            return Err(CryptoError::InvalidKey);
        }
        let inner = p256::PublicKey::from_sec1_bytes(bytes).map_err(|_| CryptoError::InvalidKey)?;
        Ok(Self { inner })
    }

    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = decode_b64url(encoded).ok_or(CryptoError::InvalidKey)?;
        Self::from_bytes(&bytes)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.inner.to_encoded_point(false).as_bytes().to_vec()
    }

    pub fn to_base64(&self) -> String {
        encode_b64url(&self.to_bytes())
    }

    /// Namespaced identifier, see [`identity::format_id`].
    pub fn to_id(&self, code: u8) -> String {
        identity::format_id(code, &self.to_bytes())
    }

    /// Check a DER-encoded ECDSA signature. Malformed signatures simply do
    /// not verify.
    pub fn verify(&self, message: &[u8], der_signature: &[u8]) -> bool {
        let Ok(signature) = Signature::from_der(der_signature) else {
            return false;
        };
        VerifyingKey::from(&self.inner)
            .verify(message, &signature)
            .is_ok()
    }

    /// ECIES-encrypt `plaintext` to this key with a fresh ephemeral key.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let ephemeral = p256::SecretKey::random(&mut OsRng);
        let ephemeral_point = ephemeral.public_key().to_encoded_point(false);

        let shared = diffie_hellman(ephemeral.to_nonzero_scalar(), self.inner.as_affine());
        let ciphertext =
            ecies_cipher(shared.raw_secret_bytes(), ephemeral_point.as_bytes())?.seal(plaintext)?;

        let mut output = Vec::with_capacity(PUBLIC_KEY_SIZE + ciphertext.len());
        output.extend_from_slice(ephemeral_point.as_bytes());
        output.extend_from_slice(&ciphertext);
        Ok(output)
    }
}

/// AES-128-GCM keyed from `x963(Z, ephemeral)`, carrying its derived nonce.
struct DerivedCipher {
    cipher: EciesCipher,
    nonce: [u8; ECIES_KDF_SIZE - ECIES_KEY_SIZE],
}

impl DerivedCipher {
    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.cipher
            .encrypt(Nonce::<U16>::from_slice(&self.nonce), plaintext)
            .map_err(|_| CryptoError::EncryptionFailed)
    }

    fn open(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.cipher
            .decrypt(Nonce::<U16>::from_slice(&self.nonce), ciphertext)
            .map_err(|_| CryptoError::InvalidMessage)
    }
}

fn ecies_cipher(shared_x: &[u8], ephemeral_point: &[u8]) -> Result<DerivedCipher, CryptoError> {
    let mut derived = [0u8; ECIES_KDF_SIZE];
    x963_kdf(shared_x, ephemeral_point, &mut derived);

    let cipher = EciesCipher::new_from_slice(&derived[..ECIES_KEY_SIZE])
        .map_err(|_| CryptoError::InvalidKey)?;
    let mut nonce = [0u8; ECIES_KDF_SIZE - ECIES_KEY_SIZE];
    nonce.copy_from_slice(&derived[ECIES_KEY_SIZE..]);
    Ok(DerivedCipher { cipher, nonce })
}
