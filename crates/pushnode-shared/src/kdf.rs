//! Key derivation functions used by the asymmetric layer.
//!
//! * [`x963_kdf`]: ANSI X9.63 with SHA-256, feeding the ECIES cipher.
//! * [`SeedExpander`]: the expand half of HKDF (HMAC-SHA1) used to turn an
//!   operator passphrase into a reproducible stream of scalar candidates.

use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::error::CryptoError;

type HmacSha1 = Hmac<Sha1>;

const SHA1_LEN: usize = 20;

/// HKDF-Expand caps the output at 255 blocks.
const MAX_EXPAND_BLOCKS: u8 = 255;

/// Fill `out` with `H(Z ‖ counter ‖ shared_info)` blocks, counter starting
/// at 1 and encoded as a big-endian u32.
pub fn x963_kdf(z: &[u8], shared_info: &[u8], out: &mut [u8]) {
    let mut counter: u32 = 1;
    for chunk in out.chunks_mut(32) {
        let mut hasher = Sha256::new();
        hasher.update(z);
        hasher.update(counter.to_be_bytes());
        hasher.update(shared_info);
        let digest = hasher.finalize();
        chunk.copy_from_slice(&digest[..chunk.len()]);
        counter += 1;
    }
}

/// Streaming HKDF-Expand with `seed` used directly as the PRK.
///
/// Unlike `hkdf::Hkdf::from_prk` there is no minimum PRK length, so short
/// passphrases are accepted as they are.
pub struct SeedExpander {
    mac: HmacSha1,
    info: Vec<u8>,
    block: [u8; SHA1_LEN],
    offset: usize,
    counter: u8,
}

impl SeedExpander {
    pub fn new(seed: &[u8], info: &[u8]) -> Result<Self, CryptoError> {
        let mac = <HmacSha1 as Mac>::new_from_slice(seed).map_err(|_| CryptoError::InvalidKey)?;
        Ok(Self {
            mac,
            info: info.to_vec(),
            block: [0u8; SHA1_LEN],
            offset: SHA1_LEN,
            counter: 0,
        })
    }

    /// Fill `out` with the next bytes of the expand stream.
    pub fn fill(&mut self, out: &mut [u8]) -> Result<(), CryptoError> {
        for byte in out.iter_mut() {
            if self.offset == SHA1_LEN {
                self.next_block()?;
            }
            *byte = self.block[self.offset];
            self.offset += 1;
        }
        Ok(())
    }

    // T(n) = HMAC(PRK, T(n-1) ‖ info ‖ n)
    fn next_block(&mut self) -> Result<(), CryptoError> {
        if self.counter == MAX_EXPAND_BLOCKS {
            return Err(CryptoError::InvalidKey);
        }
        self.counter += 1;
        let mut mac = self.mac.clone();
        if self.counter > 1 {
            mac.update(&self.block);
        }
        mac.update(&self.info);
        mac.update(&[self.counter]);
        self.block.copy_from_slice(&mac.finalize().into_bytes());
        self.offset = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_x963_single_block_matches_manual_hash() {
        let z = [0x11u8; 32];
        let info = [0x04u8; 65];
        let mut out = [0u8; 32];
        x963_kdf(&z, &info, &mut out);

        let mut hasher = Sha256::new();
        hasher.update(z);
        hasher.update(1u32.to_be_bytes());
        hasher.update(info);
        assert_eq!(out.as_slice(), hasher.finalize().as_slice());
    }

    #[test]
    fn test_x963_longer_output_uses_second_counter() {
        let mut short = [0u8; 32];
        let mut long = [0u8; 48];
        x963_kdf(b"z", b"info", &mut short);
        x963_kdf(b"z", b"info", &mut long);
        assert_eq!(&long[..32], &short[..]);

        let mut hasher = Sha256::new();
        hasher.update(b"z");
        hasher.update(2u32.to_be_bytes());
        hasher.update(b"info");
        assert_eq!(&long[32..], &hasher.finalize()[..16]);
    }

    // RFC 5869 test case 7 (SHA-1, zero-length salt). The PRK is the
    // extract output given in the RFC.
    #[test]
    fn test_expand_matches_rfc5869() {
        let prk = hex::decode("2adccada18779e7c2077ad2eb19d3f3e731385dd").unwrap();
        let mut expander = SeedExpander::new(&prk, b"").unwrap();
        let mut okm = [0u8; 42];
        expander.fill(&mut okm).unwrap();
        assert_eq!(
            hex::encode(okm),
            "2c91117204d745f3500d636a62f64f0ab3bae548aa53d423b0d1f27ebba6f5e5673a081d70cce7acfc48"
        );
    }

    #[test]
    fn test_expand_is_a_continuous_stream() {
        let mut whole = SeedExpander::new(b"seed", b"ctx").unwrap();
        let mut a = [0u8; 50];
        whole.fill(&mut a).unwrap();

        let mut split = SeedExpander::new(b"seed", b"ctx").unwrap();
        let mut b1 = [0u8; 7];
        let mut b2 = [0u8; 43];
        split.fill(&mut b1).unwrap();
        split.fill(&mut b2).unwrap();

        assert_eq!(&a[..7], &b1);
        assert_eq!(&a[7..], &b2);
    }

    #[test]
    fn test_expand_stream_is_bounded() {
        let mut expander = SeedExpander::new(b"seed", b"ctx").unwrap();
        let mut buf = vec![0u8; 255 * SHA1_LEN];
        expander.fill(&mut buf).unwrap();
        assert!(expander.fill(&mut [0u8; 1]).is_err());
    }
}
