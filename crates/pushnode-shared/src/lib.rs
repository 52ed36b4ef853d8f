//! # pushnode-shared
//!
//! Cryptographic core of the push relay: self-certifying identifiers,
//! P-256 ECIES and ECDSA, sender tokens and the encrypted message envelope.
//! Everything here is synchronous and free of I/O.

pub mod clock;
pub mod constants;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod identity;
pub mod kdf;
pub mod protocol;
pub mod token;
pub mod types;

pub use crypto::{PublicKey, SecretKey};
pub use envelope::{Content, Message};
pub use token::Token;
pub use types::UserSecret;
