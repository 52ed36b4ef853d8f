use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Invalid key")]
    InvalidKey,

    #[error("Invalid message")]
    InvalidMessage,

    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Random number generator failure")]
    Rng,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Invalid public key")]
    InvalidPublicKey,

    #[error("Invalid user id")]
    InvalidUserId,

    #[error("Invalid device id")]
    InvalidDeviceId,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    Expired,

    #[error("Invalid user")]
    InvalidUser,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed")]
    DecryptionFailed,

    #[error("Malformed envelope: {0}")]
    Malformed(String),
}
