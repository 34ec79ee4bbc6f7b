pub mod aead;
pub mod kdf;
pub mod keypair;
pub mod shamir;

pub use aead::{open, random_key, random_nonce, seal};
pub use kdf::{derive_password_keys, PasswordKeys};
pub use keypair::{fingerprint, unwrap_with_secret, wrap_to_public, EcKeyPair, WrappedKey};
pub use shamir::{combine, split, xor_combine, xor_split, Share};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("key derivation failed")]
    Kdf,

    #[error("authenticated decryption failed")]
    Aead,

    #[error("invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    #[error("invalid share set: {0}")]
    InvalidShares(String),
}

impl From<CryptoError> for custodia_core::CustodiaError {
    fn from(e: CryptoError) -> Self {
        custodia_core::CustodiaError::Crypto(e.to_string())
    }
}
