//! The Password Vault: a persistent, authenticated store of user records.
//!
//! Each record holds a password verifier and an asymmetric key pair whose
//! private half is encrypted under a key derived from the user's password.
//! The vault never sees a private key in the clear except transiently while
//! servicing a delegation, and never persists one.

pub mod record;
pub mod store;

pub use record::{Record, SealedPrivateKey};
pub use store::Vault;
