//! Password key derivation.
//!
//! Each password passes through Argon2id once (the deliberately slow step),
//! then BLAKE3 key derivation splits the result into two domain-separated
//! keys: the stored password **verifier** and the private-key **wrap key**.
//! Learning the verifier reveals nothing about the wrap key.

use argon2::{Algorithm, Argon2, Params, Version};
use zeroize::Zeroizing;

use custodia_core::constants::{KDF_M_COST_KIB, KDF_P_COST, KDF_T_COST, KEY_LEN, SALT_LEN};

use crate::CryptoError;

const VERIFIER_CONTEXT: &str = "custodia 2025-09-01 password verifier";
const WRAP_CONTEXT: &str = "custodia 2025-09-01 private key wrap";

/// The two keys derived from one password + salt.
pub struct PasswordKeys {
    verifier: [u8; KEY_LEN],
    wrap_key: Zeroizing<[u8; KEY_LEN]>,
}

/// Run the KDF for `password` under `salt`.
pub fn derive_password_keys(
    password: &str,
    salt: &[u8; SALT_LEN],
) -> Result<PasswordKeys, CryptoError> {
    let params = Params::new(KDF_M_COST_KIB, KDF_T_COST, KDF_P_COST, Some(KEY_LEN))
        .map_err(|_| CryptoError::Kdf)?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut master = Zeroizing::new([0u8; KEY_LEN]);
    argon2
        .hash_password_into(password.as_bytes(), salt, master.as_mut())
        .map_err(|_| CryptoError::Kdf)?;

    let verifier = blake3::derive_key(VERIFIER_CONTEXT, master.as_ref());
    let wrap_key = Zeroizing::new(blake3::derive_key(WRAP_CONTEXT, master.as_ref()));

    Ok(PasswordKeys { verifier, wrap_key })
}

impl PasswordKeys {
    /// The verifier bytes, safe to persist.
    pub fn verifier(&self) -> &[u8; KEY_LEN] {
        &self.verifier
    }

    /// The private-key wrap key. Never persisted.
    pub fn wrap_key(&self) -> &[u8; KEY_LEN] {
        &self.wrap_key
    }

    /// Constant-time comparison against a stored verifier.
    pub fn matches(&self, stored_verifier: &[u8]) -> bool {
        ct_eq(&self.verifier, stored_verifier)
    }
}

/// Constant-time byte-slice equality.
fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_password_same_keys() {
        let salt = [7u8; SALT_LEN];
        let a = derive_password_keys("hunter2", &salt).unwrap();
        let b = derive_password_keys("hunter2", &salt).unwrap();
        assert_eq!(a.verifier(), b.verifier());
        assert_eq!(a.wrap_key(), b.wrap_key());
    }

    #[test]
    fn different_password_different_keys() {
        let salt = [7u8; SALT_LEN];
        let a = derive_password_keys("hunter2", &salt).unwrap();
        let b = derive_password_keys("hunter3", &salt).unwrap();
        assert_ne!(a.verifier(), b.verifier());
        assert!(!b.matches(a.verifier()));
    }

    #[test]
    fn different_salt_different_keys() {
        let a = derive_password_keys("hunter2", &[1u8; SALT_LEN]).unwrap();
        let b = derive_password_keys("hunter2", &[2u8; SALT_LEN]).unwrap();
        assert_ne!(a.verifier(), b.verifier());
    }

    #[test]
    fn verifier_and_wrap_key_are_domain_separated() {
        let keys = derive_password_keys("hunter2", &[7u8; SALT_LEN]).unwrap();
        assert_ne!(keys.verifier(), keys.wrap_key().as_slice());
    }

    #[test]
    fn matches_is_exact() {
        let keys = derive_password_keys("hunter2", &[7u8; SALT_LEN]).unwrap();
        assert!(keys.matches(keys.verifier()));
        let mut tampered = *keys.verifier();
        tampered[0] ^= 1;
        assert!(!keys.matches(&tampered));
        assert!(!keys.matches(&tampered[..31]));
    }
}
