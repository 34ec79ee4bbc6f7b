//! ChaCha20-Poly1305 helpers shared by the vault (private-half encryption)
//! and the cryptor (payload encryption).

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use custodia_core::constants::{KEY_LEN, NONCE_LEN};

use crate::CryptoError;

/// Generate a fresh random symmetric key.
pub fn random_key() -> Zeroizing<[u8; KEY_LEN]> {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    OsRng.fill_bytes(key.as_mut());
    key
}

/// Generate a fresh random nonce.
pub fn random_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Authenticated encryption. The returned ciphertext carries the Poly1305
/// tag in its final 16 bytes.
pub fn seal(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .encrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| CryptoError::Aead)
}

/// Authenticated decryption. Fails on any tag or AAD mismatch.
pub fn open(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map(Zeroizing::new)
        .map_err(|_| CryptoError::Aead)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_round_trip() {
        let key = random_key();
        let nonce = random_nonce();
        let ct = seal(&key, &nonce, b"header", b"payload").unwrap();
        let pt = open(&key, &nonce, b"header", &ct).unwrap();
        assert_eq!(pt.as_slice(), b"payload");
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let key = random_key();
        let nonce = random_nonce();
        let mut ct = seal(&key, &nonce, b"", b"payload").unwrap();
        ct[0] ^= 1;
        assert!(open(&key, &nonce, b"", &ct).is_err());
    }

    #[test]
    fn wrong_aad_fails() {
        let key = random_key();
        let nonce = random_nonce();
        let ct = seal(&key, &nonce, b"header", b"payload").unwrap();
        assert!(open(&key, &nonce, b"other", &ct).is_err());
    }

    #[test]
    fn wrong_key_fails() {
        let key = random_key();
        let nonce = random_nonce();
        let ct = seal(&key, &nonce, b"", b"payload").unwrap();
        let other = random_key();
        assert!(open(&other, &nonce, b"", &ct).is_err());
    }
}
