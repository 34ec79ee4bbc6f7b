//! Per-user x25519 key pairs and share wrapping.
//!
//! Wrapping is ephemeral-static ECDH: a fresh ephemeral key agrees with the
//! recipient's static public key, the shared secret feeds a BLAKE3 key
//! derivation bound to both public keys, and the derived key seals the
//! payload with ChaCha20-Poly1305.

use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};
use zeroize::Zeroizing;

use custodia_core::constants::{KEY_LEN, NONCE_LEN};
use custodia_core::encoding::b64;

use crate::{aead, CryptoError};

const WRAP_CONTEXT: &str = "custodia 2025-09-01 ecdh share wrap";

/// A user's x25519 key pair. The secret half wipes itself on drop.
pub struct EcKeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl EcKeyPair {
    /// Generate a fresh key pair.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Restore a key pair from raw secret bytes (e.g. a vault record's
    /// decrypted private half).
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; KEY_LEN] = bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength {
            expected: KEY_LEN,
            got: bytes.len(),
        })?;
        let secret = StaticSecret::from(arr);
        let public = PublicKey::from(&secret);
        Ok(Self { secret, public })
    }

    pub fn public_bytes(&self) -> [u8; KEY_LEN] {
        *self.public.as_bytes()
    }

    /// The raw secret bytes, in a wiping container.
    pub fn secret_bytes(&self) -> Zeroizing<[u8; KEY_LEN]> {
        Zeroizing::new(self.secret.to_bytes())
    }
}

impl std::fmt::Debug for EcKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EcKeyPair {{ public: {} }}", fingerprint(self.public.as_bytes()))
    }
}

/// A payload sealed to one recipient's public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedKey {
    /// Ephemeral public key for this wrap.
    #[serde(rename = "Ephemeral", with = "b64")]
    pub ephemeral: Vec<u8>,
    #[serde(rename = "Nonce", with = "b64")]
    pub nonce: Vec<u8>,
    #[serde(rename = "Key", with = "b64")]
    pub ciphertext: Vec<u8>,
}

/// Seal `plaintext` to the holder of the secret half of `recipient_public`.
pub fn wrap_to_public(
    recipient_public: &[u8; KEY_LEN],
    plaintext: &[u8],
) -> Result<WrappedKey, CryptoError> {
    let ephemeral = EphemeralSecret::random_from_rng(OsRng);
    let ephemeral_public = PublicKey::from(&ephemeral);
    let shared = ephemeral.diffie_hellman(&PublicKey::from(*recipient_public));

    let key = derive_wrap_key(shared.as_bytes(), ephemeral_public.as_bytes(), recipient_public);
    let nonce = aead::random_nonce();
    let ciphertext = aead::seal(&key, &nonce, &[], plaintext)?;

    Ok(WrappedKey {
        ephemeral: ephemeral_public.as_bytes().to_vec(),
        nonce: nonce.to_vec(),
        ciphertext,
    })
}

/// Unseal a [`WrappedKey`] with the recipient's key pair.
pub fn unwrap_with_secret(
    keypair: &EcKeyPair,
    wrapped: &WrappedKey,
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let ephemeral: [u8; KEY_LEN] =
        wrapped
            .ephemeral
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength {
                expected: KEY_LEN,
                got: wrapped.ephemeral.len(),
            })?;
    let nonce: [u8; NONCE_LEN] =
        wrapped
            .nonce
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength {
                expected: NONCE_LEN,
                got: wrapped.nonce.len(),
            })?;

    let shared = keypair.secret.diffie_hellman(&PublicKey::from(ephemeral));
    let key = derive_wrap_key(shared.as_bytes(), &ephemeral, keypair.public.as_bytes());
    aead::open(&key, &nonce, &[], &wrapped.ciphertext)
}

/// Derive the wrap key from the DH output bound to both public keys.
fn derive_wrap_key(
    shared: &[u8; KEY_LEN],
    ephemeral_public: &[u8; KEY_LEN],
    recipient_public: &[u8; KEY_LEN],
) -> Zeroizing<[u8; KEY_LEN]> {
    let mut hasher = blake3::Hasher::new_derive_key(WRAP_CONTEXT);
    hasher.update(shared);
    hasher.update(ephemeral_public);
    hasher.update(recipient_public);
    Zeroizing::new(*hasher.finalize().as_bytes())
}

/// Short public-key fingerprint for summaries and logs: first 8 bytes of
/// BLAKE3, hex-encoded.
pub fn fingerprint(public: &[u8]) -> String {
    hex::encode(&blake3::hash(public).as_bytes()[..8])
}
