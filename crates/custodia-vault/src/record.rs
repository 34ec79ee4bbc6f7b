use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use custodia_core::constants::SALT_LEN;
use custodia_core::encoding::b64;
use custodia_core::{CustodiaError, PublicSummary, RecordType};
use custodia_crypto::{aead, fingerprint, kdf, keypair::EcKeyPair};

/// A record's private half, sealed under the password-derived wrap key.
/// The AEAD associated data is the record name, so a sealed half cannot be
/// spliced into another record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedPrivateKey {
    #[serde(rename = "Nonce", with = "b64")]
    pub nonce: Vec<u8>,
    #[serde(rename = "Data", with = "b64")]
    pub ciphertext: Vec<u8>,
}

/// One user's persistent identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Type")]
    pub record_type: RecordType,
    #[serde(rename = "Admin")]
    pub admin: bool,
    #[serde(rename = "Revoked")]
    pub revoked: bool,
    #[serde(rename = "Salt", with = "b64")]
    pub salt: Vec<u8>,
    #[serde(rename = "Verifier", with = "b64")]
    pub verifier: Vec<u8>,
    #[serde(rename = "PublicKey", with = "b64")]
    pub public_key: Vec<u8>,
    #[serde(rename = "PrivateKey")]
    pub private_key: SealedPrivateKey,
}

impl Record {
    /// Create a record with a fresh key pair, deriving the verifier and the
    /// private-half wrap key from `password`.
    pub fn create(
        name: &str,
        password: &str,
        admin: bool,
        record_type: RecordType,
    ) -> Result<Self, CustodiaError> {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let keys = kdf::derive_password_keys(password, &salt)?;

        let pair = EcKeyPair::generate();
        let nonce = aead::random_nonce();
        let sealed = aead::seal(
            keys.wrap_key(),
            &nonce,
            name.as_bytes(),
            pair.secret_bytes().as_slice(),
        )?;

        Ok(Record {
            name: name.to_string(),
            record_type,
            admin,
            revoked: false,
            salt: salt.to_vec(),
            verifier: keys.verifier().to_vec(),
            public_key: pair.public_bytes().to_vec(),
            private_key: SealedPrivateKey {
                nonce: nonce.to_vec(),
                ciphertext: sealed,
            },
        })
    }

    /// Check `password` against the stored verifier.
    pub fn verify_password(&self, password: &str) -> Result<kdf::PasswordKeys, CustodiaError> {
        let salt: [u8; SALT_LEN] =
            self.salt.as_slice().try_into().map_err(|_| {
                CustodiaError::Internal("stored salt has wrong length".into())
            })?;
        let keys = kdf::derive_password_keys(password, &salt)?;
        if !keys.matches(&self.verifier) {
            return Err(CustodiaError::BadPassword);
        }
        Ok(keys)
    }

    /// Verify `password` and decrypt the private half.
    pub fn decrypt_private_key(&self, password: &str) -> Result<EcKeyPair, CustodiaError> {
        let keys = self.verify_password(password)?;
        let nonce: [u8; custodia_core::NONCE_LEN] = self
            .private_key
            .nonce
            .as_slice()
            .try_into()
            .map_err(|_| CustodiaError::Internal("stored nonce has wrong length".into()))?;
        let secret = aead::open(
            keys.wrap_key(),
            &nonce,
            self.name.as_bytes(),
            &self.private_key.ciphertext,
        )?;
        Ok(EcKeyPair::from_secret_bytes(&secret)?)
    }

    /// Verify `old`, then re-encrypt the private half and rewrite the
    /// verifier under `new`. The key pair itself is unchanged.
    pub fn set_password(&mut self, old: &str, new: &str) -> Result<(), CustodiaError> {
        let pair = self.decrypt_private_key(old)?;

        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let keys = kdf::derive_password_keys(new, &salt)?;

        let nonce = aead::random_nonce();
        let sealed = aead::seal(
            keys.wrap_key(),
            &nonce,
            self.name.as_bytes(),
            pair.secret_bytes().as_slice(),
        )?;

        self.salt = salt.to_vec();
        self.verifier = keys.verifier().to_vec();
        self.private_key = SealedPrivateKey {
            nonce: nonce.to_vec(),
            ciphertext: sealed,
        };
        Ok(())
    }

    /// The key-free view exposed by summaries.
    pub fn public_summary(&self) -> PublicSummary {
        PublicSummary {
            admin: self.admin,
            record_type: self.record_type,
            revoked: self.revoked,
            fingerprint: fingerprint(&self.public_key),
        }
    }
}
