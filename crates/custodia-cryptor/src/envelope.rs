//! The self-describing ciphertext envelope.
//!
//! An envelope is a versioned JSON document. The version pins the key-split
//! construction:
//!   * version 1 — per-subset XOR sharing: every quorum-sized subset of the
//!     owners gets its own n-of-n XOR sharing of the data key.
//!   * version 2 — GF(256) Shamir: one threshold share per owner.
//!
//! The header (version, algorithm, labels, owners, minimum) is bound into
//! the payload AEAD as associated data, so tampering with any of it makes
//! decryption fail.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use custodia_core::constants::{
    ENVELOPE_ALGORITHM, ENVELOPE_VERSION_SUBSET, ENVELOPE_VERSION_THRESHOLD,
};
use custodia_core::encoding::b64;
use custodia_core::CustodiaError;
use custodia_crypto::WrappedKey;

/// XOR sharing for one enumerated owner subset. Decryption requires every
/// member's share.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubsetShares {
    #[serde(rename = "Members")]
    pub members: Vec<String>,
    #[serde(rename = "Shares")]
    pub shares: BTreeMap<String, WrappedKey>,
}

/// One owner's Shamir share, wrapped to their public key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnerShare {
    #[serde(rename = "Owner")]
    pub owner: String,
    /// Shamir evaluation point for this owner.
    #[serde(rename = "Index")]
    pub index: u8,
    #[serde(rename = "Share")]
    pub share: WrappedKey,
}

/// The per-version share layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "Scheme")]
pub enum KeySet {
    #[serde(rename = "SubsetXor")]
    SubsetXor {
        #[serde(rename = "Subsets")]
        subsets: Vec<SubsetShares>,
    },
    #[serde(rename = "Threshold")]
    Threshold {
        #[serde(rename = "Shares")]
        shares: Vec<OwnerShare>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "Version")]
    pub version: u32,
    #[serde(rename = "Algorithm")]
    pub algorithm: String,
    #[serde(rename = "Nonce", with = "b64")]
    pub nonce: Vec<u8>,
    /// Payload ciphertext with the AEAD tag in its final 16 bytes.
    #[serde(rename = "Data", with = "b64")]
    pub data: Vec<u8>,
    #[serde(rename = "Labels")]
    pub labels: Vec<String>,
    /// Owner names in canonical (sorted) order.
    #[serde(rename = "Owners")]
    pub owners: Vec<String>,
    #[serde(rename = "Minimum")]
    pub minimum: usize,
    #[serde(rename = "KeySet")]
    pub key_set: KeySet,
}

impl Envelope {
    /// Serialize to the wire form.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CustodiaError> {
        serde_json::to_vec(self)
            .map_err(|e| CustodiaError::Internal(format!("serializing envelope: {e}")))
    }

    /// Parse and structurally validate the wire form.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CustodiaError> {
        let envelope: Envelope = serde_json::from_slice(bytes)
            .map_err(|_| CustodiaError::Crypto("malformed envelope".into()))?;
        envelope.validate()?;
        Ok(envelope)
    }

    fn validate(&self) -> Result<(), CustodiaError> {
        match (self.version, &self.key_set) {
            (v, KeySet::SubsetXor { .. }) if v == ENVELOPE_VERSION_SUBSET => {}
            (v, KeySet::Threshold { .. }) if v == ENVELOPE_VERSION_THRESHOLD => {}
            (v, _) if v == ENVELOPE_VERSION_SUBSET || v == ENVELOPE_VERSION_THRESHOLD => {
                return Err(CustodiaError::Crypto(
                    "envelope version does not match its key set".into(),
                ));
            }
            (v, _) => {
                return Err(CustodiaError::Crypto(format!(
                    "unknown envelope version {v}"
                )));
            }
        }
        if self.algorithm != ENVELOPE_ALGORITHM {
            return Err(CustodiaError::Crypto(format!(
                "unknown envelope algorithm {:?}",
                self.algorithm
            )));
        }
        if self.minimum == 0 || self.minimum > self.owners.len() {
            return Err(CustodiaError::Crypto(
                "envelope minimum out of range".into(),
            ));
        }
        Ok(())
    }

    /// Associated data binding the header to the payload.
    pub fn aad(&self) -> Vec<u8> {
        serde_json::to_vec(&(
            self.version,
            &self.algorithm,
            &self.labels,
            &self.owners,
            self.minimum,
        ))
        .expect("header serialization is infallible")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_envelope(version: u32, key_set: KeySet) -> Envelope {
        Envelope {
            version,
            algorithm: ENVELOPE_ALGORITHM.to_string(),
            nonce: vec![0; 12],
            data: vec![1, 2, 3],
            labels: vec!["blue".into()],
            owners: vec!["alice".into(), "bob".into()],
            minimum: 2,
            key_set,
        }
    }

    fn empty_subset_set() -> KeySet {
        KeySet::SubsetXor {
            subsets: vec![],
        }
    }

    #[test]
    fn round_trip() {
        let envelope = minimal_envelope(ENVELOPE_VERSION_SUBSET, empty_subset_set());
        let bytes = envelope.to_bytes().unwrap();
        let parsed = Envelope::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.owners, envelope.owners);
        assert_eq!(parsed.minimum, 2);
    }

    #[test]
    fn rejects_unknown_version() {
        let envelope = minimal_envelope(99, empty_subset_set());
        let bytes = serde_json::to_vec(&envelope).unwrap();
        assert!(Envelope::from_bytes(&bytes).is_err());
    }

    #[test]
    fn rejects_version_scheme_mismatch() {
        let envelope = minimal_envelope(
            ENVELOPE_VERSION_THRESHOLD,
            empty_subset_set(),
        );
        let bytes = serde_json::to_vec(&envelope).unwrap();
        assert!(Envelope::from_bytes(&bytes).is_err());
    }

    #[test]
    fn rejects_garbage() {
        assert!(Envelope::from_bytes(b"not an envelope").is_err());
    }

    #[test]
    fn aad_changes_with_header() {
        let a = minimal_envelope(ENVELOPE_VERSION_SUBSET, empty_subset_set());
        let mut b = a.clone();
        b.labels = vec!["red".into()];
        assert_ne!(a.aad(), b.aad());
    }
}
