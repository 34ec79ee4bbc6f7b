//! The Cryptor: envelope encryption and policy-gated threshold decryption.
//!
//! Encryption splits a fresh data-encryption key across a chosen owner set
//! with a quorum threshold and wraps each piece to an owner's public key.
//! Decryption consults the delegation cache for unlocked private keys,
//! reassembles the data key once a quorum is satisfied, and reports which
//! delegations were consumed.

pub mod envelope;

use std::collections::BTreeSet;

use tracing::debug;
use zeroize::Zeroizing;

use custodia_cache::KeyCache;
use custodia_core::constants::{
    ENVELOPE_ALGORITHM, ENVELOPE_VERSION_SUBSET, ENVELOPE_VERSION_THRESHOLD, KEY_LEN,
    SUBSET_SHARE_BOUND,
};
use custodia_core::CustodiaError;
use custodia_crypto::{aead, shamir, wrap_to_public, WrappedKey};
use custodia_vault::Vault;

pub use envelope::{Envelope, KeySet, OwnerShare, SubsetShares};

/// Result of a successful decryption.
pub struct Decrypted {
    pub data: Zeroizing<Vec<u8>>,
    /// Owners whose delegations were consumed, sorted.
    pub delegates: Vec<String>,
    /// True iff the quorum was at least two and every consumed delegation
    /// named its permitted requesters explicitly.
    pub secure: bool,
}

/// Stateless engine over the vault (public keys) and the cache (unlocked
/// private keys). Holds at most one of their locks at a time.
pub struct Cryptor<'a> {
    vault: &'a Vault,
    cache: &'a KeyCache,
    /// When set, encryption refuses quorums of one.
    two_person: bool,
}

impl<'a> Cryptor<'a> {
    pub fn new(vault: &'a Vault, cache: &'a KeyCache) -> Self {
        Self {
            vault,
            cache,
            two_person: false,
        }
    }

    /// Enforce a two-person posture: `encrypt` rejects `minimum < 2`.
    pub fn with_two_person_rule(mut self, enabled: bool) -> Self {
        self.two_person = enabled;
        self
    }

    // ── Encryption ───────────────────────────────────────────────────────────

    /// Encrypt `plaintext` so that any `minimum` of `owners` can cooperate
    /// to decrypt it. Returns the envelope bytes.
    pub fn encrypt(
        &self,
        plaintext: &[u8],
        labels: &[String],
        owners: &[String],
        minimum: usize,
    ) -> Result<Vec<u8>, CustodiaError> {
        // Canonical owner list: sorted, and refused on duplicates.
        let distinct: BTreeSet<&String> = owners.iter().collect();
        if distinct.len() != owners.len() {
            return Err(CustodiaError::InvalidRequest(
                "owner list contains duplicates".into(),
            ));
        }
        if owners.is_empty() {
            return Err(CustodiaError::InvalidRequest(
                "owner list must not be empty".into(),
            ));
        }
        if minimum == 0 || minimum > owners.len() {
            return Err(CustodiaError::InvalidRequest(format!(
                "minimum must be between 1 and {}",
                owners.len()
            )));
        }
        if self.two_person && minimum < 2 {
            return Err(CustodiaError::InvalidRequest(
                "two-person rule requires a minimum of at least 2".into(),
            ));
        }

        let owners: Vec<String> = distinct.into_iter().cloned().collect();
        let mut public_keys = Vec::with_capacity(owners.len());
        for owner in &owners {
            let record = self
                .vault
                .get_record(owner)
                .ok_or_else(|| CustodiaError::UserNotFound(owner.clone()))?;
            if record.revoked {
                return Err(CustodiaError::UserRevoked(owner.clone()));
            }
            let public: [u8; KEY_LEN] = record.public_key.as_slice().try_into().map_err(|_| {
                CustodiaError::Internal(format!("record {owner} has malformed public key"))
            })?;
            public_keys.push(public);
        }

        let dek = aead::random_key();
        let nonce = aead::random_nonce();

        let (version, key_set) = if use_subset_scheme(owners.len(), minimum) {
            (
                ENVELOPE_VERSION_SUBSET,
                build_subset_key_set(&owners, &public_keys, &dek, minimum)?,
            )
        } else {
            (
                ENVELOPE_VERSION_THRESHOLD,
                build_threshold_key_set(&owners, &public_keys, &dek, minimum)?,
            )
        };

        let mut envelope = Envelope {
            version,
            algorithm: ENVELOPE_ALGORITHM.to_string(),
            nonce: nonce.to_vec(),
            data: Vec::new(),
            labels: labels.to_vec(),
            owners,
            minimum,
            key_set,
        };
        let aad = envelope.aad();
        envelope.data = aead::seal(&dek, &nonce, &aad, plaintext)?;

        debug!(
            version,
            owners = envelope.owners.len(),
            minimum,
            "payload encrypted"
        );
        envelope.to_bytes()
    }

    // ── Decryption ───────────────────────────────────────────────────────────

    /// Decrypt envelope bytes on behalf of `requesting_user`, drawing on the
    /// delegation cache. Delegation uses are consumed only for owners whose
    /// shares contribute to a met quorum.
    pub fn decrypt(
        &self,
        envelope_bytes: &[u8],
        requesting_user: &str,
    ) -> Result<Decrypted, CustodiaError> {
        let envelope = Envelope::from_bytes(envelope_bytes)?;
        let aad = envelope.aad();

        let (dek, contributors) = match &envelope.key_set {
            KeySet::SubsetXor { subsets } => self.reassemble_from_subsets(&envelope, subsets, requesting_user)?,
            KeySet::Threshold { shares } => self.reassemble_from_threshold(&envelope, shares, requesting_user)?,
        };

        let nonce: [u8; custodia_core::NONCE_LEN] =
            envelope.nonce.as_slice().try_into().map_err(|_| {
                CustodiaError::Crypto("envelope nonce has wrong length".into())
            })?;
        let dek_arr: [u8; KEY_LEN] = dek.as_slice().try_into().map_err(|_| {
            CustodiaError::Crypto("reconstructed key has wrong length".into())
        })?;
        let data = aead::open(&dek_arr, &nonce, &aad, &envelope.data)?;

        let mut delegates: Vec<String> =
            contributors.iter().map(|c| c.owner.clone()).collect();
        delegates.sort();
        let secure =
            envelope.minimum >= 2 && contributors.iter().all(|c| c.scoped);

        debug!(
            requester = requesting_user,
            delegates = delegates.len(),
            secure,
            "payload decrypted"
        );
        Ok(Decrypted {
            data,
            delegates,
            secure,
        })
    }

    /// Version 1: try each enumerated subset, all-or-nothing.
    fn reassemble_from_subsets(
        &self,
        envelope: &Envelope,
        subsets: &[SubsetShares],
        requesting_user: &str,
    ) -> Result<(Zeroizing<Vec<u8>>, Vec<custodia_cache::UnwrappedShare>), CustodiaError> {
        for subset in subsets {
            if subset.members.len() != envelope.minimum
                || subset.shares.len() != subset.members.len()
            {
                return Err(CustodiaError::Crypto("malformed subset share set".into()));
            }
            let requests: Vec<(String, WrappedKey)> = subset
                .members
                .iter()
                .filter_map(|m| subset.shares.get(m).map(|w| (m.clone(), w.clone())))
                .collect();
            if requests.len() != subset.members.len() {
                return Err(CustodiaError::Crypto("subset share missing a member".into()));
            }
            let Some(unwrapped) = self.cache.decrypt_key_set(
                &requests,
                requesting_user,
                &envelope.labels,
                subset.members.len(),
            ) else {
                continue;
            };
            let shares: Vec<&[u8]> = unwrapped.iter().map(|u| u.share.as_slice()).collect();
            let dek = shamir::xor_combine(&shares)?;
            return Ok((dek, unwrapped));
        }
        Err(CustodiaError::InsufficientDelegations)
    }

    /// Version 2: gather any `minimum` Shamir shares and interpolate.
    fn reassemble_from_threshold(
        &self,
        envelope: &Envelope,
        shares: &[OwnerShare],
        requesting_user: &str,
    ) -> Result<(Zeroizing<Vec<u8>>, Vec<custodia_cache::UnwrappedShare>), CustodiaError> {
        let requests: Vec<(String, WrappedKey)> = shares
            .iter()
            .map(|s| (s.owner.clone(), s.share.clone()))
            .collect();
        let unwrapped = self
            .cache
            .decrypt_key_set(&requests, requesting_user, &envelope.labels, envelope.minimum)
            .ok_or(CustodiaError::InsufficientDelegations)?;

        let mut shamir_shares = Vec::with_capacity(unwrapped.len());
        for u in &unwrapped {
            let index = shares
                .iter()
                .find(|s| s.owner == u.owner)
                .map(|s| s.index)
                .ok_or_else(|| CustodiaError::Crypto("contributor not in share set".into()))?;
            shamir_shares.push(shamir::Share {
                x: index,
                data: u.share.clone(),
            });
        }
        let dek = shamir::combine(&shamir_shares)?;
        Ok((dek, unwrapped))
    }
}

// ── Split-scheme selection ───────────────────────────────────────────────────

/// Construction (a) is used when the quorum is the full owner set, or when
/// the subset enumeration stays within [`SUBSET_SHARE_BOUND`].
fn use_subset_scheme(n: usize, m: usize) -> bool {
    m == n || binomial_capped(n, m, SUBSET_SHARE_BOUND + 1) <= SUBSET_SHARE_BOUND
}

/// C(n, k), saturating at `cap`.
fn binomial_capped(n: usize, k: usize, cap: usize) -> usize {
    let k = k.min(n - k);
    let mut result: u128 = 1;
    for i in 1..=k {
        result = result * (n - k + i) as u128 / i as u128;
        if result >= cap as u128 {
            return cap;
        }
    }
    result as usize
}

fn build_subset_key_set(
    owners: &[String],
    public_keys: &[[u8; KEY_LEN]],
    dek: &Zeroizing<[u8; KEY_LEN]>,
    minimum: usize,
) -> Result<KeySet, CustodiaError> {
    let mut subsets = Vec::new();
    for combo in combinations(owners.len(), minimum) {
        let members: Vec<String> = combo.iter().map(|&i| owners[i].clone()).collect();
        let parts = shamir::xor_split(dek.as_slice(), members.len())?;
        let mut shares = std::collections::BTreeMap::new();
        for (slot, &i) in combo.iter().enumerate() {
            let wrapped = wrap_to_public(&public_keys[i], parts[slot].as_slice())?;
            shares.insert(owners[i].clone(), wrapped);
        }
        subsets.push(SubsetShares { members, shares });
    }
    Ok(KeySet::SubsetXor { subsets })
}

fn build_threshold_key_set(
    owners: &[String],
    public_keys: &[[u8; KEY_LEN]],
    dek: &Zeroizing<[u8; KEY_LEN]>,
    minimum: usize,
) -> Result<KeySet, CustodiaError> {
    let parts = shamir::split(dek.as_slice(), owners.len() as u8, minimum as u8)?;
    let mut shares = Vec::with_capacity(owners.len());
    for (i, part) in parts.iter().enumerate() {
        let wrapped = wrap_to_public(&public_keys[i], part.data.as_slice())?;
        shares.push(OwnerShare {
            owner: owners[i].clone(),
            index: part.x,
            share: wrapped,
        });
    }
    Ok(KeySet::Threshold { shares })
}

/// All k-element index subsets of 0..n in lexicographic order.
fn combinations(n: usize, k: usize) -> Vec<Vec<usize>> {
    let mut result = Vec::new();
    let mut combo: Vec<usize> = (0..k).collect();
    loop {
        result.push(combo.clone());
        // Advance the rightmost index that can still move.
        let mut i = k;
        loop {
            if i == 0 {
                return result;
            }
            i -= 1;
            if combo[i] != i + n - k {
                break;
            }
        }
        combo[i] += 1;
        for j in i + 1..k {
            combo[j] = combo[j - 1] + 1;
        }
    }
}
