//! The Key Cache: in-memory active delegations.
//!
//! A delegation is a user's private key, transiently decrypted with their
//! password, scoped by remaining uses, an expiry instant, permitted
//! requesting users, and permitted labels. Entries are intentionally
//! volatile: a restart forgets everything.
//!
//! One mutex protects the whole map. Every check-unwrap-decrement sequence
//! runs under a single hold of it, so a decryption either fully consumes a
//! use or leaves the entry untouched.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;
use std::time::Instant;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tracing::{debug, info};
use zeroize::Zeroizing;

use custodia_core::constants::MAX_DELEGATION_USES;
use custodia_core::{parse_duration, CustodiaError, DelegationSummary};
use custodia_crypto::keypair::EcKeyPair;
use custodia_crypto::{unwrap_with_secret, WrappedKey};
use custodia_vault::Record;

/// One active delegation.
///
/// Expiry is tracked twice: a monotonic deadline drives the comparisons, and
/// the wall-clock instant is what summaries display.
struct Delegation {
    keypair: EcKeyPair,
    uses_remaining: u32,
    expires_at: DateTime<Utc>,
    deadline: Instant,
    /// Users allowed to request decryptions drawing on this entry.
    /// Empty means unrestricted.
    users: BTreeSet<String>,
    /// Envelope labels this entry may serve. Empty means any.
    labels: BTreeSet<String>,
}

impl Delegation {
    fn usable(&self, now: Instant) -> bool {
        self.uses_remaining > 0 && now < self.deadline
    }

    fn permits(&self, requester: &str, envelope_labels: &[String]) -> bool {
        if !self.users.is_empty() && !self.users.contains(requester) {
            return false;
        }
        if !self.labels.is_empty()
            && !envelope_labels.iter().any(|l| self.labels.contains(l))
        {
            return false;
        }
        true
    }
}

/// A share unwrapped by [`KeyCache::decrypt_key_set`].
pub struct UnwrappedShare {
    pub owner: String,
    pub share: Zeroizing<Vec<u8>>,
    /// True when the delegation named specific requesting users rather than
    /// being a blanket grant. Feeds the envelope's secure flag.
    pub scoped: bool,
}

/// The shared delegation map.
#[derive(Default)]
pub struct KeyCache {
    entries: Mutex<HashMap<String, Delegation>>,
}

impl KeyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Purge entries that have expired or run out of uses.
    pub fn refresh(&self) {
        let now = Instant::now();
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        let before = entries.len();
        entries.retain(|_, d| d.usable(now));
        let purged = before - entries.len();
        if purged > 0 {
            debug!(purged, "expired delegations swept");
        }
    }

    /// Drop every delegation immediately.
    pub fn flush(&self) {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        let dropped = entries.len();
        entries.clear();
        info!(dropped, "delegation cache flushed");
    }

    /// Number of currently usable delegations.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .expect("cache lock poisoned")
            .values()
            .filter(|d| d.usable(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decrypt `record`'s private key with `password` and install a
    /// delegation for `name`. An existing delegation under the same name is
    /// replaced outright: re-delegation is re-authorization.
    #[allow(clippy::too_many_arguments)]
    pub fn add_key_from_record(
        &self,
        record: &Record,
        name: &str,
        password: &str,
        users: Vec<String>,
        labels: Vec<String>,
        uses: u32,
        time_spec: &str,
    ) -> Result<(), CustodiaError> {
        if record.revoked {
            return Err(CustodiaError::UserRevoked(record.name.clone()));
        }
        if uses == 0 {
            return Err(CustodiaError::InvalidRequest(
                "delegation must allow at least one use".into(),
            ));
        }
        if uses > MAX_DELEGATION_USES {
            return Err(CustodiaError::InvalidRequest(format!(
                "delegation uses exceed ceiling of {MAX_DELEGATION_USES}"
            )));
        }
        let lifetime = parse_duration(time_spec)?;
        let keypair = record.decrypt_private_key(password)?;

        let delegation = Delegation {
            keypair,
            uses_remaining: uses,
            expires_at: Utc::now()
                + ChronoDuration::from_std(lifetime).map_err(|_| {
                    CustodiaError::InvalidRequest("duration out of range".into())
                })?,
            deadline: Instant::now() + lifetime,
            users: users.into_iter().collect(),
            labels: labels.into_iter().collect(),
        };

        let mut entries = self.entries.lock().expect("cache lock poisoned");
        let replaced = entries.insert(name.to_string(), delegation).is_some();
        info!(user = name, uses, time = time_spec, replaced, "delegation added");
        Ok(())
    }

    /// Key-free view of the currently usable delegations.
    pub fn get_summary(&self) -> BTreeMap<String, DelegationSummary> {
        let now = Instant::now();
        self.entries
            .lock()
            .expect("cache lock poisoned")
            .iter()
            .filter(|(_, d)| d.usable(now))
            .map(|(name, d)| {
                (
                    name.clone(),
                    DelegationSummary {
                        uses: d.uses_remaining,
                        expires: d.expires_at,
                        users: d.users.clone(),
                        labels: d.labels.clone(),
                    },
                )
            })
            .collect()
    }

    /// Unwrap `wrapped` with `owner`'s delegated private key, consuming one
    /// use. Returns `None` when the entry is absent, expired, exhausted, or
    /// the policy rejects the requester or labels; the use count is only
    /// decremented on success.
    pub fn decrypt_key(
        &self,
        owner: &str,
        wrapped: &WrappedKey,
        requesting_user: &str,
        envelope_labels: &[String],
    ) -> Option<Zeroizing<Vec<u8>>> {
        let now = Instant::now();
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        let delegation = entries.get_mut(owner)?;
        if !delegation.usable(now) || !delegation.permits(requesting_user, envelope_labels) {
            return None;
        }
        let share = unwrap_with_secret(&delegation.keypair, wrapped).ok()?;
        delegation.uses_remaining -= 1;
        if delegation.uses_remaining == 0 {
            entries.remove(owner);
        }
        Some(share)
    }

    /// Bulk form of [`decrypt_key`] used by the cryptor: attempt to unwrap
    /// one share per `(owner, wrapped)` request, stopping once `minimum`
    /// have succeeded. Uses are decremented only when the threshold is met,
    /// and only for the owners whose shares were taken; an aborted gather
    /// consumes nothing.
    pub fn decrypt_key_set(
        &self,
        requests: &[(String, WrappedKey)],
        requesting_user: &str,
        envelope_labels: &[String],
        minimum: usize,
    ) -> Option<Vec<UnwrappedShare>> {
        if minimum == 0 || requests.len() < minimum {
            return None;
        }
        let now = Instant::now();
        let mut entries = self.entries.lock().expect("cache lock poisoned");

        let mut unwrapped: Vec<UnwrappedShare> = Vec::with_capacity(minimum);
        for (owner, wrapped) in requests {
            if unwrapped.len() == minimum {
                break;
            }
            // Quorums count distinct owners; ignore repeated names.
            if unwrapped.iter().any(|u| &u.owner == owner) {
                continue;
            }
            let Some(delegation) = entries.get(owner) else {
                continue;
            };
            if !delegation.usable(now) || !delegation.permits(requesting_user, envelope_labels) {
                continue;
            }
            if let Ok(share) = unwrap_with_secret(&delegation.keypair, wrapped) {
                unwrapped.push(UnwrappedShare {
                    owner: owner.clone(),
                    share,
                    scoped: !delegation.users.is_empty(),
                });
            }
        }

        if unwrapped.len() < minimum {
            return None;
        }

        for contributor in &unwrapped {
            let exhausted = {
                let delegation = entries
                    .get_mut(&contributor.owner)
                    .expect("contributor entry vanished under lock");
                delegation.uses_remaining -= 1;
                delegation.uses_remaining == 0
            };
            if exhausted {
                entries.remove(&contributor.owner);
            }
        }
        Some(unwrapped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custodia_core::RecordType;
    use custodia_crypto::wrap_to_public;

    fn record(name: &str) -> Record {
        Record::create(name, "pw", false, RecordType::Ec).unwrap()
    }

    fn wrap_for(record: &Record, payload: &[u8]) -> WrappedKey {
        let public: [u8; 32] = record.public_key.as_slice().try_into().unwrap();
        wrap_to_public(&public, payload).unwrap()
    }

    fn delegate(cache: &KeyCache, record: &Record, uses: u32, time: &str) {
        cache
            .add_key_from_record(record, &record.name, "pw", vec![], vec![], uses, time)
            .unwrap();
    }

    #[test]
    fn add_and_summarize() {
        let cache = KeyCache::new();
        let alice = record("alice");
        cache
            .add_key_from_record(
                &alice,
                "alice",
                "pw",
                vec!["alice".into()],
                vec!["blue".into()],
                2,
                "1h",
            )
            .unwrap();

        let summary = cache.get_summary();
        assert_eq!(summary.len(), 1);
        assert_eq!(summary["alice"].uses, 2);
        assert!(summary["alice"].users.contains("alice"));
        assert!(summary["alice"].labels.contains("blue"));
    }

    #[test]
    fn wrong_password_rejected() {
        let cache = KeyCache::new();
        let alice = record("alice");
        let err = cache.add_key_from_record(&alice, "alice", "bad", vec![], vec![], 1, "1h");
        assert!(matches!(err, Err(CustodiaError::BadPassword)));
        assert!(cache.is_empty());
    }

    #[test]
    fn revoked_record_cannot_delegate() {
        let cache = KeyCache::new();
        let mut bob = record("bob");
        bob.revoked = true;
        let err = cache.add_key_from_record(&bob, "bob", "pw", vec![], vec![], 1, "1h");
        assert!(matches!(err, Err(CustodiaError::UserRevoked(_))));
    }

    #[test]
    fn zero_uses_rejected() {
        let cache = KeyCache::new();
        let alice = record("alice");
        assert!(cache
            .add_key_from_record(&alice, "alice", "pw", vec![], vec![], 0, "1h")
            .is_err());
    }

    #[test]
    fn decrypt_key_consumes_a_use() {
        let cache = KeyCache::new();
        let alice = record("alice");
        delegate(&cache, &alice, 2, "1h");
        let wrapped = wrap_for(&alice, b"share");

        let share = cache.decrypt_key("alice", &wrapped, "alice", &[]).unwrap();
        assert_eq!(share.as_slice(), b"share");
        assert_eq!(cache.get_summary()["alice"].uses, 1);
    }

    #[test]
    fn exhausted_entry_is_purged() {
        let cache = KeyCache::new();
        let alice = record("alice");
        delegate(&cache, &alice, 1, "1h");
        let wrapped = wrap_for(&alice, b"share");

        assert!(cache.decrypt_key("alice", &wrapped, "alice", &[]).is_some());
        assert!(cache.decrypt_key("alice", &wrapped, "alice", &[]).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn expired_entry_is_unusable_and_swept() {
        let cache = KeyCache::new();
        let alice = record("alice");
        delegate(&cache, &alice, 5, "0s");
        let wrapped = wrap_for(&alice, b"share");

        assert!(cache.decrypt_key("alice", &wrapped, "alice", &[]).is_none());
        cache.refresh();
        assert_eq!(cache.get_summary().len(), 0);
    }

    #[test]
    fn requester_gating() {
        let cache = KeyCache::new();
        let alice = record("alice");
        cache
            .add_key_from_record(
                &alice,
                "alice",
                "pw",
                vec!["bob".into()],
                vec![],
                1,
                "1h",
            )
            .unwrap();
        let wrapped = wrap_for(&alice, b"share");

        assert!(cache.decrypt_key("alice", &wrapped, "mallory", &[]).is_none());
        assert!(cache.decrypt_key("alice", &wrapped, "bob", &[]).is_some());
    }

    #[test]
    fn label_gating() {
        let cache = KeyCache::new();
        let alice = record("alice");
        cache
            .add_key_from_record(
                &alice,
                "alice",
                "pw",
                vec![],
                vec!["red".into()],
                1,
                "1h",
            )
            .unwrap();
        let wrapped = wrap_for(&alice, b"share");

        assert!(cache
            .decrypt_key("alice", &wrapped, "alice", &["blue".into()])
            .is_none());
        assert!(cache
            .decrypt_key("alice", &wrapped, "alice", &["blue".into(), "red".into()])
            .is_some());
    }

    #[test]
    fn empty_policy_sets_are_unrestricted() {
        let cache = KeyCache::new();
        let alice = record("alice");
        delegate(&cache, &alice, 1, "1h");
        let wrapped = wrap_for(&alice, b"share");

        assert!(cache
            .decrypt_key("alice", &wrapped, "anyone", &["any-label".into()])
            .is_some());
    }

    #[test]
    fn redelegation_replaces() {
        let cache = KeyCache::new();
        let alice = record("alice");
        cache
            .add_key_from_record(&alice, "alice", "pw", vec!["bob".into()], vec![], 5, "1h")
            .unwrap();
        cache
            .add_key_from_record(&alice, "alice", "pw", vec![], vec!["red".into()], 2, "2h")
            .unwrap();

        let summary = cache.get_summary();
        assert_eq!(summary["alice"].uses, 2);
        assert!(summary["alice"].users.is_empty());
        assert!(summary["alice"].labels.contains("red"));
    }

    #[test]
    fn decrypt_key_set_all_or_nothing() {
        let cache = KeyCache::new();
        let alice = record("alice");
        let bob = record("bob");
        delegate(&cache, &alice, 1, "1h");
        // bob is not delegated.
        let requests = vec![
            ("alice".to_string(), wrap_for(&alice, b"a-share")),
            ("bob".to_string(), wrap_for(&bob, b"b-share")),
        ];

        // Threshold of 2 cannot be met; alice must not be consumed.
        assert!(cache
            .decrypt_key_set(&requests, "alice", &[], 2)
            .is_none());
        assert_eq!(cache.get_summary()["alice"].uses, 1);

        // Threshold of 1 succeeds and consumes only alice.
        let shares = cache.decrypt_key_set(&requests, "alice", &[], 1).unwrap();
        assert_eq!(shares.len(), 1);
        assert_eq!(shares[0].owner, "alice");
        assert_eq!(shares[0].share.as_slice(), b"a-share");
        assert!(cache.is_empty());
    }

    #[test]
    fn decrypt_key_set_reports_scoping() {
        let cache = KeyCache::new();
        let alice = record("alice");
        let bob = record("bob");
        cache
            .add_key_from_record(&alice, "alice", "pw", vec!["alice".into()], vec![], 1, "1h")
            .unwrap();
        cache
            .add_key_from_record(&bob, "bob", "pw", vec![], vec![], 1, "1h")
            .unwrap();

        let requests = vec![
            ("alice".to_string(), wrap_for(&alice, b"a")),
            ("bob".to_string(), wrap_for(&bob, b"b")),
        ];
        let shares = cache.decrypt_key_set(&requests, "alice", &[], 2).unwrap();
        let alice_share = shares.iter().find(|s| s.owner == "alice").unwrap();
        let bob_share = shares.iter().find(|s| s.owner == "bob").unwrap();
        assert!(alice_share.scoped);
        assert!(!bob_share.scoped);
    }

    #[test]
    fn flush_empties_everything() {
        let cache = KeyCache::new();
        let alice = record("alice");
        delegate(&cache, &alice, 5, "1h");
        cache.flush();
        assert!(cache.is_empty());
    }
}
