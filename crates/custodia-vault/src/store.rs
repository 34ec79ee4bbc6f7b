use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use custodia_core::constants::VAULT_FORMAT_VERSION;
use custodia_core::{validate_name, validate_password, CustodiaError, PublicSummary, RecordType};

use crate::record::Record;

/// On-disk vault document. Versioned and self-describing JSON.
#[derive(Serialize, Deserialize)]
struct VaultFile {
    #[serde(rename = "Version")]
    version: u32,
    #[serde(rename = "Records")]
    records: BTreeMap<String, Record>,
}

/// The persistent user-record store.
///
/// Reads take the shared lock over a consistent snapshot; mutations take the
/// exclusive lock for the whole mutate-persist step. Every mutation is
/// staged, written to `<path>.tmp`, fsynced, and renamed over the live file
/// before it becomes visible in memory, so a persistence failure leaves both
/// the file and the in-memory table unchanged.
pub struct Vault {
    path: PathBuf,
    records: RwLock<BTreeMap<String, Record>>,
}

impl Vault {
    /// Load the vault file at `path`, or start an empty vault bound to it.
    pub fn init_from<P: AsRef<Path>>(path: P) -> Result<Self, CustodiaError> {
        let path = path.as_ref().to_path_buf();
        let records = if path.exists() {
            let bytes = fs::read(&path)
                .map_err(|e| CustodiaError::Persistence(format!("reading vault file: {e}")))?;
            let file: VaultFile = serde_json::from_slice(&bytes)
                .map_err(|e| CustodiaError::Persistence(format!("parsing vault file: {e}")))?;
            if file.version != VAULT_FORMAT_VERSION {
                return Err(CustodiaError::Persistence(format!(
                    "unsupported vault file version {}",
                    file.version
                )));
            }
            info!(records = file.records.len(), path = %path.display(), "vault loaded");
            file.records
        } else {
            info!(path = %path.display(), "no vault file; starting empty");
            BTreeMap::new()
        };
        Ok(Vault {
            path,
            records: RwLock::new(records),
        })
    }

    pub fn num_records(&self) -> usize {
        self.records.read().expect("vault lock poisoned").len()
    }

    pub fn get_record(&self, name: &str) -> Option<Record> {
        self.records
            .read()
            .expect("vault lock poisoned")
            .get(name)
            .cloned()
    }

    /// Create a record with a fresh key pair. Fails if `name` is taken.
    pub fn add_new_record(
        &self,
        name: &str,
        password: &str,
        admin: bool,
        record_type: RecordType,
    ) -> Result<Record, CustodiaError> {
        validate_name(name)?;
        validate_password(password)?;
        let record = Record::create(name, password, admin, record_type)?;
        self.mutate(|records| {
            if records.contains_key(name) {
                return Err(CustodiaError::UserAlreadyExists(name.to_string()));
            }
            records.insert(name.to_string(), record.clone());
            Ok(())
        })?;
        info!(user = name, admin, "record created");
        Ok(record)
    }

    /// Verify `old` and re-key the record's password material to `new`.
    pub fn change_password(
        &self,
        name: &str,
        old: &str,
        new: &str,
    ) -> Result<(), CustodiaError> {
        validate_password(new)?;
        self.mutate(|records| {
            let record = records
                .get_mut(name)
                .ok_or_else(|| CustodiaError::UserNotFound(name.to_string()))?;
            record.set_password(old, new)
        })?;
        info!(user = name, "password changed");
        Ok(())
    }

    pub fn delete_record(&self, name: &str) -> Result<(), CustodiaError> {
        self.mutate(|records| {
            records
                .remove(name)
                .map(|_| ())
                .ok_or_else(|| CustodiaError::UserNotFound(name.to_string()))
        })?;
        info!(user = name, "record deleted");
        Ok(())
    }

    /// Bar the record from new delegations and new owner sets. Existing
    /// envelopes naming it stay decryptable if other quorum members cover.
    pub fn revoke_record(&self, name: &str) -> Result<(), CustodiaError> {
        self.mutate(|records| {
            let record = records
                .get_mut(name)
                .ok_or_else(|| CustodiaError::UserNotFound(name.to_string()))?;
            record.revoked = true;
            Ok(())
        })?;
        info!(user = name, "record revoked");
        Ok(())
    }

    pub fn make_admin(&self, name: &str) -> Result<(), CustodiaError> {
        self.mutate(|records| {
            let record = records
                .get_mut(name)
                .ok_or_else(|| CustodiaError::UserNotFound(name.to_string()))?;
            record.admin = true;
            Ok(())
        })?;
        info!(user = name, "record promoted to admin");
        Ok(())
    }

    /// Key-free view of every record.
    pub fn get_summary(&self) -> BTreeMap<String, PublicSummary> {
        self.records
            .read()
            .expect("vault lock poisoned")
            .iter()
            .map(|(name, record)| (name.clone(), record.public_summary()))
            .collect()
    }

    /// Stage a mutation, persist it, then commit it to memory.
    fn mutate<F>(&self, f: F) -> Result<(), CustodiaError>
    where
        F: FnOnce(&mut BTreeMap<String, Record>) -> Result<(), CustodiaError>,
    {
        let mut guard = self.records.write().expect("vault lock poisoned");
        let mut staged = guard.clone();
        f(&mut staged)?;
        self.persist(&staged)?;
        *guard = staged;
        Ok(())
    }

    /// Write-to-temp, fsync, rename. The live file is replaced atomically or
    /// not at all.
    fn persist(&self, records: &BTreeMap<String, Record>) -> Result<(), CustodiaError> {
        let file = VaultFile {
            version: VAULT_FORMAT_VERSION,
            records: records.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&file)
            .map_err(|e| CustodiaError::Persistence(format!("serializing vault: {e}")))?;

        let tmp_path = self.path.with_extension("tmp");
        let mut tmp = fs::File::create(&tmp_path)
            .map_err(|e| CustodiaError::Persistence(format!("creating temp file: {e}")))?;
        tmp.write_all(&bytes)
            .and_then(|_| tmp.sync_all())
            .map_err(|e| CustodiaError::Persistence(format!("writing temp file: {e}")))?;
        drop(tmp);
        fs::rename(&tmp_path, &self.path)
            .map_err(|e| CustodiaError::Persistence(format!("replacing vault file: {e}")))?;
        debug!(records = records.len(), "vault persisted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn vault_in(dir: &TempDir) -> Vault {
        Vault::init_from(dir.path().join("vault.json")).unwrap()
    }

    #[test]
    fn starts_empty() {
        let dir = TempDir::new().unwrap();
        let vault = vault_in(&dir);
        assert_eq!(vault.num_records(), 0);
        assert!(vault.get_record("alice").is_none());
    }

    #[test]
    fn add_and_get() {
        let dir = TempDir::new().unwrap();
        let vault = vault_in(&dir);
        vault
            .add_new_record("alice", "pw", true, RecordType::Ec)
            .unwrap();
        assert_eq!(vault.num_records(), 1);
        let record = vault.get_record("alice").unwrap();
        assert!(record.admin);
    }

    #[test]
    fn duplicate_name_rejected() {
        let dir = TempDir::new().unwrap();
        let vault = vault_in(&dir);
        vault
            .add_new_record("alice", "pw", false, RecordType::Ec)
            .unwrap();
        assert!(matches!(
            vault.add_new_record("alice", "pw2", false, RecordType::Ec),
            Err(CustodiaError::UserAlreadyExists(_))
        ));
        assert_eq!(vault.num_records(), 1);
    }

    #[test]
    fn empty_name_or_password_rejected() {
        let dir = TempDir::new().unwrap();
        let vault = vault_in(&dir);
        assert!(vault.add_new_record("", "pw", false, RecordType::Ec).is_err());
        assert!(vault.add_new_record("alice", "", false, RecordType::Ec).is_err());
    }

    #[test]
    fn survives_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vault.json");
        {
            let vault = Vault::init_from(&path).unwrap();
            vault
                .add_new_record("alice", "pw", true, RecordType::Ec)
                .unwrap();
            vault
                .add_new_record("bob", "pw2", false, RecordType::Ec)
                .unwrap();
        }
        let vault = Vault::init_from(&path).unwrap();
        assert_eq!(vault.num_records(), 2);
        let alice = vault.get_record("alice").unwrap();
        assert!(alice.decrypt_private_key("pw").is_ok());
    }

    #[test]
    fn no_temp_file_left_behind() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vault.json");
        let vault = Vault::init_from(&path).unwrap();
        vault
            .add_new_record("alice", "pw", true, RecordType::Ec)
            .unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn change_password_round_trip() {
        let dir = TempDir::new().unwrap();
        let vault = vault_in(&dir);
        vault
            .add_new_record("alice", "old", false, RecordType::Ec)
            .unwrap();
        vault.change_password("alice", "old", "new").unwrap();
        let record = vault.get_record("alice").unwrap();
        assert!(record.decrypt_private_key("new").is_ok());
        assert!(record.decrypt_private_key("old").is_err());
    }

    #[test]
    fn failed_change_password_leaves_record_intact() {
        let dir = TempDir::new().unwrap();
        let vault = vault_in(&dir);
        vault
            .add_new_record("alice", "pw", false, RecordType::Ec)
            .unwrap();
        assert!(matches!(
            vault.change_password("alice", "wrong", "new"),
            Err(CustodiaError::BadPassword)
        ));
        let record = vault.get_record("alice").unwrap();
        assert!(record.decrypt_private_key("pw").is_ok());
    }

    #[test]
    fn revoke_and_promote() {
        let dir = TempDir::new().unwrap();
        let vault = vault_in(&dir);
        vault
            .add_new_record("bob", "pw", false, RecordType::Ec)
            .unwrap();
        vault.revoke_record("bob").unwrap();
        assert!(vault.get_record("bob").unwrap().revoked);
        vault.make_admin("bob").unwrap();
        assert!(vault.get_record("bob").unwrap().admin);
    }

    #[test]
    fn delete_is_terminal() {
        let dir = TempDir::new().unwrap();
        let vault = vault_in(&dir);
        vault
            .add_new_record("bob", "pw", false, RecordType::Ec)
            .unwrap();
        vault.delete_record("bob").unwrap();
        assert!(vault.get_record("bob").is_none());
        assert!(matches!(
            vault.delete_record("bob"),
            Err(CustodiaError::UserNotFound(_))
        ));
    }

    #[test]
    fn summary_lists_all_records() {
        let dir = TempDir::new().unwrap();
        let vault = vault_in(&dir);
        vault
            .add_new_record("alice", "pw", true, RecordType::Ec)
            .unwrap();
        vault
            .add_new_record("bob", "pw2", false, RecordType::Ec)
            .unwrap();
        vault.revoke_record("bob").unwrap();

        let summary = vault.get_summary();
        assert_eq!(summary.len(), 2);
        assert!(summary["alice"].admin);
        assert!(summary["bob"].revoked);
        assert!(!summary["bob"].admin);
    }

    #[test]
    fn unknown_version_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vault.json");
        fs::write(&path, r#"{"Version": 99, "Records": {}}"#).unwrap();
        assert!(matches!(
            Vault::init_from(&path),
            Err(CustodiaError::Persistence(_))
        ));
    }
}
