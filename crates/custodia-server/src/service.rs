//! The command dispatcher.
//!
//! Owns the vault and the cache (the explicit context object; no process
//! globals) and routes parsed commands through the precondition table before
//! any command-specific logic runs. Every outcome, success or failure, is a
//! [`Response`] whose `Status` string is the client-facing contract.

use tracing::{info, warn};

use custodia_cache::KeyCache;
use custodia_core::{validate_name, validate_password, CustodiaError, RecordType};
use custodia_cryptor::Cryptor;
use custodia_vault::Vault;

use crate::request::{
    Command, Credentials, DecryptedPayload, DelegateRequest, EncryptRequest, ModifyCommand,
    ModifyRequest, Response,
};

pub struct Service {
    vault: Vault,
    cache: KeyCache,
    two_person: bool,
}

impl Service {
    pub fn new(vault: Vault, two_person: bool) -> Self {
        Service {
            vault,
            cache: KeyCache::new(),
            two_person,
        }
    }

    /// Handle one parsed command. Never panics; every error becomes a
    /// `Status` string.
    pub fn handle(&self, command: Command) -> Response {
        let caller = command.credentials().name.clone();
        match self.dispatch(command) {
            Ok(response) => response,
            Err(err) => {
                if err.is_client_error() {
                    info!(%caller, %err, "request rejected");
                } else {
                    warn!(%caller, %err, "request failed");
                }
                Response::error(&err)
            }
        }
    }

    fn dispatch(&self, command: Command) -> Result<Response, CustodiaError> {
        let creds = command.credentials();
        validate_name(&creds.name)?;
        validate_password(&creds.password)?;

        // Vault lifecycle preconditions: `create` requires an empty vault,
        // everything else a non-empty one.
        match &command {
            Command::Create(_) => {
                if self.vault.num_records() > 0 {
                    return Err(CustodiaError::VaultAlreadyInitialized);
                }
            }
            _ => {
                if self.vault.num_records() == 0 {
                    return Err(CustodiaError::VaultNotInitialized);
                }
            }
        }

        match command {
            Command::Create(req) => self.create(&req.creds),
            Command::Summary(req) => self.summary(&req.creds),
            Command::Delegate(req) => self.delegate(req),
            Command::Password(req) => {
                self.vault
                    .change_password(&req.creds.name, &req.creds.password, &req.new_password)?;
                Ok(Response::ok())
            }
            Command::Encrypt(req) => self.encrypt(req),
            Command::Decrypt(req) => {
                self.authenticate(&req.creds)?;
                let result = Cryptor::new(&self.vault, &self.cache)
                    .decrypt(&req.data, &req.creds.name)?;
                let payload = DecryptedPayload {
                    data: result.data.to_vec(),
                    secure: result.secure,
                    delegates: result.delegates,
                };
                let bytes = serde_json::to_vec(&payload)
                    .map_err(|e| CustodiaError::Internal(format!("encoding payload: {e}")))?;
                Ok(Response::with_payload(&bytes))
            }
            Command::Modify(req) => self.modify(req),
            Command::Flush(req) => {
                let caller = self.authenticate(&req.creds)?;
                if !caller.admin {
                    return Err(CustodiaError::NotAdmin);
                }
                self.cache.flush();
                Ok(Response::ok())
            }
        }
    }

    /// Look up the caller and verify their password.
    fn authenticate(
        &self,
        creds: &Credentials,
    ) -> Result<custodia_vault::Record, CustodiaError> {
        let record = self
            .vault
            .get_record(&creds.name)
            .ok_or_else(|| CustodiaError::UserNotFound(creds.name.clone()))?;
        record.verify_password(&creds.password)?;
        Ok(record)
    }

    /// Bootstrap the vault. The first record is forced admin.
    fn create(&self, creds: &Credentials) -> Result<Response, CustodiaError> {
        self.vault
            .add_new_record(&creds.name, &creds.password, true, RecordType::Ec)?;
        Ok(Response::ok())
    }

    /// Sweep expired delegations, then report both halves of the state.
    fn summary(&self, creds: &Credentials) -> Result<Response, CustodiaError> {
        self.authenticate(creds)?;
        self.cache.refresh();
        Ok(Response::with_summary(
            self.cache.get_summary(),
            self.vault.get_summary(),
        ))
    }

    /// Install a delegation, creating the user record on first contact.
    fn delegate(&self, req: DelegateRequest) -> Result<Response, CustodiaError> {
        // Check the bounds before auto-creating a record for a first-time
        // user, so a garbage request leaves no trace in the vault.
        custodia_core::parse_duration(&req.time)?;
        if req.uses == 0 {
            return Err(CustodiaError::InvalidRequest(
                "delegation must allow at least one use".into(),
            ));
        }
        let record = match self.vault.get_record(&req.creds.name) {
            Some(record) => record,
            None => {
                self.vault
                    .add_new_record(&req.creds.name, &req.creds.password, false, RecordType::Ec)?
            }
        };
        self.cache.add_key_from_record(
            &record,
            &req.creds.name,
            &req.creds.password,
            req.users,
            req.labels,
            req.uses,
            &req.time,
        )?;
        Ok(Response::ok())
    }

    fn encrypt(&self, req: EncryptRequest) -> Result<Response, CustodiaError> {
        self.authenticate(&req.creds)?;
        let envelope = Cryptor::new(&self.vault, &self.cache)
            .with_two_person_rule(self.two_person)
            .encrypt(&req.data, &req.labels, &req.owners, req.minimum)?;
        Ok(Response::with_payload(&envelope))
    }

    /// Administrative record mutation. Requires an admin caller and refuses
    /// self-modification.
    fn modify(&self, req: ModifyRequest) -> Result<Response, CustodiaError> {
        let caller = self.authenticate(&req.creds)?;
        if !caller.admin {
            return Err(CustodiaError::NotAdmin);
        }
        if req.creds.name == req.to_modify {
            return Err(CustodiaError::CannotModifySelf);
        }
        match req.command {
            ModifyCommand::Delete => self.vault.delete_record(&req.to_modify)?,
            ModifyCommand::Revoke => self.vault.revoke_record(&req.to_modify)?,
            ModifyCommand::Admin => self.vault.make_admin(&req.to_modify)?,
        }
        Ok(Response::ok())
    }
}
