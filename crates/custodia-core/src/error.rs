use thiserror::Error;

/// Unified error type for the vault, cache, cryptor, and dispatcher.
///
/// The `Display` string of each variant is the stable `Status` string
/// returned to clients. Variants never carry password or key material.
#[derive(Debug, Error)]
pub enum CustodiaError {
    // ── Vault lifecycle ──────────────────────────────────────────────────────
    #[error("Vault is not created yet")]
    VaultNotInitialized,

    #[error("Vault is already created")]
    VaultAlreadyInitialized,

    // ── User records ─────────────────────────────────────────────────────────
    #[error("User {0} does not exist")]
    UserNotFound(String),

    #[error("User {0} already exists")]
    UserAlreadyExists(String),

    #[error("User {0} is revoked")]
    UserRevoked(String),

    #[error("Password does not match")]
    BadPassword,

    // ── Authorization ────────────────────────────────────────────────────────
    #[error("Admin status required")]
    NotAdmin,

    #[error("Cannot modify own record")]
    CannotModifySelf,

    // ── Requests ─────────────────────────────────────────────────────────────
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // ── Decryption ───────────────────────────────────────────────────────────
    #[error("Not enough delegations to decrypt")]
    InsufficientDelegations,

    #[error("Cryptographic failure: {0}")]
    Crypto(String),

    // ── Persistence ──────────────────────────────────────────────────────────
    #[error("Vault persistence failure: {0}")]
    Persistence(String),

    // ── General ──────────────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CustodiaError {
    /// True for conditions caused by the caller rather than the server.
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            CustodiaError::Persistence(_) | CustodiaError::Internal(_)
        )
    }
}
