use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Asymmetric scheme backing a user record's key pair.
///
/// The default scheme is elliptic-curve (x25519 key encapsulation). The tag
/// is persisted with each record so further schemes can coexist in one vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RecordType {
    #[default]
    #[serde(rename = "ECC")]
    Ec,
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordType::Ec => write!(f, "ECC"),
        }
    }
}

// ── Summary views ────────────────────────────────────────────────────────────

/// Per-record view in the `All` half of a summary. Never contains key or
/// password material; the fingerprint commits to the public half only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicSummary {
    #[serde(rename = "Admin")]
    pub admin: bool,
    #[serde(rename = "Type")]
    pub record_type: RecordType,
    #[serde(rename = "Revoked")]
    pub revoked: bool,
    /// Hex-encoded public-key fingerprint (first 8 bytes of BLAKE3).
    #[serde(rename = "Fingerprint")]
    pub fingerprint: String,
}

/// Per-delegation view in the `Live` half of a summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationSummary {
    #[serde(rename = "Uses")]
    pub uses: u32,
    #[serde(rename = "Expires")]
    pub expires: DateTime<Utc>,
    #[serde(rename = "Users")]
    pub users: BTreeSet<String>,
    #[serde(rename = "Labels")]
    pub labels: BTreeSet<String>,
}

// ── Validation helpers ───────────────────────────────────────────────────────

/// Validate a user name: non-empty, case-sensitive, no interior NUL.
pub fn validate_name(name: &str) -> Result<(), crate::CustodiaError> {
    if name.is_empty() {
        return Err(crate::CustodiaError::InvalidRequest(
            "name must not be empty".into(),
        ));
    }
    if name.contains('\0') {
        return Err(crate::CustodiaError::InvalidRequest(
            "name must not contain NUL".into(),
        ));
    }
    Ok(())
}

/// Validate a password: non-empty.
pub fn validate_password(password: &str) -> Result<(), crate::CustodiaError> {
    if password.is_empty() {
        return Err(crate::CustodiaError::InvalidRequest(
            "password must not be empty".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_type_serializes_as_ecc() {
        let json = serde_json::to_string(&RecordType::Ec).unwrap();
        assert_eq!(json, "\"ECC\"");
    }

    #[test]
    fn empty_name_rejected() {
        assert!(validate_name("").is_err());
        assert!(validate_name("alice").is_ok());
    }

    #[test]
    fn empty_password_rejected() {
        assert!(validate_password("").is_err());
        assert!(validate_password("pw").is_ok());
    }
}
