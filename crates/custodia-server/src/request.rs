//! Wire DTOs for the JSON command interface.
//!
//! Field names are a stable contract. Every request carries `Name` and
//! `Password`; the success sentinel is `Status == "ok"`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use custodia_core::encoding::b64;
use custodia_core::{CustodiaError, DelegationSummary, PublicSummary};

// ── Requests ─────────────────────────────────────────────────────────────────

#[derive(Clone, Deserialize, Serialize)]
pub struct Credentials {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Password")]
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Credentials {{ name: {:?} }}", self.name)
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CreateRequest {
    #[serde(flatten)]
    pub creds: Credentials,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SummaryRequest {
    #[serde(flatten)]
    pub creds: Credentials,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DelegateRequest {
    #[serde(flatten)]
    pub creds: Credentials,
    #[serde(rename = "Uses")]
    pub uses: u32,
    #[serde(rename = "Time")]
    pub time: String,
    #[serde(rename = "Users", default)]
    pub users: Vec<String>,
    #[serde(rename = "Labels", default)]
    pub labels: Vec<String>,
}

#[derive(Deserialize, Serialize)]
pub struct PasswordRequest {
    #[serde(flatten)]
    pub creds: Credentials,
    #[serde(rename = "NewPassword")]
    pub new_password: String,
}

impl std::fmt::Debug for PasswordRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PasswordRequest {{ creds: {:?} }}", self.creds)
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct EncryptRequest {
    #[serde(flatten)]
    pub creds: Credentials,
    #[serde(rename = "Minimum")]
    pub minimum: usize,
    #[serde(rename = "Owners")]
    pub owners: Vec<String>,
    #[serde(rename = "Data", with = "b64")]
    pub data: Vec<u8>,
    #[serde(rename = "Labels", default)]
    pub labels: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DecryptRequest {
    #[serde(flatten)]
    pub creds: Credentials,
    #[serde(rename = "Data", with = "b64")]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModifyCommand {
    Delete,
    Revoke,
    Admin,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ModifyRequest {
    #[serde(flatten)]
    pub creds: Credentials,
    #[serde(rename = "ToModify")]
    pub to_modify: String,
    #[serde(rename = "Command")]
    pub command: ModifyCommand,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct FlushRequest {
    #[serde(flatten)]
    pub creds: Credentials,
}

/// A fully parsed command. The JSON boundary parses exactly once; from here
/// on, dispatch is total.
#[derive(Debug)]
pub enum Command {
    Create(CreateRequest),
    Summary(SummaryRequest),
    Delegate(DelegateRequest),
    Password(PasswordRequest),
    Encrypt(EncryptRequest),
    Decrypt(DecryptRequest),
    Modify(ModifyRequest),
    Flush(FlushRequest),
}

impl Command {
    /// The caller's credentials, uniform across commands.
    pub fn credentials(&self) -> &Credentials {
        match self {
            Command::Create(r) => &r.creds,
            Command::Summary(r) => &r.creds,
            Command::Delegate(r) => &r.creds,
            Command::Password(r) => &r.creds,
            Command::Encrypt(r) => &r.creds,
            Command::Decrypt(r) => &r.creds,
            Command::Modify(r) => &r.creds,
            Command::Flush(r) => &r.creds,
        }
    }
}

// ── Responses ────────────────────────────────────────────────────────────────

pub const STATUS_OK: &str = "ok";

#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(rename = "Live", skip_serializing_if = "Option::is_none")]
    pub live: Option<BTreeMap<String, DelegationSummary>>,
    #[serde(rename = "All", skip_serializing_if = "Option::is_none")]
    pub all: Option<BTreeMap<String, PublicSummary>>,
    /// Base64-encoded payload: envelope bytes for `encrypt`, the JSON of
    /// [`DecryptedPayload`] for `decrypt`.
    #[serde(rename = "Response", skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
}

impl Response {
    pub fn ok() -> Self {
        Response {
            status: STATUS_OK.into(),
            live: None,
            all: None,
            response: None,
        }
    }

    pub fn error(err: &CustodiaError) -> Self {
        Response {
            status: err.to_string(),
            live: None,
            all: None,
            response: None,
        }
    }

    pub fn with_payload(bytes: &[u8]) -> Self {
        use base64::engine::general_purpose::STANDARD;
        use base64::Engine;
        Response {
            response: Some(STANDARD.encode(bytes)),
            ..Response::ok()
        }
    }

    pub fn with_summary(
        live: BTreeMap<String, DelegationSummary>,
        all: BTreeMap<String, PublicSummary>,
    ) -> Self {
        Response {
            live: Some(live),
            all: Some(all),
            ..Response::ok()
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }
}

/// The JSON carried inside a successful `decrypt` response.
#[derive(Debug, Serialize, Deserialize)]
pub struct DecryptedPayload {
    #[serde(rename = "Data", with = "b64")]
    pub data: Vec<u8>,
    #[serde(rename = "Secure")]
    pub secure: bool,
    #[serde(rename = "Delegates")]
    pub delegates: Vec<String>,
}
