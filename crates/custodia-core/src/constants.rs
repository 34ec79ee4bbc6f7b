//! ─── Custodia Protocol Constants ────────────────────────────────────────────
//!
//! Two-person-rule data custody: no single operator can recover a ciphertext.

// ── Password key derivation (Argon2id) ───────────────────────────────────────

/// Argon2id memory cost in KiB (19 MiB, RFC 9106 low-memory profile).
pub const KDF_M_COST_KIB: u32 = 19_456;

/// Argon2id iteration count.
pub const KDF_T_COST: u32 = 2;

/// Argon2id lane count.
pub const KDF_P_COST: u32 = 1;

/// Per-record KDF salt length in bytes.
pub const SALT_LEN: usize = 16;

/// Symmetric key length in bytes (ChaCha20-Poly1305).
pub const KEY_LEN: usize = 32;

/// AEAD nonce length in bytes (ChaCha20-Poly1305).
pub const NONCE_LEN: usize = 12;

// ── Delegations ──────────────────────────────────────────────────────────────

/// Ceiling on a single delegation's lifetime: 7 days.
pub const MAX_DELEGATION_SECS: u64 = 7 * 24 * 3600;

/// Ceiling on a single delegation's use count.
pub const MAX_DELEGATION_USES: u32 = 10_000;

// ── Envelope format ──────────────────────────────────────────────────────────

/// Envelope version 1: per-subset XOR sharing, one wrapped share per
/// (subset, member) pair. Decryption requires the full membership of one
/// enumerated subset.
pub const ENVELOPE_VERSION_SUBSET: u32 = 1;

/// Envelope version 2: GF(256) Shamir threshold sharing, one wrapped share
/// per owner. Any `minimum` shares reconstruct the data key.
pub const ENVELOPE_VERSION_THRESHOLD: u32 = 2;

/// Above this many enumerated subsets, encryption switches from version 1
/// to version 2 to keep envelopes bounded.
pub const SUBSET_SHARE_BOUND: usize = 1024;

/// Symmetric algorithm identifier recorded in every envelope.
pub const ENVELOPE_ALGORITHM: &str = "chacha20poly1305";

// ── Vault persistence ────────────────────────────────────────────────────────

/// On-disk vault file format version.
pub const VAULT_FORMAT_VERSION: u32 = 1;

// ── Front-end limits ─────────────────────────────────────────────────────────

/// Maximum accepted HTTP request body, in bytes (10 MiB).
pub const MAX_REQUEST_BYTES: usize = 10 * 1024 * 1024;
