//! custodiad — the Custodia server binary.
//!
//! Startup sequence:
//!   1. Load (or initialise) the vault file
//!   2. Build the dispatcher context (vault + empty delegation cache)
//!   3. Serve the JSON command interface over HTTP

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use custodia_server::http;
use custodia_server::Service;
use custodia_vault::Vault;

#[derive(Parser, Debug)]
#[command(
    name = "custodiad",
    version,
    about = "Custodia — threshold-custodial encryption under the two-person rule"
)]
struct Args {
    /// Path to the vault file (created on first `create`).
    #[arg(long, default_value = "~/.custodia/vault.json")]
    vault_path: PathBuf,

    /// HTTP listen address.
    #[arg(long, default_value = "127.0.0.1:8080")]
    listen_addr: SocketAddr,

    /// Refuse encryptions with a quorum below two.
    #[arg(long)]
    require_two_person: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,custodia=debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    info!("Custodia server starting");

    let vault_path = expand_tilde(&args.vault_path);
    if let Some(parent) = vault_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating vault dir {}", parent.display()))?;
    }
    let vault = Vault::init_from(&vault_path).context("opening vault")?;

    let service = Arc::new(Service::new(vault, args.require_two_person));
    if args.require_two_person {
        info!("two-person rule enforced: encryptions require a quorum of at least 2");
    }

    http::serve(service, args.listen_addr).await
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &std::path::Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.to_path_buf()
}
