//! custodia — the administrative CLI client.
//!
//! Thin glue over the server's JSON command interface; holds no key
//! material and performs no cryptography of its own.
//!
//! Usage:
//!   custodia create   --name alice --password pw
//!   custodia summary  --name alice --password pw
//!   custodia delegate --name bob --password pw --uses 2 --time 1h \
//!                     --users alice --labels blue
//!   custodia password --name alice --password old --new-password new
//!   custodia encrypt  --name alice --password pw --minimum 2 \
//!                     --owners alice,bob --in plain.txt --out sealed.bin
//!   custodia decrypt  --name alice --password pw --in sealed.bin --out plain.txt
//!   custodia modify   --name alice --password pw --target bob --action revoke
//!   custodia flush    --name alice --password pw

use std::path::PathBuf;

use anyhow::{bail, Context};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};

// ── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "custodia",
    version,
    about = "Custodia client — delegate keys and move envelopes"
)]
struct Args {
    /// Server endpoint.
    #[arg(long, global = true, default_value = "http://127.0.0.1:8080")]
    server: String,

    /// Acting user name.
    #[arg(long, global = true, default_value = "")]
    name: String,

    /// Acting user password.
    #[arg(long, global = true, default_value = "")]
    password: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the vault's first (admin) record.
    Create,

    /// Print the live delegations and the full record table.
    Summary,

    /// Delegate this user's key for a bounded number of uses and time.
    Delegate {
        /// Number of decryptions this delegation may serve.
        #[arg(long)]
        uses: u32,
        /// Lifetime, e.g. "2h", "30m", "45s".
        #[arg(long)]
        time: String,
        /// Users allowed to request decryptions (empty = anyone).
        #[arg(long, value_delimiter = ',')]
        users: Vec<String>,
        /// Labels this delegation may serve (empty = any).
        #[arg(long, value_delimiter = ',')]
        labels: Vec<String>,
    },

    /// Change this user's password.
    Password {
        #[arg(long)]
        new_password: String,
    },

    /// Encrypt a file to an owner set with a quorum threshold.
    Encrypt {
        /// Quorum: how many owners must cooperate to decrypt.
        #[arg(long)]
        minimum: usize,
        /// Owner names (comma-separated).
        #[arg(long, value_delimiter = ',')]
        owners: Vec<String>,
        /// Labels to stamp on the envelope.
        #[arg(long, value_delimiter = ',')]
        labels: Vec<String>,
        /// Plaintext input file.
        #[arg(long = "in")]
        input: PathBuf,
        /// Envelope output file.
        #[arg(long = "out")]
        output: PathBuf,
    },

    /// Decrypt an envelope file (requires a live quorum of delegations).
    Decrypt {
        /// Envelope input file.
        #[arg(long = "in")]
        input: PathBuf,
        /// Plaintext output file.
        #[arg(long = "out")]
        output: PathBuf,
    },

    /// Administratively delete, revoke, or promote another user.
    Modify {
        /// The record to modify.
        #[arg(long)]
        target: String,
        /// One of: delete, revoke, admin.
        #[arg(long)]
        action: String,
    },

    /// Drop every live delegation on the server.
    Flush,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let client = ApiClient::new(args.server.clone());
    let creds = json!({"Name": args.name, "Password": args.password});

    match args.command {
        Command::Create => {
            client.post_ok("create", creds).await?;
            println!("vault created");
        }
        Command::Summary => {
            let response = client.post_ok("summary", creds).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Delegate {
            uses,
            time,
            users,
            labels,
        } => {
            let body = merged(creds, json!({
                "Uses": uses, "Time": &time, "Users": users, "Labels": labels,
            }));
            client.post_ok("delegate", body).await?;
            println!("delegation installed: {uses} uses over {time}");
        }
        Command::Password { new_password } => {
            let body = merged(creds, json!({"NewPassword": new_password}));
            client.post_ok("password", body).await?;
            println!("password changed");
        }
        Command::Encrypt {
            minimum,
            owners,
            labels,
            input,
            output,
        } => {
            let plaintext = std::fs::read(&input)
                .with_context(|| format!("reading {}", input.display()))?;
            let body = merged(creds, json!({
                "Minimum": minimum, "Owners": &owners, "Labels": labels,
                "Data": STANDARD.encode(&plaintext),
            }));
            let response = client.post_ok("encrypt", body).await?;
            let envelope = decode_payload(&response)?;
            std::fs::write(&output, &envelope)
                .with_context(|| format!("writing {}", output.display()))?;
            println!(
                "sealed {} bytes to {} (quorum {minimum} of {})",
                plaintext.len(),
                output.display(),
                owners.len()
            );
        }
        Command::Decrypt { input, output } => {
            let envelope = std::fs::read(&input)
                .with_context(|| format!("reading {}", input.display()))?;
            let body = merged(creds, json!({"Data": STANDARD.encode(&envelope)}));
            let response = client.post_ok("decrypt", body).await?;
            let payload: Value = serde_json::from_slice(&decode_payload(&response)?)?;

            let data = payload["Data"]
                .as_str()
                .context("decrypt response missing Data")?;
            std::fs::write(&output, STANDARD.decode(data)?)
                .with_context(|| format!("writing {}", output.display()))?;
            println!(
                "decrypted to {} (delegates: {}, secure: {})",
                output.display(),
                payload["Delegates"],
                payload["Secure"]
            );
        }
        Command::Modify { target, action } => {
            let body = merged(creds, json!({"ToModify": &target, "Command": &action}));
            client.post_ok("modify", body).await?;
            println!("{action} applied to {target}");
        }
        Command::Flush => {
            client.post_ok("flush", creds).await?;
            println!("delegation cache flushed");
        }
    }
    Ok(())
}

fn merged(mut base: Value, extra: Value) -> Value {
    if let (Value::Object(base), Value::Object(extra)) = (&mut base, extra) {
        base.extend(extra);
    }
    base
}

/// Decode the base64 `Response` field of a successful reply.
fn decode_payload(response: &Value) -> anyhow::Result<Vec<u8>> {
    let encoded = response["Response"]
        .as_str()
        .context("reply is missing its Response payload")?;
    Ok(STANDARD.decode(encoded)?)
}

// ── HTTP plumbing ────────────────────────────────────────────────────────────

struct ApiClient {
    base: String,
    http: reqwest::Client,
}

impl ApiClient {
    fn new(base: String) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// POST a command body and fail unless `Status == "ok"`.
    async fn post_ok(&self, path: &str, body: Value) -> anyhow::Result<Value> {
        let url = format!("{}/{path}", self.base);
        let reply: Value = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("POST {url}"))?
            .json()
            .await
            .context("parsing server reply")?;

        match reply["Status"].as_str() {
            Some("ok") => Ok(reply),
            Some(status) => bail!("server refused {path}: {status}"),
            None => bail!("malformed reply from {url}"),
        }
    }
}
