//! HTTP client for the cacher server.
//!
//! Speaks the request/response surface: `get`, `set`, `delete`, and `keys`,
//! printing the server's JSON reply to stdout.

use std::net::IpAddr;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use reqwest::StatusCode;
use serde_json::{json, Value};

#[derive(Debug, Parser)]
#[command(name = "cacher-cli", version, about = "CLI for the Cacher application.")]
struct Cli {
    /// Server address.
    #[arg(short = 'a', long = "server", default_value = "127.0.0.1")]
    server: IpAddr,

    /// Server port.
    #[arg(short, long, default_value_t = 1323)]
    port: u16,

    /// Bearer authentication token.
    #[arg(short = 't', long = "auth_token", env = "CACHER_AUTH_TOKEN")]
    auth_token: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch the value stored under a key.
    Get { key: String },
    /// Store a JSON value under a key, with an optional ttl in seconds.
    Set {
        key: String,
        /// The value, in JSON form.
        value: String,
        /// Seconds until the pair expires; 0 keeps it forever.
        #[arg(default_value_t = 0)]
        ttl: i64,
    },
    /// Remove a key.
    Delete { key: String },
    /// List every stored key.
    Keys,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(ok) => {
            if ok {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(err) => {
            eprintln!("cacher-cli: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    let base = format!("http://{}:{}", cli.server, cli.port);
    let client = reqwest::Client::new();

    let request = match &cli.command {
        Command::Get { key } => client.get(format!("{base}/{key}")),
        Command::Set { key, value, ttl } => {
            let value: Value = serde_json::from_str(value)
                .map_err(|err| anyhow::anyhow!("value must be valid JSON: {err}"))?;
            client
                .post(&base)
                .json(&json!({"key": key, "value": value, "ttl": ttl}))
        }
        Command::Delete { key } => client.delete(format!("{base}/{key}")),
        Command::Keys => client.get(format!("{base}/keys")),
    };

    let response = request.bearer_auth(&cli.auth_token).send().await?;
    let status = response.status();
    let body = response.text().await?;
    println!("{body}");

    Ok(status == StatusCode::OK)
}
