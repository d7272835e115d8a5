//! Line-oriented shell surface.
//!
//! A plain TCP listener speaking newline-delimited commands:
//!
//! ```text
//! get <key>
//! set <key> <json_value> [<ttl>]
//! delete <key>
//! ```
//!
//! Every command gets exactly one JSON line back, in the same envelope the
//! HTTP surface uses.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_util::codec::{Framed, LinesCodec};
use tracing::{debug, info};

use crate::manager::CacheManager;
use crate::network::Envelope;

const WELCOME: &str = r"
  /$$$$$$                      /$$
 /$$__  $$                    | $$
| $$  \__/  /$$$$$$   /$$$$$$$| $$$$$$$   /$$$$$$   /$$$$$$
| $$       |____  $$ /$$_____/| $$__  $$ /$$__  $$ /$$__  $$
| $$        /$$$$$$$| $$      | $$  \ $$| $$$$$$$$| $$  \__/
| $$    $$ /$$__  $$| $$      | $$  | $$| $$_____/| $$
|  $$$$$$/|  $$$$$$$|  $$$$$$$| $$  | $$|  $$$$$$$| $$
 \______/  \_______/ \_______/|__/  |__/ \_______/|__/
";

const MAX_LINE_BYTES: usize = 64 * 1024;

/// Binds `addr` and serves shell clients until the shutdown signal fires.
///
/// # Errors
///
/// Fails if the address cannot be bound or an accept fails.
pub async fn serve(
    addr: &str,
    manager: Arc<CacheManager>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("shell surface listening on {}", listener.local_addr()?);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => {
                let (stream, peer) = accepted?;
                debug!(%peer, "shell client connected");
                tokio::spawn(handle_client(stream, Arc::clone(&manager)));
            }
        }
    }
    Ok(())
}

async fn handle_client(stream: TcpStream, manager: Arc<CacheManager>) {
    let mut framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_LINE_BYTES));
    if framed.send(WELCOME.to_string()).await.is_err() {
        return;
    }

    while let Some(next) = framed.next().await {
        let Ok(line) = next else { break };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if matches!(trimmed, "quit" | "exit") {
            break;
        }
        let reply = serde_json::to_string(&execute(&manager, trimmed)).unwrap_or_else(|_| {
            r#"{"status":"error","error_message":"reply serialization failed"}"#.to_string()
        });
        if framed.send(reply).await.is_err() {
            break;
        }
    }
}

/// Runs one shell command against the manager.
///
/// A `set` value may contain spaces; when the final token parses as an
/// integer and at least one value token precedes it, that final token is
/// the ttl.
pub(crate) fn execute(manager: &CacheManager, line: &str) -> Envelope {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let Some((&command, args)) = tokens.split_first() else {
        return Envelope::error("Empty command.");
    };

    match command {
        "get" if args.len() == 1 => match manager.get(args[0]) {
            Ok(Some((value, expired_at))) => Envelope::ok_value(value).with_expiry(expired_at),
            Ok(None) => Envelope::error(format!("Key '{}' not found.", args[0])),
            Err(_) => Envelope::error(format!(
                "Error occurred while reading key '{}' from cache.",
                args[0]
            )),
        },
        "get" => Envelope::error("Command 'get' requires one parameter: 'key'."),

        "set" if args.len() >= 2 => {
            let key = args[0];
            let (value_tokens, ttl) = split_value_and_ttl(&args[1..]);
            let raw = value_tokens.join(" ");
            match serde_json::from_str::<Value>(&raw) {
                Ok(value) => match manager.set(key, &value, ttl) {
                    Ok(()) => Envelope::ok(),
                    Err(_) => Envelope::error(format!(
                        "Error occurred while adding new key/value pair: {key} - {raw}"
                    )),
                },
                Err(_) => Envelope::error(format!("Value for key '{key}' must be valid JSON.")),
            }
        }
        "set" => Envelope::error(
            "Command 'set' requires two parameters: 'key' and 'value'. Optional parameter is 'ttl'.",
        ),

        "delete" if args.len() == 1 => match manager.delete(args[0]) {
            Ok(()) => Envelope::ok(),
            Err(_) => Envelope::error(format!("Error occurred while deleting key: {}", args[0])),
        },
        "delete" => Envelope::error("Command 'delete' requires one parameter: 'key'."),

        other => Envelope::error(format!("Unknown command '{other}'.")),
    }
}

fn split_value_and_ttl<'a>(args: &'a [&'a str]) -> (&'a [&'a str], i64) {
    if args.len() >= 2 {
        if let Ok(ttl) = args[args.len() - 1].parse::<i64>() {
            return (&args[..args.len() - 1], ttl);
        }
    }
    (args, 0)
}
