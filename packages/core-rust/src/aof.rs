//! AOF line grammar: rendering and parsing of append-only log entries.
//!
//! Every mutation is logged as a single line:
//!
//! ```text
//! <yyyy/mm/dd> <HH:MM:SS> set <key> <json_value> <ttl> - <state>
//! <yyyy/mm/dd> <HH:MM:SS> delete <key> - <state>
//! ```
//!
//! The timestamp is local time with an implicit timezone; a replaying reader
//! reinterprets it in its own local zone. Each mutation emits up to two
//! lines, a `pending` one before the in-memory operation and a `completed`
//! or `failed` one after it.

use std::fmt;
use std::str::FromStr;

use chrono::{Local, NaiveDateTime, TimeZone};

/// Local-time timestamp format used at the head of every log line.
pub const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Per-operation progression state recorded after the trailing `-` token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpState {
    /// Logged before the in-memory operation runs.
    Pending,
    /// Logged after the in-memory operation succeeded.
    Completed,
    /// Logged after the in-memory operation failed.
    Failed,
}

impl OpState {
    /// The state token as it appears on the wire.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for OpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OpState {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(ParseError::UnknownState(other.to_string())),
        }
    }
}

/// A replayable mutation carried by a log line.
///
/// The value stays in its JSON text encoding; the replayer hands it to the
/// manager, which decodes it on the way into the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Insert or replace `key` with the encoded value and relative ttl.
    Set {
        key: String,
        value: String,
        ttl: i64,
    },
    /// Remove `key`.
    Delete { key: String },
}

impl Command {
    /// The key this command applies to.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Set { key, .. } | Self::Delete { key } => key,
        }
    }
}

/// A fully parsed log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// The line's timestamp reinterpreted in the local zone, unix seconds.
    pub timestamp: i64,
    /// The mutation the line describes.
    pub command: Command,
    /// The three-state progression token.
    pub state: OpState,
}

/// Errors raised while parsing a log line.
///
/// Replay skips malformed lines instead of halting; the error carries enough
/// context to report what was skipped.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("line has too few tokens for a '{op}' entry")]
    Truncated { op: &'static str },
    #[error("invalid timestamp '{0}'")]
    Timestamp(String),
    #[error("unknown operation '{0}'")]
    UnknownOp(String),
    #[error("invalid ttl '{0}'")]
    Ttl(String),
    #[error("unknown state '{0}'")]
    UnknownState(String),
    #[error("missing '-' separator before the state token")]
    Separator,
}

/// Renders a `set` line for the given wall clock (unix seconds, local zone).
#[must_use]
pub fn render_set(timestamp: i64, key: &str, value: &str, ttl: i64, state: OpState) -> String {
    format!(
        "{} set {key} {value} {ttl} - {state}",
        format_local(timestamp)
    )
}

/// Renders a `delete` line for the given wall clock (unix seconds, local zone).
#[must_use]
pub fn render_delete(timestamp: i64, key: &str, state: OpState) -> String {
    format!("{} delete {key} - {state}", format_local(timestamp))
}

fn format_local(timestamp: i64) -> String {
    Local
        .timestamp_opt(timestamp, 0)
        .single()
        .map_or_else(|| timestamp.to_string(), |dt| dt.format(TIMESTAMP_FORMAT).to_string())
}

/// Parses one log line into an [`Entry`].
///
/// Tokens are split on ASCII whitespace: the first two form the local-time
/// timestamp, the third is the operation, then `key [json ttl]`, a literal
/// `-`, and the state. The JSON value of a `set` may itself contain spaces,
/// so it is taken as everything between the key and the trailing
/// `<ttl> - <state>` tokens.
///
/// # Errors
///
/// Returns a [`ParseError`] describing the first malformed component.
pub fn parse_line(line: &str) -> Result<Entry, ParseError> {
    let tokens: Vec<&str> = line.split_ascii_whitespace().collect();
    if tokens.len() < 3 {
        return Err(ParseError::Truncated { op: "log" });
    }

    let stamp = format!("{} {}", tokens[0], tokens[1]);
    let naive = NaiveDateTime::parse_from_str(&stamp, TIMESTAMP_FORMAT)
        .map_err(|_| ParseError::Timestamp(stamp.clone()))?;
    let timestamp = naive
        .and_local_timezone(Local)
        .earliest()
        .ok_or(ParseError::Timestamp(stamp))?
        .timestamp();

    let (command, state) = match tokens[2] {
        "set" => {
            // date time set key value.. ttl - state
            if tokens.len() < 8 {
                return Err(ParseError::Truncated { op: "set" });
            }
            let n = tokens.len();
            if tokens[n - 2] != "-" {
                return Err(ParseError::Separator);
            }
            let state: OpState = tokens[n - 1].parse()?;
            let ttl: i64 = tokens[n - 3]
                .parse()
                .map_err(|_| ParseError::Ttl(tokens[n - 3].to_string()))?;
            let command = Command::Set {
                key: tokens[3].to_string(),
                value: tokens[4..n - 3].join(" "),
                ttl,
            };
            (command, state)
        }
        "delete" => {
            // date time delete key - state
            if tokens.len() < 6 {
                return Err(ParseError::Truncated { op: "delete" });
            }
            if tokens[4] != "-" {
                return Err(ParseError::Separator);
            }
            let state: OpState = tokens[5].parse()?;
            let command = Command::Delete {
                key: tokens[3].to_string(),
            };
            (command, state)
        }
        other => return Err(ParseError::UnknownOp(other.to_string())),
    };

    Ok(Entry {
        timestamp,
        command,
        state,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::unix_now;

    #[test]
    fn set_line_round_trip() {
        let now = unix_now();
        let line = render_set(now, "user:1", "{\"name\":\"alice\"}", 60, OpState::Pending);
        let entry = parse_line(&line).unwrap();

        assert_eq!(entry.timestamp, now);
        assert_eq!(entry.state, OpState::Pending);
        assert_eq!(
            entry.command,
            Command::Set {
                key: "user:1".to_string(),
                value: "{\"name\":\"alice\"}".to_string(),
                ttl: 60,
            }
        );
    }

    #[test]
    fn delete_line_round_trip() {
        let now = unix_now();
        let line = render_delete(now, "user:1", OpState::Completed);
        let entry = parse_line(&line).unwrap();

        assert_eq!(entry.timestamp, now);
        assert_eq!(entry.state, OpState::Completed);
        assert_eq!(
            entry.command,
            Command::Delete {
                key: "user:1".to_string(),
            }
        );
    }

    #[test]
    fn set_value_containing_spaces_survives() {
        let now = unix_now();
        let line = render_set(now, "greeting", "\"hello world\"", 0, OpState::Failed);
        let entry = parse_line(&line).unwrap();

        match entry.command {
            Command::Set { value, ttl, .. } => {
                assert_eq!(value, "\"hello world\"");
                assert_eq!(ttl, 0);
            }
            Command::Delete { .. } => panic!("expected a set command"),
        }
    }

    #[test]
    fn state_tokens_parse() {
        for (token, state) in [
            ("pending", OpState::Pending),
            ("completed", OpState::Completed),
            ("failed", OpState::Failed),
        ] {
            assert_eq!(token.parse::<OpState>().unwrap(), state);
            assert_eq!(state.as_str(), token);
        }
        assert!("done".parse::<OpState>().is_err());
    }

    #[test]
    fn malformed_lines_are_rejected() {
        assert!(parse_line("").is_err());
        assert!(parse_line("2024/01/02 03:04:05").is_err());
        assert!(parse_line("2024/01/02 03:04:05 frobnicate k - pending").is_err());
        assert!(parse_line("not-a-date at-all set k 1 0 - pending").is_err());
        assert!(parse_line("2024/01/02 03:04:05 set k 1 0 pending").is_err());
        assert!(parse_line("2024/01/02 03:04:05 set k 1 zero - pending").is_err());
        assert!(parse_line("2024/01/02 03:04:05 delete k pending").is_err());
    }

    #[test]
    fn double_spaced_lines_still_parse() {
        // Lines written by the previous implementation carried a double space
        // after the timestamp; whitespace splitting accepts them.
        let line = "2024/01/02 03:04:05  set k 1 0 - pending";
        let entry = parse_line(line).unwrap();
        assert_eq!(entry.command.key(), "k");
        assert_eq!(entry.state, OpState::Pending);
    }

    #[test]
    fn timestamp_reinterpreted_in_local_zone() {
        let now = unix_now();
        let line = render_delete(now, "k", OpState::Pending);
        let entry = parse_line(&line).unwrap();
        // Rendering truncates to whole seconds, so the round trip is exact.
        assert_eq!(entry.timestamp, now);
    }
}
