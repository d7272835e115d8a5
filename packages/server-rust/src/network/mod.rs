//! Network surfaces for the cache: the HTTP request/response API and the
//! line-oriented shell. Both speak the same JSON reply envelope.

pub mod http;
pub mod shell;

use chrono::{Local, TimeZone};
use serde::Serialize;
use serde_json::Value;

/// JSON reply envelope shared by both surfaces.
#[derive(Debug, Serialize)]
pub struct Envelope {
    /// `"ok"` or `"error"`.
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Human-readable local expiry, present only for records with a ttl.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expired_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Envelope {
    /// A bare `{"status":"ok"}` reply.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            status: "ok",
            value: None,
            expired_at: None,
            error_message: None,
        }
    }

    /// An ok reply carrying a value.
    #[must_use]
    pub fn ok_value(value: Value) -> Self {
        Self {
            value: Some(value),
            ..Self::ok()
        }
    }

    /// An error reply with a message.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error",
            value: None,
            expired_at: None,
            error_message: Some(message.into()),
        }
    }

    /// Attaches the record expiry when it has one (non-zero).
    #[must_use]
    pub fn with_expiry(mut self, expired_at: i64) -> Self {
        if expired_at != 0 {
            self.expired_at = Some(format_expiry(expired_at));
        }
        self
    }
}

/// Renders an absolute expiry as `yyyy-mm-dd HH:MM:SS` in the local zone.
#[must_use]
pub fn format_expiry(expired_at: i64) -> String {
    Local
        .timestamp_opt(expired_at, 0)
        .single()
        .map_or_else(|| expired_at.to_string(), |dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn ok_envelope_omits_absent_fields() {
        let body = serde_json::to_string(&Envelope::ok()).unwrap();
        assert_eq!(body, r#"{"status":"ok"}"#);
    }

    #[test]
    fn value_and_expiry_serialize_when_present() {
        let body =
            serde_json::to_string(&Envelope::ok_value(json!(["a"])).with_expiry(1_700_000_000))
                .unwrap();
        assert!(body.contains(r#""value":["a"]"#));
        assert!(body.contains(r#""expired_at":""#));
    }

    #[test]
    fn zero_expiry_is_omitted() {
        let body = serde_json::to_string(&Envelope::ok_value(json!(1)).with_expiry(0)).unwrap();
        assert!(!body.contains("expired_at"));
    }

    #[test]
    fn error_envelope_carries_message() {
        let body = serde_json::to_string(&Envelope::error("nope")).unwrap();
        assert_eq!(body, r#"{"status":"error","error_message":"nope"}"#);
    }
}
