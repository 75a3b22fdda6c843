use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reply envelope spoken by the sidecar runner: one JSON object per line,
/// `data` populated on success, `error` on failure. The same shape is used
/// for the launch handshake on the sidecar's stdout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerReply {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunnerReply {
    /// Error message with a fallback for malformed failure replies.
    pub fn error_message(&self) -> &str {
        self.error.as_deref().unwrap_or("unknown error")
    }
}

/// Payload of the one-line launch handshake the sidecar writes to stdout
/// once its browser is up and its TCP listener is bound.
#[derive(Debug, Clone, Deserialize)]
pub struct LaunchHandshake {
    #[serde(default)]
    pub browser_type: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub is_connected: bool,
    #[serde(default)]
    pub port: u16,
}
