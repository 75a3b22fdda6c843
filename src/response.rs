use std::time::Instant;

use serde::Serialize;
use serde_json::Value;

use crate::error::WebautoError;

const PLUGIN_NAME: &str = "webauto";
const PLUGIN_VERSION: &str = "1.0.0";

/// The JSON envelope every CLI verb prints to stdout.
///
/// `data` is `null` on failure, `error` is `null` on success; the process
/// exit code mirrors `success` so scripts can skip parsing entirely.
#[derive(Debug, Serialize)]
pub struct StandardResponse {
    pub success: bool,
    pub data: Value,
    pub error: Option<ErrorInfo>,
    pub metadata: Metadata,
}

#[derive(Debug, Serialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery_suggestion: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Metadata {
    pub plugin: &'static str,
    pub version: &'static str,
    pub execution_time_ms: u64,
}

impl StandardResponse {
    pub fn success(data: Value, start: Instant) -> Self {
        Self {
            success: true,
            data,
            error: None,
            metadata: Metadata::since(start),
        }
    }

    pub fn error(
        code: impl Into<String>,
        message: impl Into<String>,
        recovery: impl Into<String>,
        details: Value,
        start: Instant,
    ) -> Self {
        let recovery = recovery.into();
        Self {
            success: false,
            data: Value::Null,
            error: Some(ErrorInfo {
                code: code.into(),
                message: message.into(),
                details: (!details.is_null()).then_some(details),
                recovery_suggestion: (!recovery.is_empty()).then_some(recovery),
            }),
            metadata: Metadata::since(start),
        }
    }

    /// Wrap a typed error using its stable code and default recovery hint.
    pub fn from_error(err: &WebautoError, details: Value, start: Instant) -> Self {
        Self::error(
            err.code(),
            err.to_string(),
            err.recovery_suggestion().unwrap_or_default(),
            details,
            start,
        )
    }

    /// Print the envelope as indented JSON on stdout.
    pub fn print(&self) {
        match serde_json::to_string_pretty(self) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                // The envelope is built from already-serialized values, so
                // this only fires on broken custom data. Emit a minimal
                // failure envelope rather than nothing.
                tracing::error!("failed to serialize response envelope: {e}");
                println!(
                    "{{\"success\":false,\"data\":null,\"error\":{{\"code\":\"JSON_ERROR\",\"message\":\"failed to serialize response\"}}}}"
                );
            }
        }
    }
}

impl Metadata {
    fn since(start: Instant) -> Self {
        Self {
            plugin: PLUGIN_NAME,
            version: PLUGIN_VERSION,
            execution_time_ms: start.elapsed().as_millis() as u64,
        }
    }
}
