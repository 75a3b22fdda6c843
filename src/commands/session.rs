use std::time::Instant;

use chrono::SecondsFormat;
use serde_json::json;

use crate::response::StandardResponse;
use crate::session::SessionManager;

/// `session-list`: every session the host knows about, in memory or on
/// disk.
pub async fn list(manager: &SessionManager) -> StandardResponse {
    let start = Instant::now();

    let mut sessions = manager.list_all().await;
    sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at));

    let entries: Vec<_> = sessions
        .iter()
        .map(|d| {
            json!({
                "session_id": d.id,
                "browser_type": d.browser_type,
                "headless": d.headless,
                "pid": d.pid,
                "port": d.port,
                "created_at": d.created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
                "last_used_at": d.last_used_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            })
        })
        .collect();

    StandardResponse::success(
        json!({
            "session_count": entries.len(),
            "sessions": entries,
        }),
        start,
    )
}
