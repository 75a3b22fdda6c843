use std::time::Instant;

use chrono::{SecondsFormat, Utc};
use serde_json::json;

use crate::response::StandardResponse;
use crate::session::SessionManager;

pub struct LaunchArgs {
    pub browser_type: String,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub user_agent: String,
    pub session_id: Option<String>,
}

/// `browser-launch`: spawn a sidecar, wait for its handshake, persist the
/// session and print its id.
pub async fn launch(manager: &SessionManager, args: LaunchArgs) -> StandardResponse {
    let start = Instant::now();

    match manager
        .create(&args.browser_type, args.headless, args.session_id.as_deref())
        .await
    {
        Ok(descriptor) => StandardResponse::success(
            json!({
                "session_id": descriptor.id,
                "browser_type": descriptor.browser_type,
                "headless": descriptor.headless,
                "viewport": {
                    "width": args.viewport_width,
                    "height": args.viewport_height,
                },
                "user_agent": args.user_agent,
                "created_at": descriptor
                    .created_at
                    .to_rfc3339_opts(SecondsFormat::Secs, true),
            }),
            start,
        ),
        Err(e) => StandardResponse::from_error(
            &e,
            json!({
                "browser_type": args.browser_type,
                "headless": args.headless,
            }),
            start,
        ),
    }
}

/// `browser-close` / `session-close`: tear the session down everywhere.
pub async fn close(manager: &SessionManager, session_id: &str) -> StandardResponse {
    let start = Instant::now();

    match manager.close(session_id).await {
        Ok(()) => StandardResponse::success(
            json!({
                "session_id": session_id,
                "closed_at": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            }),
            start,
        ),
        Err(e) => StandardResponse::from_error(&e, json!({"session_id": session_id}), start),
    }
}
