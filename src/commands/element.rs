use std::time::Instant;

use serde_json::json;

use crate::response::StandardResponse;
use crate::session::SessionManager;

/// `element-click`
pub async fn click(
    manager: &SessionManager,
    session_id: &str,
    element_selector: &str,
    timeout_ms: u64,
) -> StandardResponse {
    let start = Instant::now();
    let details = json!({"session_id": session_id, "element_selector": element_selector});

    let payload = json!({
        "command": "click",
        "selector": element_selector,
        "timeout": timeout_ms,
    });

    let result = match manager.send_command(session_id, payload, None).await {
        Ok(result) => result,
        Err(e) => return StandardResponse::from_error(&e, details, start),
    };

    if !result.success {
        return StandardResponse::error(
            "ELEMENT_NOT_CLICKABLE",
            format!("Click failed: {}", result.error_message()),
            "Check if the element is visible and clickable",
            details,
            start,
        );
    }

    StandardResponse::success(
        json!({
            "session_id": session_id,
            "element_selector": element_selector,
            "clicked": true,
            "timeout_ms": timeout_ms,
        }),
        start,
    )
}

/// `element-type`: fill a field with text.
pub async fn type_text(
    manager: &SessionManager,
    session_id: &str,
    element_selector: &str,
    element_text: &str,
    timeout_ms: u64,
) -> StandardResponse {
    let start = Instant::now();
    let details = json!({"session_id": session_id, "element_selector": element_selector});

    let payload = json!({
        "command": "type",
        "selector": element_selector,
        "text": element_text,
        "timeout": timeout_ms,
    });

    let result = match manager.send_command(session_id, payload, None).await {
        Ok(result) => result,
        Err(e) => return StandardResponse::from_error(&e, details, start),
    };

    if !result.success {
        return StandardResponse::error(
            "ELEMENT_NOT_CLICKABLE",
            format!("Type failed: {}", result.error_message()),
            "Check if the element is visible and editable",
            details,
            start,
        );
    }

    StandardResponse::success(
        json!({
            "session_id": session_id,
            "element_selector": element_selector,
            "element_text": element_text,
            "typed": true,
            "timeout_ms": timeout_ms,
        }),
        start,
    )
}

/// `element-get-text`: scalar text for a single match, an array for many.
pub async fn get_text(
    manager: &SessionManager,
    session_id: &str,
    element_selector: &str,
    timeout_ms: u64,
) -> StandardResponse {
    let start = Instant::now();
    let details = json!({"session_id": session_id, "element_selector": element_selector});

    let payload = json!({
        "command": "get-text",
        "selector": element_selector,
        "timeout": timeout_ms,
    });

    let result = match manager.send_command(session_id, payload, None).await {
        Ok(result) => result,
        Err(e) => return StandardResponse::from_error(&e, details, start),
    };

    if !result.success {
        return StandardResponse::error(
            "ELEMENT_NOT_FOUND",
            format!("Get text failed: {}", result.error_message()),
            "Check if the element exists and is accessible",
            details,
            start,
        );
    }

    StandardResponse::success(
        json!({
            "session_id": session_id,
            "element_selector": element_selector,
            "text": result.data["text"],
            "element_count": result.data["element_count"],
        }),
        start,
    )
}

/// `element-get-attribute`
pub async fn get_attribute(
    manager: &SessionManager,
    session_id: &str,
    element_selector: &str,
    attribute_name: &str,
    timeout_ms: u64,
) -> StandardResponse {
    let start = Instant::now();
    let details = json!({
        "session_id": session_id,
        "element_selector": element_selector,
        "attribute_name": attribute_name,
    });

    let payload = json!({
        "command": "get-attribute",
        "selector": element_selector,
        "attributeName": attribute_name,
        "timeout": timeout_ms,
    });

    let result = match manager.send_command(session_id, payload, None).await {
        Ok(result) => result,
        Err(e) => return StandardResponse::from_error(&e, details, start),
    };

    if !result.success {
        return StandardResponse::error(
            "ELEMENT_NOT_FOUND",
            format!("Get attribute failed: {}", result.error_message()),
            "Check if the element exists and has the specified attribute",
            details,
            start,
        );
    }

    StandardResponse::success(
        json!({
            "session_id": session_id,
            "element_selector": element_selector,
            "attribute_name": attribute_name,
            "attribute_value": result.data["attribute_value"],
            "element_count": result.data["element_count"],
        }),
        start,
    )
}

/// `element-wait`: block until the element meets a state condition.
pub async fn wait(
    manager: &SessionManager,
    session_id: &str,
    element_selector: &str,
    wait_condition: &str,
    timeout_ms: u64,
) -> StandardResponse {
    let start = Instant::now();
    let details = json!({
        "session_id": session_id,
        "element_selector": element_selector,
        "wait_condition": wait_condition,
    });

    const CONDITIONS: [&str; 4] = ["visible", "hidden", "attached", "detached"];
    if !CONDITIONS.contains(&wait_condition) {
        return StandardResponse::error(
            "INVALID_WAIT_CONDITION",
            format!("Invalid wait condition: {wait_condition}"),
            "Use one of: visible, hidden, attached, detached",
            details,
            start,
        );
    }

    let payload = json!({
        "command": "wait",
        "selector": element_selector,
        "waitCondition": wait_condition,
        "timeout": timeout_ms,
    });

    let result = match manager.send_command(session_id, payload, None).await {
        Ok(result) => result,
        Err(e) => return StandardResponse::from_error(&e, details, start),
    };

    if !result.success {
        return StandardResponse::error(
            "TIMEOUT_EXCEEDED",
            format!("Wait failed: {}", result.error_message()),
            "The element did not meet the wait condition within the timeout",
            details,
            start,
        );
    }

    StandardResponse::success(
        json!({
            "session_id": session_id,
            "element_selector": element_selector,
            "wait_condition": result.data["wait_condition"],
            "waited_ms": result.data["waited_ms"],
            "element_found": result.data["element_found"],
        }),
        start,
    )
}

/// `element-query-all`: batch text/attribute extraction over every match.
pub async fn query_all(
    manager: &SessionManager,
    session_id: &str,
    element_selector: &str,
    get_text: bool,
    attribute_name: Option<&str>,
    limit: u64,
    timeout_ms: u64,
) -> StandardResponse {
    let start = Instant::now();
    let details = json!({
        "session_id": session_id,
        "element_selector": element_selector,
        "get_text": get_text,
        "get_attribute": attribute_name,
        "limit": limit,
    });

    if !get_text && attribute_name.is_none() {
        return StandardResponse::error(
            "INVALID_FLAG_COMBINATION",
            "At least one of --get-text or --get-attribute must be specified",
            "Specify --get-text, --get-attribute <name>, or both",
            details,
            start,
        );
    }

    let mut payload = json!({
        "command": "query-all",
        "selector": element_selector,
        "getText": get_text,
        "limit": limit,
        "timeout": timeout_ms,
    });
    if let Some(name) = attribute_name {
        payload["attributeName"] = json!(name);
    }

    let result = match manager.send_command(session_id, payload, None).await {
        Ok(result) => result,
        Err(e) => return StandardResponse::from_error(&e, details, start),
    };

    if !result.success {
        let code = if result.error_message() == format!("No elements found: {element_selector}") {
            "NO_ELEMENTS_FOUND"
        } else {
            "ELEMENT_NOT_FOUND"
        };
        return StandardResponse::error(
            code,
            format!("Query all failed: {}", result.error_message()),
            "Check if elements exist and are accessible",
            details,
            start,
        );
    }

    let mut data = json!({
        "session_id": session_id,
        "element_selector": element_selector,
        "element_count": result.data["element_count"],
        "elements": result.data["elements"],
    });

    if limit > 0 {
        data["limit"] = result.data["limit"].clone();
        if let Some(total) = result.data["element_count"].as_u64() {
            if total > limit {
                data["note"] = json!(format!(
                    "Returned {limit} of {total} total elements (limited by --limit flag)"
                ));
            }
        }
    }

    StandardResponse::success(data, start)
}
