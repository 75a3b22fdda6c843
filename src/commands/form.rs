use std::collections::BTreeMap;
use std::time::Instant;

use serde_json::json;

use crate::response::StandardResponse;
use crate::session::SessionManager;

/// `form-fill`: fill every field from a selector→value JSON map, then
/// optionally click a submit button. Fields are filled sequentially so a
/// failure names the selector that broke.
pub async fn fill(
    manager: &SessionManager,
    session_id: &str,
    form_data: &str,
    submit: bool,
    submit_selector: Option<&str>,
    timeout_ms: u64,
) -> StandardResponse {
    let start = Instant::now();

    // BTreeMap keeps the fill order deterministic for a given input.
    let fields: BTreeMap<String, String> = match serde_json::from_str(form_data) {
        Ok(fields) => fields,
        Err(e) => {
            return StandardResponse::error(
                "FORM_VALIDATION_FAILED",
                format!("Failed to parse form-data: {e}"),
                "Provide a valid JSON object with selector:value pairs",
                json!({"session_id": session_id, "form_data": form_data}),
                start,
            )
        }
    };

    if fields.is_empty() {
        return StandardResponse::error(
            "FORM_VALIDATION_FAILED",
            "Form data is empty",
            "Provide at least one field in form-data",
            json!({"session_id": session_id}),
            start,
        );
    }

    if submit && submit_selector.map_or(true, str::is_empty) {
        return StandardResponse::error(
            "FORM_VALIDATION_FAILED",
            "Submit selector is required when --submit is set",
            "Provide --submit-selector with a valid CSS selector",
            json!({"session_id": session_id, "submit": submit}),
            start,
        );
    }

    let mut filled = Vec::with_capacity(fields.len());
    for (selector, value) in &fields {
        let payload = json!({
            "command": "type",
            "selector": selector,
            "text": value,
            "timeout": timeout_ms,
        });

        let result = match manager.send_command(session_id, payload, None).await {
            Ok(result) => result,
            Err(e) => {
                return StandardResponse::from_error(
                    &e,
                    json!({
                        "session_id": session_id,
                        "selector": selector,
                        "value": value,
                    }),
                    start,
                )
            }
        };

        if !result.success {
            return StandardResponse::error(
                "ELEMENT_NOT_CLICKABLE",
                format!("Field fill failed: {}", result.error_message()),
                "Check if the element is visible and editable",
                json!({"session_id": session_id, "selector": selector}),
                start,
            );
        }

        filled.push(json!({
            "selector": selector,
            "value": value,
            "filled": true,
        }));
    }

    let mut submitted = false;
    if submit {
        let selector = submit_selector.unwrap_or_default();
        let payload = json!({
            "command": "click",
            "selector": selector,
            "timeout": timeout_ms,
        });

        let result = match manager.send_command(session_id, payload, None).await {
            Ok(result) => result,
            Err(e) => {
                return StandardResponse::from_error(
                    &e,
                    json!({"session_id": session_id, "submit_selector": selector}),
                    start,
                )
            }
        };

        if !result.success {
            return StandardResponse::error(
                "ELEMENT_NOT_CLICKABLE",
                format!("Submit button click failed: {}", result.error_message()),
                "Check if the submit button is visible and clickable",
                json!({"session_id": session_id, "submit_selector": selector}),
                start,
            );
        }

        submitted = true;
    }

    StandardResponse::success(
        json!({
            "session_id": session_id,
            "fields_filled": filled.len(),
            "fields": filled,
            "submitted": submitted,
            "timeout_ms": timeout_ms,
        }),
        start,
    )
}
