use std::time::Instant;

use base64::Engine;
use serde_json::{json, Value};

use crate::response::StandardResponse;
use crate::session::SessionManager;

/// `page-navigate`: drive the session's page to a URL.
pub async fn navigate(
    manager: &SessionManager,
    session_id: &str,
    page_url: &str,
    wait_until: &str,
    timeout_ms: u64,
) -> StandardResponse {
    let start = Instant::now();

    const WAIT_UNTIL: [&str; 3] = ["load", "domcontentloaded", "networkidle"];
    if !WAIT_UNTIL.contains(&wait_until) {
        return StandardResponse::error(
            "INVALID_WAIT_UNTIL",
            format!("Invalid wait-until value: {wait_until}"),
            "Use one of: load, domcontentloaded, networkidle",
            json!({"session_id": session_id, "wait_until": wait_until}),
            start,
        );
    }

    let payload = json!({
        "command": "navigate",
        "url": page_url,
        "waitUntil": wait_until,
        "timeout": timeout_ms,
    });

    let details = json!({"session_id": session_id, "page_url": page_url});
    let result = match manager.send_command(session_id, payload, None).await {
        Ok(result) => result,
        Err(e) => return StandardResponse::from_error(&e, details, start),
    };

    if !result.success {
        return StandardResponse::error(
            "PAGE_LOAD_FAILED",
            format!("Navigation failed: {}", result.error_message()),
            "Check URL and network connectivity",
            details,
            start,
        );
    }

    StandardResponse::success(
        json!({
            "session_id": session_id,
            "url": result.data["url"],
            "title": result.data["title"],
            "wait_until": wait_until,
            "timeout_ms": timeout_ms,
        }),
        start,
    )
}

/// `page-evaluate`: run a script in the page context and return the value.
pub async fn evaluate(
    manager: &SessionManager,
    session_id: &str,
    script: &str,
    timeout_ms: u64,
) -> StandardResponse {
    let start = Instant::now();

    let payload = json!({
        "command": "evaluate",
        "script": script,
        "timeout": timeout_ms,
    });

    let result = match manager.send_command(session_id, payload, None).await {
        Ok(result) => result,
        Err(e) => {
            return StandardResponse::from_error(&e, json!({"session_id": session_id}), start)
        }
    };

    if !result.success {
        return StandardResponse::error(
            "SCRIPT_EXECUTION_FAILED",
            format!("Script execution failed: {}", result.error_message()),
            "Check JavaScript syntax and ensure the script returns a serializable value",
            json!({"session_id": session_id, "script": script}),
            start,
        );
    }

    StandardResponse::success(
        json!({
            "session_id": session_id,
            "result": result.data["result"],
            "result_type": result.data["result_type"],
        }),
        start,
    )
}

/// `page-screenshot`: capture the page and write the decoded image to disk.
pub async fn screenshot(
    manager: &SessionManager,
    session_id: &str,
    image_path: &str,
    image_type: &str,
    full_page: bool,
    timeout_ms: u64,
) -> StandardResponse {
    let start = Instant::now();
    let details = json!({"session_id": session_id, "image_path": image_path});

    let payload = json!({
        "command": "screenshot",
        "type": image_type,
        "fullPage": full_page,
        "timeout": timeout_ms,
    });

    let result = match manager.send_command(session_id, payload, None).await {
        Ok(result) => result,
        Err(e) => return StandardResponse::from_error(&e, details, start),
    };

    if !result.success {
        return StandardResponse::error(
            "PAGE_LOAD_FAILED",
            format!("Screenshot failed: {}", result.error_message()),
            "Check if the page is ready",
            details,
            start,
        );
    }

    let file_size = match decode_and_write(&result.data["screenshot"], image_path) {
        Ok(size) => size,
        Err(message) => {
            return StandardResponse::error(
                "PAGE_LOAD_FAILED",
                message,
                "Check the output path and permissions",
                details,
                start,
            )
        }
    };

    StandardResponse::success(
        json!({
            "session_id": session_id,
            "image_path": image_path,
            "type": image_type,
            "full_page": full_page,
            "file_size": file_size,
        }),
        start,
    )
}

/// `page-pdf`: print the page to a PDF file.
pub async fn pdf(
    manager: &SessionManager,
    session_id: &str,
    pdf_path: &str,
    pdf_format: &str,
    landscape: bool,
    print_background: bool,
    timeout_ms: u64,
) -> StandardResponse {
    let start = Instant::now();
    let details = json!({"session_id": session_id, "pdf_path": pdf_path});

    let payload = json!({
        "command": "pdf",
        "format": pdf_format,
        "landscape": landscape,
        "printBackground": print_background,
        "timeout": timeout_ms,
    });

    let result = match manager.send_command(session_id, payload, None).await {
        Ok(result) => result,
        Err(e) => return StandardResponse::from_error(&e, details, start),
    };

    if !result.success {
        return StandardResponse::error(
            "PAGE_LOAD_FAILED",
            format!("PDF generation failed: {}", result.error_message()),
            "Check if the page is ready",
            details,
            start,
        );
    }

    let file_size = match decode_and_write(&result.data["pdf"], pdf_path) {
        Ok(size) => size,
        Err(message) => {
            return StandardResponse::error(
                "PAGE_LOAD_FAILED",
                message,
                "Check the output path and permissions",
                details,
                start,
            )
        }
    };

    StandardResponse::success(
        json!({
            "session_id": session_id,
            "pdf_path": pdf_path,
            "pdf_format": pdf_format,
            "landscape": landscape,
            "print_background": print_background,
            "file_size": file_size,
        }),
        start,
    )
}

/// `page-get-html`: page or element HTML, inline or written to a file.
pub async fn get_html(
    manager: &SessionManager,
    session_id: &str,
    element_selector: Option<&str>,
    output_path: Option<&str>,
    timeout_ms: u64,
) -> StandardResponse {
    let start = Instant::now();
    let details = json!({"session_id": session_id, "element_selector": element_selector});

    let mut payload = json!({
        "command": "get-html",
        "timeout": timeout_ms,
    });
    if let Some(selector) = element_selector {
        payload["selector"] = json!(selector);
    }

    let result = match manager.send_command(session_id, payload, None).await {
        Ok(result) => result,
        Err(e) => return StandardResponse::from_error(&e, details, start),
    };

    if !result.success {
        return StandardResponse::error(
            "ELEMENT_NOT_FOUND",
            format!("Get HTML failed: {}", result.error_message()),
            "Check if the element exists and is accessible",
            details,
            start,
        );
    }

    let Some(html) = result.data["html"].as_str() else {
        return StandardResponse::error(
            "PAGE_LOAD_FAILED",
            "Failed to get HTML data from response",
            "Internal error",
            details,
            start,
        );
    };

    let mut data = json!({
        "session_id": session_id,
        "html_length": html.len(),
    });
    if let Some(selector) = element_selector {
        data["selector"] = json!(selector);
    }

    match output_path {
        Some(path) => {
            if let Err(e) = std::fs::write(path, html) {
                return StandardResponse::error(
                    "PAGE_LOAD_FAILED",
                    format!("Failed to write HTML file: {e}"),
                    "Check the output path and permissions",
                    json!({"session_id": session_id, "output_path": path}),
                    start,
                );
            }
            data["output_path"] = json!(path);
        }
        None => {
            data["html"] = json!(html);
        }
    }

    StandardResponse::success(data, start)
}

/// Decode a base64 payload field and write it to `path`, returning the
/// file size.
fn decode_and_write(field: &Value, path: &str) -> Result<u64, String> {
    let encoded = field
        .as_str()
        .ok_or_else(|| "Failed to get binary data from response".to_string())?;

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| format!("Failed to decode binary data: {e}"))?;

    std::fs::write(path, &bytes).map_err(|e| format!("Failed to write {path}: {e}"))?;

    Ok(bytes.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_and_write_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.png");
        let encoded = base64::engine::general_purpose::STANDARD.encode(b"fake-png");

        let size = decode_and_write(&json!(encoded), path.to_str().unwrap()).unwrap();
        assert_eq!(size, 8);
        assert_eq!(std::fs::read(&path).unwrap(), b"fake-png");
    }

    #[test]
    fn decode_and_write_rejects_missing_field() {
        let err = decode_and_write(&Value::Null, "/tmp/never-written").unwrap_err();
        assert!(err.contains("binary data"));
    }

    #[test]
    fn decode_and_write_rejects_bad_base64() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.bin");
        let err = decode_and_write(&json!("not base64 !!!"), path.to_str().unwrap()).unwrap_err();
        assert!(err.contains("decode"));
        assert!(!path.exists());
    }
}
