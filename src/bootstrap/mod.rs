//! First-run installation of the sidecar runtime: Node.js, the Playwright
//! driver package and a browser binary, all cached under the per-OS cache
//! root. Idempotent; a warm cache short-circuits to a version probe.

pub mod download;
pub mod extract;
pub mod npm;
pub mod platform;

use std::path::PathBuf;

use crate::config::Config;
use crate::error::{Result, WebautoError};

/// Ensure an automation-capable runtime exists and return the node binary
/// path. All progress output goes to stderr; stdout stays reserved for the
/// response envelope.
pub async fn ensure_runtime(config: &Config) -> Result<PathBuf> {
    // Explicit override: the operator manages the runtime themselves.
    if let Some(override_path) = &config.playwright_node_path {
        let node_path = PathBuf::from(override_path);
        npm::verify_node(&node_path).await.map_err(|e| {
            WebautoError::NodeNotFound(format!(
                "PLAYWRIGHT_NODE_PATH does not point at a working Node.js binary: {e}"
            ))
        })?;
        return Ok(node_path);
    }

    let platform = platform::detect()?;
    let node_path = platform::node_binary_path(&platform);

    if node_path.exists() {
        if npm::verify_node(&node_path).await.is_ok() {
            return Ok(node_path);
        }
        eprintln!("⚠ Existing Node.js installation appears corrupted, reinstalling...");
    }

    eprintln!("\n📦 Setting up webauto runtime (one-time setup)...");
    eprintln!("   ▸ Detected platform: {} {}", platform.os, platform.arch);

    let runtime_dir = platform::runtime_dir();
    std::fs::create_dir_all(&runtime_dir)?;

    let archive_path = runtime_dir.join(format!(
        "{}{}",
        platform.node_dir_name, platform.archive_ext
    ));
    eprintln!(
        "   ▸ Downloading Node.js {} (~30MB)...",
        platform::NODE_VERSION
    );
    download::download_file(&platform.download_url, &archive_path, "node runtime").await?;

    extract::extract_archive(&archive_path, &runtime_dir, platform.archive_ext)?;

    if let Err(e) = std::fs::remove_file(&archive_path) {
        tracing::warn!("failed to clean up runtime archive: {e}");
    }

    let version = npm::verify_node(&node_path).await?;
    eprintln!("     ✓ Node.js {version} verified");

    npm::install_playwright(&node_path).await?;
    npm::install_browsers(&node_path).await?;

    eprintln!("✓ Setup complete!\n");
    Ok(node_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn override_path_must_be_a_working_node() {
        let config = Config {
            playwright_node_path: Some("/definitely/not/a/node".to_string()),
            ..Config::default()
        };
        let err = ensure_runtime(&config).await.unwrap_err();
        assert!(matches!(err, WebautoError::NodeNotFound(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn override_path_short_circuits_managed_install() {
        use std::io::Write;
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let fake_node = dir.path().join("node");
        let mut f = std::fs::File::create(&fake_node).unwrap();
        f.write_all(b"#!/bin/sh\necho v22.11.0\n").unwrap();
        drop(f);
        std::fs::set_permissions(&fake_node, std::fs::Permissions::from_mode(0o755)).unwrap();

        let config = Config {
            playwright_node_path: Some(fake_node.to_string_lossy().into_owned()),
            ..Config::default()
        };

        // No download, no extraction: the override resolves immediately.
        let resolved = ensure_runtime(&config).await.unwrap();
        assert_eq!(resolved, fake_node);

        // Idempotent: a second call resolves to the same path.
        let resolved_again = ensure_runtime(&config).await.unwrap();
        assert_eq!(resolved_again, resolved);
    }
}
