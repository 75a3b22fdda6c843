use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

use crate::bootstrap::platform;
use crate::error::{Result, WebautoError};

/// Probe a node binary with `--version`; returns the reported version.
pub async fn verify_node(node_path: &Path) -> Result<String> {
    let output = Command::new(node_path)
        .arg("--version")
        .output()
        .await
        .map_err(|e| {
            WebautoError::NodeNotFound(format!(
                "failed to run {}: {e}",
                node_path.display()
            ))
        })?;

    if !output.status.success() {
        return Err(WebautoError::NodeNotFound(format!(
            "{} --version exited with {}",
            node_path.display(),
            output.status
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Locate npm/npx next to the node binary (`.cmd` variants on Windows).
fn sibling_tool(node_path: &Path, name: &str) -> Result<PathBuf> {
    let dir = node_path.parent().unwrap_or_else(|| Path::new("."));

    let plain = dir.join(name);
    if plain.exists() {
        return Ok(plain);
    }
    let cmd = dir.join(format!("{name}.cmd"));
    if cmd.exists() {
        return Ok(cmd);
    }

    Err(WebautoError::PlaywrightNotInstalled(format!(
        "{name} not found in the Node.js installation at {}",
        dir.display()
    )))
}

/// `npm install playwright @playwright/test` into the cache's node_modules.
/// Output is captured; a non-zero exit is fatal and includes the output.
pub async fn install_playwright(node_path: &Path) -> Result<()> {
    let cache_dir = platform::cache_dir();
    let browsers_dir = platform::browsers_dir();

    eprintln!("   ▸ Installing Playwright library...");

    std::fs::create_dir_all(platform::node_modules_dir())?;

    let npm = sibling_tool(node_path, "npm")?;
    let output = Command::new(&npm)
        .args(["install", "playwright", "@playwright/test"])
        .current_dir(&cache_dir)
        .env("PLAYWRIGHT_BROWSERS_PATH", &browsers_dir)
        .output()
        .await
        .map_err(|e| {
            WebautoError::PlaywrightNotInstalled(format!("failed to run npm: {e}"))
        })?;

    if !output.status.success() {
        return Err(WebautoError::PlaywrightNotInstalled(format!(
            "npm install failed with {}\nOutput: {}{}",
            output.status,
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr),
        )));
    }

    eprintln!("     ✓ Playwright installed");
    Ok(())
}

/// `npx playwright install chromium --with-deps` into the browsers dir.
/// The browser download is long-running, so output streams through.
pub async fn install_browsers(node_path: &Path) -> Result<()> {
    let cache_dir = platform::cache_dir();
    let browsers_dir = platform::browsers_dir();

    eprintln!("   ▸ Installing Playwright browsers...");

    std::fs::create_dir_all(&browsers_dir)?;

    let npx = sibling_tool(node_path, "npx")?;
    let status = Command::new(&npx)
        .args(["playwright", "install", "chromium", "--with-deps"])
        .current_dir(&cache_dir)
        .env("PLAYWRIGHT_BROWSERS_PATH", &browsers_dir)
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await
        .map_err(|e| {
            WebautoError::PlaywrightNotInstalled(format!("failed to run npx: {e}"))
        })?;

    if !status.success() {
        return Err(WebautoError::PlaywrightNotInstalled(format!(
            "playwright install failed with {status}"
        )));
    }

    eprintln!("     ✓ Chromium browser installed");
    Ok(())
}
