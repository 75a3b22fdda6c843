use std::env;
use std::path::PathBuf;

use crate::error::{Result, WebautoError};

/// Node.js version pinned for the sidecar runtime.
pub const NODE_VERSION: &str = "v22.11.0";

/// Base URL for Node.js release archives.
pub const NODE_BASE_URL: &str = "https://nodejs.org/dist";

/// Platform-specific runtime archive layout.
#[derive(Debug, Clone)]
pub struct PlatformInfo {
    /// darwin, linux or windows
    pub os: &'static str,
    /// x64 or arm64
    pub arch: &'static str,
    /// Top-level directory inside the archive, e.g. `node-v22.11.0-darwin-arm64`
    pub node_dir_name: String,
    pub archive_ext: &'static str,
    /// Relative path of the node binary within the extracted tree
    pub binary_path: &'static str,
    pub download_url: String,
}

/// Resolve archive naming and download URL for the current OS/arch.
pub fn detect() -> Result<PlatformInfo> {
    let arch = match env::consts::ARCH {
        "x86_64" => "x64",
        "aarch64" => "arm64",
        other => {
            return Err(WebautoError::NodeNotFound(format!(
                "unsupported architecture: {other}"
            )))
        }
    };

    let (os, node_dir_name, archive_ext, binary_path) = match env::consts::OS {
        "macos" => (
            "darwin",
            format!("node-{NODE_VERSION}-darwin-{arch}"),
            ".tar.gz",
            "bin/node",
        ),
        "windows" => (
            "windows",
            format!("node-{NODE_VERSION}-win-{arch}"),
            ".zip",
            "node.exe",
        ),
        "linux" => (
            "linux",
            format!("node-{NODE_VERSION}-linux-{arch}"),
            ".tar.xz",
            "bin/node",
        ),
        other => {
            return Err(WebautoError::NodeNotFound(format!(
                "unsupported operating system: {other}"
            )))
        }
    };

    let download_url = format!("{NODE_BASE_URL}/{NODE_VERSION}/{node_dir_name}{archive_ext}");

    Ok(PlatformInfo {
        os,
        arch,
        node_dir_name,
        archive_ext,
        binary_path,
        download_url,
    })
}

/// Cache root shared by all host invocations on this machine.
///
/// `PLAYWRIGHT_CACHE_PATH` overrides; otherwise local-app-data on Windows
/// and `~/.cache/oa/webauto` elsewhere.
pub fn cache_dir() -> PathBuf {
    if let Ok(p) = env::var("PLAYWRIGHT_CACHE_PATH") {
        if !p.is_empty() {
            return PathBuf::from(p);
        }
    }

    if cfg!(windows) {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("oa")
            .join("webauto")
    } else {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".cache")
            .join("oa")
            .join("webauto")
    }
}

/// Where the extracted Node.js runtime lives.
pub fn runtime_dir() -> PathBuf {
    cache_dir().join("runtime")
}

/// Where `npm install` places the Playwright driver package.
pub fn node_modules_dir() -> PathBuf {
    cache_dir().join("node_modules")
}

/// Where Playwright downloads browser binaries.
/// `PLAYWRIGHT_BROWSERS_PATH` overrides for pre-provisioned environments.
pub fn browsers_dir() -> PathBuf {
    if let Ok(p) = env::var("PLAYWRIGHT_BROWSERS_PATH") {
        if !p.is_empty() {
            return PathBuf::from(p);
        }
    }
    cache_dir().join("browsers")
}

/// Directory holding per-session descriptor files.
pub fn sessions_dir() -> PathBuf {
    cache_dir().join("sessions")
}

/// Directory the embedded runner script is materialized into.
pub fn runner_dir() -> PathBuf {
    cache_dir().join("runner")
}

/// Full path of the managed node binary for this platform.
pub fn node_binary_path(info: &PlatformInfo) -> PathBuf {
    runtime_dir().join(&info.node_dir_name).join(info.binary_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_builds_consistent_urls() {
        let info = detect().expect("supported platform in CI");
        assert!(info.node_dir_name.starts_with(&format!("node-{NODE_VERSION}-")));
        assert!(info.download_url.starts_with(NODE_BASE_URL));
        assert!(info.download_url.ends_with(info.archive_ext));
        assert!(info
            .download_url
            .contains(&format!("/{NODE_VERSION}/{}", info.node_dir_name)));
        assert!(matches!(info.arch, "x64" | "arm64"));
    }

    #[test]
    fn linux_uses_tar_xz_naming() {
        if env::consts::OS != "linux" {
            return;
        }
        let info = detect().unwrap();
        assert_eq!(info.os, "linux");
        assert_eq!(info.archive_ext, ".tar.xz");
        assert_eq!(info.binary_path, "bin/node");
    }

    #[test]
    fn cache_layout_hangs_off_cache_root() {
        let root = cache_dir();
        assert_eq!(runtime_dir(), root.join("runtime"));
        assert_eq!(node_modules_dir(), root.join("node_modules"));
        assert_eq!(sessions_dir(), root.join("sessions"));
        assert_eq!(runner_dir(), root.join("runner"));
    }

    #[test]
    fn node_binary_path_is_inside_runtime_dir() {
        let info = detect().unwrap();
        let path = node_binary_path(&info);
        assert!(path.starts_with(runtime_dir()));
        assert!(path.to_string_lossy().contains(&info.node_dir_name));
    }
}
