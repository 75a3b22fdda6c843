use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};

use crate::bootstrap::platform;
use crate::error::{Result, WebautoError};
use crate::ipc::{LaunchHandshake, RunnerReply};

/// How long the sidecar gets to report its handshake line.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// A successfully launched sidecar: handshake read, port known.
#[derive(Debug)]
pub struct LaunchedSidecar {
    pub pid: u32,
    pub port: u16,
    pub version: String,
    pub process: ProcessRef,
}

/// Handle to a sidecar process. A freshly spawned sidecar carries its
/// child handle; a reattached one only knows the recorded pid. Both kill.
pub enum ProcessRef {
    Owned(Child),
    Attached(u32),
}

impl ProcessRef {
    pub fn pid(&self) -> Option<u32> {
        match self {
            Self::Owned(child) => child.id(),
            Self::Attached(pid) => Some(*pid),
        }
    }

    pub async fn kill(&mut self) -> Result<()> {
        match self {
            Self::Owned(child) => {
                child.kill().await?;
                Ok(())
            }
            Self::Attached(pid) => kill_pid(*pid),
        }
    }
}

impl std::fmt::Debug for ProcessRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Owned(child) => write!(f, "ProcessRef::Owned(pid={:?})", child.id()),
            Self::Attached(pid) => write!(f, "ProcessRef::Attached(pid={pid})"),
        }
    }
}

/// Force-kill a process by pid.
#[cfg(unix)]
pub fn kill_pid(pid: u32) -> Result<()> {
    // pid 0 targets the caller's own process group and values beyond
    // i32::MAX wrap negative (a named group), so both are rejected.
    if pid == 0 || pid > i32::MAX as u32 {
        return Err(WebautoError::BrowserConnectionLost(format!(
            "refusing to signal invalid pid {pid}"
        )));
    }
    let rc = unsafe { libc::kill(pid as i32, libc::SIGKILL) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            return Ok(()); // already gone
        }
        return Err(err.into());
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn kill_pid(pid: u32) -> Result<()> {
    let status = std::process::Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/F"])
        .status()?;
    if !status.success() && is_pid_alive(pid) {
        return Err(WebautoError::BrowserConnectionLost(format!(
            "taskkill failed for pid {pid}"
        )));
    }
    Ok(())
}

/// Liveness probe: `kill(pid, 0)` on Unix, a `tasklist` query on Windows.
pub fn is_pid_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        if pid == 0 || pid > i32::MAX as u32 {
            return false;
        }
        unsafe { libc::kill(pid as i32, 0) == 0 }
    }
    #[cfg(not(unix))]
    {
        let pid_str = pid.to_string();
        std::process::Command::new("tasklist")
            .args(["/FI", &format!("PID eq {pid}"), "/NH"])
            .output()
            .map(|o| {
                String::from_utf8_lossy(&o.stdout)
                    .lines()
                    .any(|line| line.split_whitespace().any(|field| field == pid_str))
            })
            .unwrap_or(false)
    }
}

/// Spawn the sidecar and wait for its launch handshake.
///
/// The runner inherits the parent environment plus the browsers path and a
/// JSON launch config; its working directory is the cache root so Node can
/// resolve the playwright module from `node_modules/`.
pub async fn spawn(
    node_path: &Path,
    script_path: &Path,
    browser_type: &str,
    headless: bool,
) -> Result<LaunchedSidecar> {
    let runner_config = serde_json::to_string(&json!({
        "browser_type": browser_type,
        "headless": headless,
    }))?;

    let cache_dir = platform::cache_dir();
    std::fs::create_dir_all(&cache_dir)?;

    let mut child = Command::new(node_path)
        .arg(script_path)
        .current_dir(&cache_dir)
        .env("PLAYWRIGHT_BROWSERS_PATH", platform::browsers_dir())
        .env("WEBAUTO_RUNNER_CONFIG", runner_config)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            WebautoError::BrowserLaunchFailed(format!("failed to start sidecar process: {e}"))
        })?;

    let stdout = child.stdout.take().ok_or_else(|| {
        WebautoError::BrowserLaunchFailed("failed to capture sidecar stdout".to_string())
    })?;
    let mut stderr = child.stderr.take();

    let mut lines = BufReader::new(stdout).lines();

    let line = match tokio::time::timeout(HANDSHAKE_TIMEOUT, lines.next_line()).await {
        Err(_) => {
            return Err(launch_failure(child, stderr.take(), "timeout waiting for browser launch response").await);
        }
        Ok(Err(e)) => {
            return Err(launch_failure(
                child,
                stderr.take(),
                &format!("failed to read browser launch response: {e}"),
            )
            .await);
        }
        Ok(Ok(None)) => {
            return Err(launch_failure(
                child,
                stderr.take(),
                "sidecar exited before reporting a launch response",
            )
            .await);
        }
        Ok(Ok(Some(line))) => line,
    };

    let reply: RunnerReply = match serde_json::from_str(line.trim()) {
        Ok(reply) => reply,
        Err(e) => {
            return Err(launch_failure(
                child,
                stderr.take(),
                &format!("failed to parse launch response: {e}"),
            )
            .await);
        }
    };

    if !reply.success {
        let message = format!("browser launch failed: {}", reply.error_message());
        return Err(launch_failure(child, stderr.take(), &message).await);
    }

    let handshake: LaunchHandshake = match serde_json::from_value(reply.data) {
        Ok(hs) => hs,
        Err(e) => {
            return Err(launch_failure(
                child,
                stderr.take(),
                &format!("malformed launch response: {e}"),
            )
            .await);
        }
    };

    if !handshake.is_connected {
        return Err(launch_failure(child, stderr.take(), "browser launched but is not connected").await);
    }
    if handshake.port == 0 {
        return Err(launch_failure(
            child,
            stderr.take(),
            "launch response did not carry a TCP port",
        )
        .await);
    }

    let pid = child.id().ok_or_else(|| {
        WebautoError::BrowserLaunchFailed("sidecar exited immediately after handshake".to_string())
    })?;

    // Keep forwarding sidecar stderr into tracing so crashes are diagnosable.
    if let Some(stderr) = stderr.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::debug!(target: "sidecar", "{line}");
            }
        });
    }

    Ok(LaunchedSidecar {
        pid,
        port: handshake.port,
        version: handshake.version,
        process: ProcessRef::Owned(child),
    })
}

/// Kill a half-launched sidecar and fold whatever it wrote to stderr into
/// the returned error.
async fn launch_failure(
    mut child: Child,
    stderr: Option<ChildStderr>,
    message: &str,
) -> WebautoError {
    let _ = child.kill().await;

    let mut detail = String::new();
    if let Some(mut stderr) = stderr {
        let _ = tokio::time::timeout(
            Duration::from_secs(2),
            stderr.read_to_string(&mut detail),
        )
        .await;
    }

    let detail = detail.trim();
    if detail.is_empty() {
        WebautoError::BrowserLaunchFailed(message.to_string())
    } else {
        WebautoError::BrowserLaunchFailed(format!("{message}, stderr: {detail}"))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    /// Write an executable shell script acting as a fake sidecar runtime.
    fn fake_runtime(dir: &Path, body: &str) -> std::path::PathBuf {
        let path = dir.join("fake-node");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "#!/bin/sh").unwrap();
        f.write_all(body.as_bytes()).unwrap();
        drop(f);
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn spawn_reads_handshake_and_reports_port() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = fake_runtime(
            dir.path(),
            r#"echo '{"success":true,"data":{"browser_type":"chromium","headless":true,"version":"131.0","is_connected":true,"port":45001}}'
sleep 30
"#,
        );

        let sidecar = spawn(&runtime, Path::new("unused.js"), "chromium", true)
            .await
            .expect("handshake should parse");

        assert_eq!(sidecar.port, 45001);
        assert_eq!(sidecar.version, "131.0");
        assert!(sidecar.pid > 0);

        let mut process = sidecar.process;
        process.kill().await.unwrap();
    }

    #[tokio::test]
    async fn failed_handshake_surfaces_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = fake_runtime(
            dir.path(),
            r#"echo 'browserType chromium is not installed' >&2
echo '{"success":false,"error":"launch failed"}'
"#,
        );

        let err = spawn(&runtime, Path::new("unused.js"), "chromium", true)
            .await
            .expect_err("failure handshake must error");

        let msg = err.to_string();
        assert!(msg.contains("launch failed"), "got: {msg}");
        assert!(msg.contains("not installed"), "stderr missing: {msg}");
    }

    #[tokio::test]
    async fn eof_before_handshake_fails() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = fake_runtime(dir.path(), "exit 3\n");

        let err = spawn(&runtime, Path::new("unused.js"), "chromium", true)
            .await
            .expect_err("silent exit must error");
        assert!(matches!(err, WebautoError::BrowserLaunchFailed(_)));
    }

    #[tokio::test]
    async fn handshake_without_port_fails() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = fake_runtime(
            dir.path(),
            r#"echo '{"success":true,"data":{"version":"131.0","is_connected":true}}'
sleep 30
"#,
        );

        let err = spawn(&runtime, Path::new("unused.js"), "chromium", true)
            .await
            .expect_err("missing port must error");
        assert!(err.to_string().contains("TCP port"));
    }

    #[test]
    fn is_pid_alive_detects_own_process() {
        assert!(is_pid_alive(std::process::id()));
    }

    #[test]
    fn kill_pid_rejects_pid_zero() {
        assert!(kill_pid(0).is_err());
    }

    #[tokio::test]
    async fn kill_attached_dead_pid_is_ok() {
        // Spawn a short-lived process, wait for it, then kill by stale pid.
        let mut child = tokio::process::Command::new("true").spawn().unwrap();
        let pid = child.id().unwrap();
        let _ = child.wait().await.unwrap();

        let mut proc_ref = ProcessRef::Attached(pid);
        // ESRCH path: killing an already-dead pid succeeds quietly.
        proc_ref.kill().await.unwrap();
    }
}
