use std::fs;
use std::path::{Path, PathBuf};

use tokio::sync::OnceCell;

use crate::bootstrap::platform;
use crate::error::Result;

/// The sidecar runner script ships embedded in the host binary; the wire
/// protocol is the contract, the script is replaceable.
const RUNNER_SOURCE: &str = include_str!("runner/session-server.js");

const RUNNER_FILE_NAME: &str = "session-server.js";

static RUNNER_PATH: OnceCell<PathBuf> = OnceCell::const_new();

/// Materialize the embedded runner script into the cache, once per process.
pub async fn ensure_runner_script() -> Result<&'static Path> {
    let path = RUNNER_PATH
        .get_or_try_init(|| async { materialize_runner_script(&platform::runner_dir()) })
        .await?;
    Ok(path.as_path())
}

/// Write the runner script to `runner_dir` unless an identical copy is
/// already on disk. Content-identical overwrites are idempotent, so
/// concurrent host processes converge on the same file.
pub fn materialize_runner_script(runner_dir: &Path) -> Result<PathBuf> {
    let target = runner_dir.join(RUNNER_FILE_NAME);

    if let Ok(existing) = fs::read_to_string(&target) {
        if existing == RUNNER_SOURCE {
            return Ok(target);
        }
    }

    fs::create_dir_all(runner_dir)?;
    fs::write(&target, RUNNER_SOURCE)?;
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn materializes_script_into_runner_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = materialize_runner_script(dir.path()).unwrap();

        assert!(path.ends_with(RUNNER_FILE_NAME));
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, RUNNER_SOURCE);
        assert!(content.contains("WEBAUTO_RUNNER_CONFIG"));
    }

    #[test]
    fn identical_content_is_left_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = materialize_runner_script(dir.path()).unwrap();

        let mtime_before = fs::metadata(&path).unwrap().modified().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        materialize_runner_script(dir.path()).unwrap();
        let mtime_after = fs::metadata(&path).unwrap().modified().unwrap();

        assert_eq!(mtime_before, mtime_after);
    }

    #[test]
    fn stale_script_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join(RUNNER_FILE_NAME);
        fs::write(&target, "console.log('old runner')").unwrap();

        materialize_runner_script(dir.path()).unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), RUNNER_SOURCE);
    }
}
