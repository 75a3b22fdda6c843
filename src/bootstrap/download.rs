use std::path::Path;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::AsyncWriteExt;

use crate::error::{Result, WebautoError};

const MAX_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(2);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const USER_AGENT: &str = concat!("webauto/", env!("CARGO_PKG_VERSION"));

/// Download `url` to `dest`, streaming with a byte progress bar on stderr.
///
/// Retries up to 3 total attempts with a 2 second pause; a partial file is
/// removed before every retry and on final failure.
pub async fn download_file(url: &str, dest: &Path, label: &str) -> Result<()> {
    let mut last_err = None;

    for attempt in 1..=MAX_ATTEMPTS {
        if attempt > 1 {
            eprintln!("   ▸ Retry attempt {attempt}/{MAX_ATTEMPTS}...");
            tokio::time::sleep(RETRY_DELAY).await;
        }

        match download_attempt(url, dest, label).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                let _ = tokio::fs::remove_file(dest).await;
                last_err = Some(e);
            }
        }
    }

    let last = last_err
        .map(|e| e.to_string())
        .unwrap_or_else(|| "unknown error".to_string());
    Err(WebautoError::DownloadFailed(format!(
        "failed after {MAX_ATTEMPTS} attempts: {last}"
    )))
}

async fn download_attempt(url: &str, dest: &Path, label: &str) -> Result<()> {
    let client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(CONNECT_TIMEOUT)
        .build()?;

    let mut resp = client.get(url).send().await?;

    if resp.status() != reqwest::StatusCode::OK {
        return Err(WebautoError::DownloadFailed(format!(
            "bad status: {}",
            resp.status()
        )));
    }

    let bar = byte_progress_bar(resp.content_length(), label);

    let mut file = tokio::fs::File::create(dest).await?;
    while let Some(chunk) = resp.chunk().await? {
        file.write_all(&chunk).await?;
        bar.inc(chunk.len() as u64);
    }
    file.flush().await?;
    bar.finish_and_clear();

    Ok(())
}

fn byte_progress_bar(total: Option<u64>, label: &str) -> ProgressBar {
    let bar = match total {
        Some(len) => ProgressBar::new(len),
        None => ProgressBar::new_spinner(),
    };
    bar.set_style(
        ProgressStyle::default_bar()
            .template("   {msg} {bytes}/{total_bytes} [{bar:30}] {bytes_per_sec}")
            .expect("valid progress template")
            .progress_chars("=> "),
    );
    bar.set_message(label.to_string());
    bar
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    /// Serve one canned HTTP response on a random loopback port.
    async fn one_shot_http_server(status_line: &'static str, body: &'static [u8]) -> u16 {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind random port");
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf).await;
                let response = format!(
                    "{status_line}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.write_all(body).await;
            }
        });

        port
    }

    #[tokio::test]
    async fn downloads_body_to_dest() {
        let port = one_shot_http_server("HTTP/1.1 200 OK", b"runtime-archive-bytes").await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("node.tar.gz");

        download_file(&format!("http://127.0.0.1:{port}/node.tar.gz"), &dest, "node")
            .await
            .expect("download should succeed");

        assert_eq!(std::fs::read(&dest).unwrap(), b"runtime-archive-bytes");
    }

    #[tokio::test]
    async fn non_200_fails_and_removes_partial_file() {
        let port = one_shot_http_server("HTTP/1.1 404 Not Found", b"nope").await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("missing.tar.gz");

        let err = download_file(&format!("http://127.0.0.1:{port}/missing"), &dest, "node")
            .await
            .expect_err("404 must fail");

        assert!(matches!(err, WebautoError::DownloadFailed(_)));
        assert!(err.to_string().contains("404"));
        assert!(!dest.exists(), "partial file must be cleaned up");
    }

    #[tokio::test]
    async fn unreachable_host_fails_after_retries() {
        // Nothing listens on this port; connect fails fast on loopback.
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("never.tar.gz");

        let err = download_file("http://127.0.0.1:9/never", &dest, "node")
            .await
            .expect_err("unreachable host must fail");

        assert!(matches!(err, WebautoError::DownloadFailed(_)));
        assert!(err.to_string().contains("3 attempts"));
    }
}
