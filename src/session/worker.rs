use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{timeout, timeout_at, Instant};

use crate::error::{Result, WebautoError};
use crate::ipc::RunnerReply;

const DIAL_TIMEOUT: Duration = Duration::from_secs(5);
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);
const READ_TIMEOUT: Duration = Duration::from_secs(30);

struct CommandRequest {
    payload: Value,
    deadline: Option<Instant>,
    reply: oneshot::Sender<Result<RunnerReply>>,
}

/// Host-side serializer owning the TCP connection to one sidecar.
///
/// At most one command is in flight at a time: concurrent `send` callers
/// queue in arrival order, and the sidecar's per-socket FIFO guarantees
/// reply order matches request order, so no correlation ids are needed.
///
/// A caller that hits its deadline abandons its reply; the loop still reads
/// the pending line (under the default read deadline) and discards it so
/// the stream stays aligned. Only a failed read, write or parse closes the
/// worker; the registry reattaches on demand.
#[derive(Debug)]
pub struct SessionWorker {
    requests: mpsc::Sender<CommandRequest>,
    stop: watch::Sender<bool>,
    done: watch::Receiver<bool>,
    closed: Arc<AtomicBool>,
}

impl SessionWorker {
    /// Dial the sidecar's loopback port and start the worker loop.
    pub async fn connect(port: u16) -> Result<Self> {
        let stream = timeout(DIAL_TIMEOUT, TcpStream::connect(("127.0.0.1", port)))
            .await
            .map_err(|_| {
                WebautoError::BrowserConnectionLost(format!(
                    "timed out dialing session worker at 127.0.0.1:{port}"
                ))
            })?
            .map_err(|e| {
                WebautoError::BrowserConnectionLost(format!(
                    "failed to dial session worker at 127.0.0.1:{port}: {e}"
                ))
            })?;

        let (read_half, write_half) = stream.into_split();
        let (requests_tx, requests_rx) = mpsc::channel(1);
        let (stop_tx, stop_rx) = watch::channel(false);
        let (done_tx, done_rx) = watch::channel(false);
        let closed = Arc::new(AtomicBool::new(false));

        tokio::spawn(run_loop(
            read_half,
            write_half,
            requests_rx,
            stop_rx,
            Arc::clone(&closed),
            done_tx,
        ));

        Ok(Self {
            requests: requests_tx,
            stop: stop_tx,
            done: done_rx,
            closed,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Queue a command and wait for its reply.
    ///
    /// `deadline` bounds the caller's wait (enqueue included); `None` means
    /// wait for the loop's own IO deadlines to resolve the command.
    pub async fn send(&self, payload: Value, deadline: Option<Duration>) -> Result<RunnerReply> {
        if self.is_closed() {
            return Err(WebautoError::SessionClosed);
        }

        let deadline = deadline.map(|d| Instant::now() + d);
        let (reply_tx, reply_rx) = oneshot::channel();
        let request = CommandRequest {
            payload,
            deadline,
            reply: reply_tx,
        };

        match deadline {
            Some(at) => match timeout_at(at, self.requests.send(request)).await {
                Err(_) => {
                    return Err(WebautoError::TimeoutExceeded(
                        "command deadline exceeded while queueing".to_string(),
                    ))
                }
                Ok(Err(_)) => return Err(WebautoError::SessionClosed),
                Ok(Ok(())) => {}
            },
            None => {
                if self.requests.send(request).await.is_err() {
                    return Err(WebautoError::SessionClosed);
                }
            }
        }

        let wait_reply = async {
            match reply_rx.await {
                Ok(result) => result,
                Err(_) => Err(WebautoError::SessionClosed),
            }
        };

        match deadline {
            Some(at) => match timeout_at(at, wait_reply).await {
                Err(_) => Err(WebautoError::TimeoutExceeded(
                    "command deadline exceeded".to_string(),
                )),
                Ok(result) => result,
            },
            None => wait_reply.await,
        }
    }

    /// Idempotent: closes the connection, stops the loop and waits for it
    /// to drain. An in-flight command is answered with `SessionClosed`.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let _ = self.stop.send(true);
        let mut done = self.done.clone();
        let _ = done.wait_for(|finished| *finished).await;
    }
}

async fn run_loop(
    read_half: OwnedReadHalf,
    mut write_half: OwnedWriteHalf,
    mut requests: mpsc::Receiver<CommandRequest>,
    mut stop: watch::Receiver<bool>,
    closed: Arc<AtomicBool>,
    done: watch::Sender<bool>,
) {
    let mut reader = BufReader::new(read_half);

    loop {
        let request = tokio::select! {
            _ = stop.changed() => break,
            request = requests.recv() => match request {
                Some(request) => request,
                None => break,
            },
        };

        if closed.load(Ordering::SeqCst) {
            let _ = request.reply.send(Err(WebautoError::SessionClosed));
            continue;
        }

        let keep_going =
            process_request(&mut reader, &mut write_half, &mut stop, &closed, request).await;
        if !keep_going {
            break;
        }
    }

    closed.store(true, Ordering::SeqCst);

    // Answer anything still queued so no caller hangs.
    requests.close();
    while let Ok(request) = requests.try_recv() {
        let _ = request.reply.send(Err(WebautoError::SessionClosed));
    }

    let _ = done.send(true);
}

/// Handle one request: write the line, read one reply line, deliver.
/// Returns false when the worker must shut down.
async fn process_request(
    reader: &mut BufReader<OwnedReadHalf>,
    writer: &mut OwnedWriteHalf,
    stop: &mut watch::Receiver<bool>,
    closed: &AtomicBool,
    request: CommandRequest,
) -> bool {
    let now = Instant::now();

    if let Some(deadline) = request.deadline {
        if now >= deadline {
            let _ = request.reply.send(Err(WebautoError::TimeoutExceeded(
                "command deadline exceeded before dispatch".to_string(),
            )));
            return true;
        }
    }

    let mut line = match serde_json::to_vec(&request.payload) {
        Ok(line) => line,
        Err(e) => {
            // Serialization failures are the caller's problem, not the
            // connection's: deliver and keep the worker alive.
            let _ = request.reply.send(Err(e.into()));
            return true;
        }
    };
    line.push(b'\n');

    let mut write_deadline = now + WRITE_TIMEOUT;
    if let Some(deadline) = request.deadline {
        write_deadline = write_deadline.min(deadline);
    }

    let write_result = tokio::select! {
        _ = stop.changed() => {
            let _ = request.reply.send(Err(WebautoError::SessionClosed));
            return false;
        }
        result = timeout_at(write_deadline, writer.write_all(&line)) => result,
    };

    match write_result {
        Err(_) => {
            closed.store(true, Ordering::SeqCst);
            let _ = request.reply.send(Err(WebautoError::BrowserConnectionLost(
                "timed out sending command".to_string(),
            )));
            return false;
        }
        Ok(Err(e)) => {
            closed.store(true, Ordering::SeqCst);
            let _ = request.reply.send(Err(WebautoError::BrowserConnectionLost(format!(
                "failed to send command: {e}"
            ))));
            return false;
        }
        Ok(Ok(())) => {}
    }

    // The read deadline is always the default, never the caller's: if the
    // caller gives up early its oneshot is simply gone by delivery time and
    // the reply is discarded, keeping one reply per request on the stream.
    let read_deadline = now + READ_TIMEOUT;
    let mut buf = String::new();

    let read_result = tokio::select! {
        _ = stop.changed() => {
            let _ = request.reply.send(Err(WebautoError::SessionClosed));
            return false;
        }
        result = timeout_at(read_deadline, reader.read_line(&mut buf)) => result,
    };

    let failure = match read_result {
        Err(_) => Some("timed out waiting for response".to_string()),
        Ok(Err(e)) => Some(format!("failed to read response: {e}")),
        Ok(Ok(0)) => Some("connection closed by sidecar".to_string()),
        Ok(Ok(_)) => None,
    };
    if let Some(message) = failure {
        closed.store(true, Ordering::SeqCst);
        let _ = request
            .reply
            .send(Err(WebautoError::BrowserConnectionLost(message)));
        return false;
    }

    let trimmed = buf.trim();
    if trimmed.is_empty() {
        closed.store(true, Ordering::SeqCst);
        let _ = request.reply.send(Err(WebautoError::BrowserConnectionLost(
            "received empty response".to_string(),
        )));
        return false;
    }

    match serde_json::from_str::<RunnerReply>(trimmed) {
        Ok(reply) => {
            let _ = request.reply.send(Ok(reply));
            true
        }
        Err(e) => {
            // A reply that fails to parse means the stream can no longer be
            // trusted to stay aligned; tear the worker down.
            closed.store(true, Ordering::SeqCst);
            let _ = request.reply.send(Err(WebautoError::BrowserConnectionLost(
                format!("failed to parse response: {e}"),
            )));
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::AsyncWriteExt as _;
    use tokio::net::TcpListener;

    /// A fake sidecar: accepts one connection, then for every received line
    /// sleeps `delay_ms` (if the request carries one) and echoes
    /// `{"success":true,"data":{"i":<i>,"seq":<n>}}` with a server-side
    /// monotone counter.
    async fn fake_sidecar() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut lines = BufReader::new(read_half).lines();
            let mut seq = 0u64;

            while let Ok(Some(line)) = lines.next_line().await {
                let request: Value = serde_json::from_str(&line).unwrap_or(Value::Null);
                if let Some(delay) = request.get("delay_ms").and_then(Value::as_u64) {
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                seq += 1;
                let reply = json!({
                    "success": true,
                    "data": { "i": request.get("i").cloned().unwrap_or(Value::Null), "seq": seq },
                });
                let mut out = reply.to_string().into_bytes();
                out.push(b'\n');
                if write_half.write_all(&out).await.is_err() {
                    break;
                }
            }
        });

        port
    }

    #[tokio::test]
    async fn send_roundtrips_a_command() {
        let port = fake_sidecar().await;
        let worker = SessionWorker::connect(port).await.unwrap();

        let reply = worker.send(json!({"command": "ping", "i": 1}), None).await.unwrap();
        assert!(reply.success);
        assert_eq!(reply.data["i"], json!(1));

        worker.close().await;
    }

    #[tokio::test]
    async fn concurrent_sends_preserve_fifo_order() {
        let port = fake_sidecar().await;
        let worker = Arc::new(SessionWorker::connect(port).await.unwrap());

        let mut handles = Vec::new();
        for i in 1..=8u64 {
            let worker = Arc::clone(&worker);
            handles.push(tokio::spawn(async move {
                // The per-request delay keeps several callers queued at once.
                let reply = worker
                    .send(json!({"command": "echo", "i": i, "delay_ms": 30}), None)
                    .await
                    .unwrap();
                (i, reply)
            }));
            // Stagger the submissions so arrival order is deterministic.
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        for handle in handles {
            let (i, reply) = handle.await.unwrap();
            // Alignment: each caller got the reply to its own request, and
            // the server-side sequence matches the submission order.
            assert_eq!(reply.data["i"], json!(i));
            assert_eq!(reply.data["seq"], json!(i));
        }

        worker.close().await;
    }

    #[tokio::test]
    async fn deadline_returns_early_and_stream_stays_aligned() {
        let port = fake_sidecar().await;
        let worker = Arc::new(SessionWorker::connect(port).await.unwrap());

        // First command makes the sidecar sleep well past the caller deadline.
        let start = Instant::now();
        let err = worker
            .send(
                json!({"command": "slow", "i": 1, "delay_ms": 500}),
                Some(Duration::from_millis(100)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WebautoError::TimeoutExceeded(_)));
        assert!(
            start.elapsed() < Duration::from_millis(250),
            "caller must return at its deadline, not the sidecar's pace"
        );
        assert!(!worker.is_closed(), "cancellation must not kill the worker");

        // The discarded reply keeps the stream aligned: the next command
        // gets its own reply, not the stale one.
        let reply = worker
            .send(json!({"command": "ping", "i": 2}), Some(Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(reply.data["i"], json!(2));
        assert_eq!(reply.data["seq"], json!(2));

        worker.close().await;
    }

    #[tokio::test]
    async fn peer_disconnect_closes_worker() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            // Accept and immediately drop the connection.
            let _ = listener.accept().await;
        });

        let worker = SessionWorker::connect(port).await.unwrap();
        let err = worker
            .send(json!({"command": "ping"}), Some(Duration::from_secs(5)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WebautoError::BrowserConnectionLost(_) | WebautoError::SessionClosed
        ));
        assert!(worker.is_closed());

        // Subsequent sends short-circuit.
        let err = worker.send(json!({"command": "ping"}), None).await.unwrap_err();
        assert!(matches!(err, WebautoError::SessionClosed));
    }

    #[tokio::test]
    async fn garbage_reply_closes_worker() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut lines = BufReader::new(read_half).lines();
            if let Ok(Some(_)) = lines.next_line().await {
                let _ = write_half.write_all(b"this is not json\n").await;
            }
        });

        let worker = SessionWorker::connect(port).await.unwrap();
        let err = worker
            .send(json!({"command": "ping"}), Some(Duration::from_secs(5)))
            .await
            .unwrap_err();
        assert!(matches!(err, WebautoError::BrowserConnectionLost(_)));
        assert!(worker.is_closed());
    }

    #[tokio::test]
    async fn close_is_idempotent_and_aborts_in_flight() {
        // Sidecar that reads but never replies.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, _write_half) = stream.into_split();
            let mut lines = BufReader::new(read_half).lines();
            while let Ok(Some(_)) = lines.next_line().await {}
        });

        let worker = Arc::new(SessionWorker::connect(port).await.unwrap());

        let in_flight = {
            let worker = Arc::clone(&worker);
            tokio::spawn(async move { worker.send(json!({"command": "ping"}), None).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        worker.close().await;
        worker.close().await; // second close is a no-op

        let result = in_flight.await.unwrap();
        assert!(matches!(result, Err(WebautoError::SessionClosed)));
        assert!(worker.is_closed());
    }

    #[tokio::test]
    async fn connect_to_dead_port_fails() {
        // Bind then drop to get a port with no listener.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = SessionWorker::connect(port).await.unwrap_err();
        assert!(matches!(err, WebautoError::BrowserConnectionLost(_)));
    }
}
