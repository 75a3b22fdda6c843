use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::bootstrap::{self, platform};
use crate::config::Config;
use crate::error::{Result, WebautoError};
use crate::ipc::RunnerReply;
use crate::session::descriptor::{DescriptorStore, SessionDescriptor};
use crate::session::launcher::{self, ProcessRef};
use crate::session::runner;
use crate::session::worker::SessionWorker;

/// Cadence of the background descriptor flush and expiry sweep.
const BACKGROUND_INTERVAL: Duration = Duration::from_secs(30);

struct ManagedSession {
    descriptor: SessionDescriptor,
    worker: Option<Arc<SessionWorker>>,
    process: Option<ProcessRef>,
}

/// Owner of every live session: maps ids to descriptors, workers and
/// process handles, backed by the on-disk descriptor store.
///
/// Constructed once in the entry point and passed to command adapters; the
/// background flush task belongs to that instance.
pub struct SessionManager {
    config: Config,
    store: DescriptorStore,
    sessions: RwLock<HashMap<String, ManagedSession>>,
}

impl SessionManager {
    pub fn new(config: Config) -> Self {
        Self::with_store(config, DescriptorStore::new(platform::sessions_dir()))
    }

    pub fn with_store(config: Config, store: DescriptorStore) -> Self {
        Self {
            config,
            store,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Start the 30-second flush-and-expire task. Runs for the lifetime of
    /// the process; short-lived CLI invocations simply never reach a tick.
    pub fn spawn_background_tasks(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(BACKGROUND_INTERVAL);
            ticker.tick().await; // the first tick fires immediately
            loop {
                ticker.tick().await;
                manager.flush_to_disk().await;
                manager.cleanup_expired().await;
            }
        });
    }

    /// Launch a new sidecar-backed browser session.
    ///
    /// Rollback order mirrors setup order: a failed persist kills the
    /// sidecar; a failed worker dial kills the sidecar and removes the
    /// descriptor.
    pub async fn create(
        &self,
        browser_type: &str,
        headless: bool,
        requested_id: Option<&str>,
    ) -> Result<SessionDescriptor> {
        let mut sessions = self.sessions.write().await;

        if sessions.len() >= self.config.session_max_count {
            return Err(WebautoError::SessionLimitReached(
                self.config.session_max_count,
            ));
        }

        let id = match requested_id.map(str::trim).filter(|s| !s.is_empty()) {
            Some(id) => {
                if sessions.contains_key(id) || self.store.descriptor_file(id).exists() {
                    return Err(WebautoError::BrowserLaunchFailed(format!(
                        "session id already in use: {id}"
                    )));
                }
                id.to_string()
            }
            None => generate_session_id(),
        };

        let node_path = bootstrap::ensure_runtime(&self.config).await?;
        let script_path = runner::ensure_runner_script().await?;

        let sidecar = launcher::spawn(&node_path, script_path, browser_type, headless).await?;
        let mut process = sidecar.process;

        let now = Utc::now();
        let descriptor = SessionDescriptor {
            id: id.clone(),
            browser_type: browser_type.to_string(),
            headless,
            pid: sidecar.pid,
            port: sidecar.port,
            created_at: now,
            last_used_at: now,
        };

        if let Err(e) = self.store.save(&descriptor) {
            let _ = process.kill().await;
            return Err(e);
        }

        let worker = match SessionWorker::connect(sidecar.port).await {
            Ok(worker) => worker,
            Err(e) => {
                let _ = process.kill().await;
                if let Err(del) = self.store.delete(&id) {
                    tracing::warn!("failed to delete session file for {id}: {del}");
                }
                return Err(e);
            }
        };

        sessions.insert(
            id,
            ManagedSession {
                descriptor: descriptor.clone(),
                worker: Some(Arc::new(worker)),
                process: Some(process),
            },
        );

        Ok(descriptor)
    }

    /// Send a command envelope to a session, attaching a worker on demand.
    pub async fn send_command(
        &self,
        id: &str,
        payload: Value,
        deadline: Option<Duration>,
    ) -> Result<RunnerReply> {
        let worker = self.get_or_attach(id).await?;

        match worker.send(payload, deadline).await {
            Ok(reply) => {
                let mut sessions = self.sessions.write().await;
                if let Some(managed) = sessions.get_mut(id) {
                    managed.descriptor.last_used_at = Utc::now();
                }
                Ok(reply)
            }
            Err(e) => {
                // A worker that failed its connection is dropped from the
                // entry so the next call dials a fresh one.
                if worker.is_closed() {
                    let mut sessions = self.sessions.write().await;
                    if let Some(managed) = sessions.get_mut(id) {
                        if managed
                            .worker
                            .as_ref()
                            .is_some_and(|w| Arc::ptr_eq(w, &worker))
                        {
                            managed.worker = None;
                        }
                    }
                }
                Err(e)
            }
        }
    }

    /// Fast path: a live worker under the read lock. Slow path: load the
    /// descriptor from disk if needed and dial a fresh worker.
    async fn get_or_attach(&self, id: &str) -> Result<Arc<SessionWorker>> {
        {
            let sessions = self.sessions.read().await;
            if let Some(managed) = sessions.get(id) {
                if let Some(worker) = &managed.worker {
                    if !worker.is_closed() {
                        return Ok(Arc::clone(worker));
                    }
                }
            }
        }

        let mut sessions = self.sessions.write().await;

        if !sessions.contains_key(id) {
            let descriptor = self.store.load(id)?;
            sessions.insert(
                id.to_string(),
                ManagedSession {
                    descriptor,
                    worker: None,
                    process: None,
                },
            );
        }

        // Unwrap-free: the entry was either present or inserted above.
        let Some(managed) = sessions.get_mut(id) else {
            return Err(WebautoError::SessionNotFound(id.to_string()));
        };

        if let Some(worker) = &managed.worker {
            if !worker.is_closed() {
                return Ok(Arc::clone(worker));
            }
        }

        let pid = managed.descriptor.pid;
        let port = managed.descriptor.port;

        match SessionWorker::connect(port).await {
            Ok(worker) => {
                let worker = Arc::new(worker);
                managed.worker = Some(Arc::clone(&worker));
                if managed.process.is_none() {
                    managed.process = Some(ProcessRef::Attached(pid));
                }
                Ok(worker)
            }
            Err(dial_err) => {
                if !launcher::is_pid_alive(pid) {
                    // Orphaned descriptor: the sidecar died with a previous
                    // host. Remove the record and report the session gone.
                    sessions.remove(id);
                    if let Err(e) = self.store.delete(id) {
                        tracing::warn!("failed to delete stale session file for {id}: {e}");
                    }
                    return Err(WebautoError::SessionNotFound(id.to_string()));
                }
                Err(dial_err)
            }
        }
    }

    /// Close a session: worker torn down, sidecar killed, descriptor file
    /// removed. Kill and delete failures are warnings, not errors.
    pub async fn close(&self, id: &str) -> Result<()> {
        let managed = { self.sessions.write().await.remove(id) };

        let (descriptor, worker, process) = match managed {
            Some(managed) => (managed.descriptor, managed.worker, managed.process),
            None => {
                let descriptor = self.store.load(id)?;
                (descriptor, None, None)
            }
        };

        if let Some(worker) = worker {
            worker.close().await;
        }

        let mut process = process.unwrap_or(ProcessRef::Attached(descriptor.pid));
        if let Err(e) = process.kill().await {
            tracing::warn!("failed to kill sidecar for {id}: {e}");
        }

        if let Err(e) = self.store.delete(id) {
            tracing::warn!("failed to delete session file for {id}: {e}");
        }

        Ok(())
    }

    /// Sessions currently held in memory.
    pub async fn list(&self) -> Vec<SessionDescriptor> {
        let sessions = self.sessions.read().await;
        sessions.values().map(|m| m.descriptor.clone()).collect()
    }

    /// Union of in-memory sessions and on-disk descriptors; memory wins on
    /// id collisions, undecodable files are skipped by the store scan.
    pub async fn list_all(&self) -> Vec<SessionDescriptor> {
        let sessions = self.sessions.read().await;
        let mut by_id: HashMap<String, SessionDescriptor> = sessions
            .iter()
            .map(|(id, m)| (id.clone(), m.descriptor.clone()))
            .collect();

        for descriptor in self.store.scan() {
            by_id.entry(descriptor.id.clone()).or_insert(descriptor);
        }

        by_id.into_values().collect()
    }

    /// Tear down every session idle longer than the configured timeout.
    /// Returns how many were reaped.
    pub async fn cleanup_expired(&self) -> usize {
        let timeout = chrono::Duration::seconds(self.config.session_timeout_seconds as i64);
        let now = Utc::now();

        let mut sessions = self.sessions.write().await;
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, m)| now - m.descriptor.last_used_at > timeout)
            .map(|(id, _)| id.clone())
            .collect();

        let mut cleaned = 0;
        for id in expired {
            let Some(managed) = sessions.remove(&id) else {
                continue;
            };

            if let Some(worker) = managed.worker {
                worker.close().await;
            }

            let mut process = managed
                .process
                .unwrap_or(ProcessRef::Attached(managed.descriptor.pid));
            if let Err(e) = process.kill().await {
                tracing::warn!("failed to kill expired sidecar for {id}: {e}");
            }

            if let Err(e) = self.store.delete(&id) {
                tracing::warn!("failed to delete session file for {id}: {e}");
            }

            cleaned += 1;
        }

        cleaned
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Persist every in-memory descriptor, flushing `last_used_at`.
    async fn flush_to_disk(&self) {
        let sessions = self.sessions.read().await;
        for managed in sessions.values() {
            if let Err(e) = self.store.save(&managed.descriptor) {
                tracing::warn!(
                    "failed to flush session {}: {e}",
                    managed.descriptor.id
                );
            }
        }
    }
}

/// `ses_` plus the first 8 hex characters of a v4 uuid.
fn generate_session_id() -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    format!("ses_{}", &uuid[..8])
}
