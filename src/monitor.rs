//! One-way notifications for whatever is watching the spooler.
//!
//! The core never waits on a watcher: notifications go out on a
//! [`tokio::sync::broadcast`] channel, and lagging subscribers lose the oldest
//! events rather than slowing the scheduler down. Every log line is also
//! kept in an in-memory transcript (written out on stop) and, once a journal
//! is attached, appended to the session journal by a background task.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::scheduler::job::{ClientId, Job, JobStatus};

const EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    ClientConnected {
        addr: String,
    },
    ClientDisconnected {
        addr: String,
    },
    Log {
        at: DateTime<Utc>,
        message: String,
    },
    JobStatus {
        queue_number: u64,
        client: ClientId,
        client_addr: String,
        status: JobStatus,
    },
    SessionLogSaved {
        path: PathBuf,
    },
}

#[derive(Clone)]
pub struct Monitor {
    events: broadcast::Sender<Notification>,
    transcript: Arc<Mutex<Vec<String>>>,
    journal: Arc<Mutex<Option<mpsc::UnboundedSender<String>>>>,
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("subscribers", &self.events.receiver_count())
            .finish()
    }
}

impl Monitor {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            events,
            transcript: Arc::new(Mutex::new(Vec::new())),
            journal: Arc::new(Mutex::new(None)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.events.subscribe()
    }

    fn emit(&self, notification: Notification) {
        // No subscribers is fine.
        let _ = self.events.send(notification);
    }

    fn record(&self, message: String) {
        let at = Utc::now();
        let line = format!("{} - {}", at.with_timezone(&Local).format("%H:%M:%S"), message);

        self.transcript
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(line.clone());

        let journal = self.journal.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(tx) = journal.as_ref() {
            let _ = tx.send(format!(
                "{} - {}",
                at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
                message
            ));
        }
        drop(journal);

        self.emit(Notification::Log { at, message });
    }

    /// Record an informational log line.
    pub fn log(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(target: "spool_lite::monitor", "{}", message);
        self.record(message);
    }

    /// Record a log line about something that went wrong.
    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(target: "spool_lite::monitor", "{}", message);
        self.record(message);
    }

    pub fn job_status(&self, job: &Job) {
        self.emit(Notification::JobStatus {
            queue_number: job.queue_number,
            client: job.client,
            client_addr: job.client_addr.clone(),
            status: job.status,
        });
    }

    pub fn client_connected(&self, addr: &str) {
        self.emit(Notification::ClientConnected {
            addr: addr.to_string(),
        });
    }

    pub fn client_disconnected(&self, addr: &str) {
        self.emit(Notification::ClientDisconnected {
            addr: addr.to_string(),
        });
    }

    pub fn transcript(&self) -> Vec<String> {
        self.transcript
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn has_journal(&self) -> bool {
        self.journal
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Start appending every log line to `path`. Lines logged before this call
    /// are not replayed. Calling it again replaces the previous journal.
    pub fn attach_journal(&self, path: PathBuf) -> JoinHandle<()> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.journal.lock().unwrap_or_else(|e| e.into_inner()) = Some(tx);
        tokio::spawn(run_journal_writer(path, rx))
    }

    /// Write the transcript to `log_<timestamp>.log` under `dir`.
    pub async fn save_snapshot(&self, dir: &Path) -> std::io::Result<PathBuf> {
        tokio::fs::create_dir_all(dir).await?;
        let name = format!("log_{}.log", Local::now().format("%Y%m%d_%H%M%S"));
        let path = dir.join(name);

        let mut body = self.transcript().join("\n");
        body.push('\n');
        tokio::fs::write(&path, body).await?;

        self.log(format!("Session log saved to {}", path.display()));
        self.emit(Notification::SessionLogSaved { path: path.clone() });
        Ok(path)
    }
}

async fn run_journal_writer(path: PathBuf, mut rx: mpsc::UnboundedReceiver<String>) {
    if let Some(parent) = path.parent() {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            tracing::error!(path = %path.display(), error = %e, "Failed to create journal directory");
            return;
        }
    }

    let mut file = match tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await
    {
        Ok(file) => file,
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Failed to open session journal");
            return;
        }
    };

    while let Some(line) = rx.recv().await {
        let mut entry = line.into_bytes();
        entry.push(b'\n');
        if let Err(e) = file.write_all(&entry).await {
            tracing::error!(path = %path.display(), error = %e, "Failed to append to session journal");
            return;
        }
        let _ = file.flush().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_reaches_subscribers_and_transcript() {
        let monitor = Monitor::new();
        let mut rx = monitor.subscribe();

        monitor.log("hello");

        match rx.recv().await.unwrap() {
            Notification::Log { message, .. } => assert_eq!(message, "hello"),
            other => panic!("unexpected notification: {:?}", other),
        }
        let transcript = monitor.transcript();
        assert_eq!(transcript.len(), 1);
        assert!(transcript[0].ends_with(" - hello"));
    }

    #[tokio::test]
    async fn logging_without_subscribers_does_not_fail() {
        let monitor = Monitor::new();
        monitor.warn("nobody listening");
        assert_eq!(monitor.transcript().len(), 1);
    }

    #[tokio::test]
    async fn snapshot_writes_transcript() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = Monitor::new();
        let mut rx = monitor.subscribe();
        monitor.log("first");
        monitor.log("second");

        let path = monitor.save_snapshot(dir.path()).await.unwrap();
        let body = std::fs::read_to_string(&path).unwrap();
        assert!(body.contains("first"));
        assert!(body.contains("second"));
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("log_"));

        let mut saw_saved = false;
        while let Ok(event) = rx.try_recv() {
            if let Notification::SessionLogSaved { path: saved } = event {
                assert_eq!(saved, path);
                saw_saved = true;
            }
        }
        assert!(saw_saved);
    }

    #[tokio::test]
    async fn journal_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("spooler.log");
        let monitor = Monitor::new();
        let handle = monitor.attach_journal(path.clone());
        assert!(monitor.has_journal());

        monitor.log("journaled");

        let mut body = String::new();
        for _ in 0..50 {
            body = tokio::fs::read_to_string(&path).await.unwrap_or_default();
            if body.contains("journaled") {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(body.contains("journaled"));
        handle.abort();
    }
}
