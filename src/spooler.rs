use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::error::{Result, SpoolError};
use crate::ingest::run_accept_loop;
use crate::monitor::{Monitor, Notification};
use crate::scheduler::deadlock::ResolveReport;
use crate::scheduler::quantum::run_quantum_loop;
use crate::scheduler::state::{SpoolState, StatusSnapshot};

struct ActiveRun {
    local_addr: SocketAddr,
    cancel: CancellationToken,
    accept: JoinHandle<()>,
    quantum: JoinHandle<()>,
}

/// Control surface of the spooler.
///
/// Owns the shared state and the tasks of the current server run. All
/// operations are safe to call from any task; start and stop are idempotent.
pub struct Spooler {
    config: ServerConfig,
    state: Arc<Mutex<SpoolState>>,
    monitor: Monitor,
    run: Mutex<Option<ActiveRun>>,
}

impl Spooler {
    pub fn new(config: ServerConfig) -> Self {
        let monitor = Monitor::new();
        let state = SpoolState::new(&config, monitor.clone());
        Self {
            config,
            state: Arc::new(Mutex::new(state)),
            monitor,
            run: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    /// Shared state, for inspection.
    pub fn state(&self) -> Arc<Mutex<SpoolState>> {
        self.state.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.monitor.subscribe()
    }

    /// Bind the listener and start the accept and quantum tasks. Returns the
    /// bound address; if already running, returns it without doing anything.
    pub async fn start_server(&self) -> Result<SocketAddr> {
        let mut run = self.run.lock().await;
        if let Some(active) = run.as_ref() {
            return Ok(active.local_addr);
        }

        if !self.monitor.has_journal() {
            // Detached; the journal lives for the process lifetime.
            drop(self.monitor.attach_journal(self.config.journal_path()));
        }

        let addr = self.config.listen_addr;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| SpoolError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        self.state.lock().await.reset();

        let cancel = CancellationToken::new();
        let accept = tokio::spawn(run_accept_loop(
            listener,
            self.state.clone(),
            self.monitor.clone(),
            cancel.child_token(),
        ));
        let quantum = tokio::spawn(run_quantum_loop(
            self.state.clone(),
            self.config.quantum,
            cancel.child_token(),
        ));

        tracing::info!(addr = %local_addr, quantum_ms = self.config.quantum.as_millis() as u64, "Spooler started");
        self.monitor
            .log(format!("Server started on {}", local_addr));

        *run = Some(ActiveRun {
            local_addr,
            cancel,
            accept,
            quantum,
        });
        Ok(local_addr)
    }

    /// Stop the current run: close the listener and every connection, clear
    /// the queues, and save the session transcript. Returns the snapshot path,
    /// or `None` if the server was not running.
    pub async fn stop_server(&self) -> Result<Option<PathBuf>> {
        // Held until the run is fully torn down so a concurrent start waits.
        let mut run = self.run.lock().await;
        let Some(active) = run.take() else {
            return Ok(None);
        };

        active.cancel.cancel();
        for (name, handle) in [("accept", active.accept), ("quantum", active.quantum)] {
            if let Err(e) = handle.await {
                tracing::warn!(task = name, error = %e, "Spooler task ended abnormally");
            }
        }

        {
            let mut state = self.state.lock().await;
            for client in state.clients.close_all() {
                let addr = client.addr.to_string();
                self.monitor.client_disconnected(&addr);
                self.monitor.log(format!("Client disconnected: {}", addr));
            }
            let dropped = state.jobs.len();
            state.reset();
            if dropped > 0 {
                self.monitor
                    .log(format!("Discarded {} unfinished requests", dropped));
            }
        }

        tracing::info!(addr = %active.local_addr, "Spooler stopped");
        self.monitor.log("Server stopped");

        match self.monitor.save_snapshot(&self.config.logs_dir).await {
            Ok(path) => Ok(Some(path)),
            Err(e) => {
                self.monitor
                    .warn(format!("Failed to save session log: {}", e));
                Err(SpoolError::Io(e))
            }
        }
    }

    pub async fn is_running(&self) -> bool {
        self.run.lock().await.is_some()
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.run.lock().await.as_ref().map(|r| r.local_addr)
    }

    /// Open the threshold gate of the quantum scheduler.
    pub async fn begin_processing(&self) {
        self.state.lock().await.begin_processing();
    }

    pub async fn force_resolve_deadlock(&self) -> ResolveReport {
        self.state.lock().await.force_resolve_deadlock()
    }

    pub async fn status(&self) -> StatusSnapshot {
        let running = self.is_running().await;
        self.state.lock().await.snapshot(running)
    }
}
