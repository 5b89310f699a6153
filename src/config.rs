use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Fixed capacities of the two resource pools.
///
/// Capacities are read once when the pool is built and never change while a
/// server run is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceConfig {
    /// Units of paper available to jobs
    pub paper: u32,
    /// Units of printer available to jobs
    pub printer: u32,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            paper: 2,
            printer: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    /// Period of one scheduling quantum
    pub quantum: Duration,
    pub resources: ResourceConfig,
    /// Number of jobs that must have been admitted before the scheduler acts
    pub admission_threshold: u64,
    /// Minimum admission queue length before a stall can be declared
    pub deadlock_min_jobs: usize,
    /// Directory holding the session journal and stop snapshots
    pub logs_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            // SAFETY: This is a hardcoded valid address that will always parse
            listen_addr: "127.0.0.1:5000"
                .parse()
                .expect("default listen address is valid"),
            quantum: Duration::from_millis(500),
            resources: ResourceConfig::default(),
            admission_threshold: 3,
            deadlock_min_jobs: 3,
            logs_dir: PathBuf::from("logs"),
        }
    }
}

impl ServerConfig {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            ..Default::default()
        }
    }

    pub fn with_quantum(mut self, quantum: Duration) -> Self {
        self.quantum = quantum;
        self
    }

    pub fn with_logs_dir(mut self, logs_dir: impl Into<PathBuf>) -> Self {
        self.logs_dir = logs_dir.into();
        self
    }

    /// Path of the append-only journal written for the process lifetime.
    pub fn journal_path(&self) -> PathBuf {
        self.logs_dir.join("spooler.log")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_config_default() {
        let cfg = ResourceConfig::default();
        assert_eq!(cfg.paper, 2);
        assert_eq!(cfg.printer, 1);
    }

    #[test]
    fn server_config_default() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.listen_addr.to_string(), "127.0.0.1:5000");
        assert_eq!(cfg.quantum, Duration::from_millis(500));
        assert_eq!(cfg.admission_threshold, 3);
        assert_eq!(cfg.deadlock_min_jobs, 3);
        assert_eq!(cfg.logs_dir, PathBuf::from("logs"));
    }

    #[test]
    fn server_config_builders() {
        let addr: SocketAddr = "10.0.0.1:9000".parse().unwrap();
        let cfg = ServerConfig::new(addr)
            .with_quantum(Duration::from_millis(20))
            .with_logs_dir("/tmp/spool");
        assert_eq!(cfg.listen_addr, addr);
        assert_eq!(cfg.quantum, Duration::from_millis(20));
        assert_eq!(cfg.journal_path(), PathBuf::from("/tmp/spool/spooler.log"));
    }
}
