use serde::Serialize;

use crate::clients::{ClientInfo, ClientRegistry};
use crate::config::{ResourceConfig, ServerConfig};
use crate::monitor::Monitor;
use crate::scheduler::deadlock::{self, ResolveReport};
use crate::scheduler::job::{ClientId, Job, JobStatus, Submission};
use crate::scheduler::queue::{JobTable, QueueKind};
use crate::scheduler::resources::ResourcePool;

/// Everything guarded by the spooler lock: the job table, the resource pool,
/// the client registry and the scheduling counters.
#[derive(Debug)]
pub struct SpoolState {
    pub jobs: JobTable,
    pub pool: ResourcePool,
    pub clients: ClientRegistry,
    pub monitor: Monitor,
    pub(crate) quantum: u64,
    pub(crate) admitted_total: u64,
    pub(crate) processing: bool,
    capacity: ResourceConfig,
    pub(crate) admission_threshold: u64,
    pub(crate) deadlock_min_jobs: usize,
}

impl SpoolState {
    pub fn new(config: &ServerConfig, monitor: Monitor) -> Self {
        Self {
            jobs: JobTable::new(),
            pool: ResourcePool::new(config.resources),
            clients: ClientRegistry::new(),
            monitor,
            quantum: 0,
            admitted_total: 0,
            processing: false,
            capacity: config.resources,
            admission_threshold: config.admission_threshold,
            deadlock_min_jobs: config.deadlock_min_jobs,
        }
    }

    /// Forget every job and refill the pool. Queue numbering restarts.
    pub fn reset(&mut self) {
        self.jobs.clear();
        self.pool = ResourcePool::new(self.capacity);
        self.quantum = 0;
        self.admitted_total = 0;
        self.processing = false;
    }

    /// Create a job for `submission` and append it to the admission queue.
    /// Returns the queue number assigned to it.
    pub fn admit(&mut self, client: ClientId, client_addr: &str, submission: Submission) -> u64 {
        self.admitted_total += 1;
        let queue_number = self.admitted_total;
        let lines = submission.lines.len();
        let resource_type = submission.resource_type.clone();

        let job = Job::new(
            queue_number,
            client,
            client_addr.to_string(),
            submission,
            self.quantum,
        );
        self.monitor.job_status(&job);
        self.jobs.admit(job);

        tracing::debug!(queue_number, client = %client, lines, "Job admitted");
        self.monitor.log(format!(
            "Request {} received from {} ({}, {} lines)",
            queue_number, client_addr, resource_type, lines
        ));
        queue_number
    }

    pub fn begin_processing(&mut self) {
        if !self.processing {
            self.processing = true;
            self.monitor.log("Processing started");
        }
    }

    pub fn is_processing(&self) -> bool {
        self.processing
    }

    pub fn quantum(&self) -> u64 {
        self.quantum
    }

    pub fn admitted_total(&self) -> u64 {
        self.admitted_total
    }

    pub fn detect_deadlock(&self) -> bool {
        deadlock::detect(&self.jobs, self.deadlock_min_jobs)
    }

    /// Preempt and re-grant resources for every blocked admission job, then
    /// resume processing.
    pub fn force_resolve_deadlock(&mut self) -> ResolveReport {
        let report = deadlock::resolve(&mut self.jobs, &mut self.pool);

        for queue_number in report.promoted.iter().chain(&report.still_blocked) {
            if let Some(job) = self.jobs.get(*queue_number) {
                self.monitor.job_status(job);
            }
        }
        self.monitor.log(format!(
            "Deadlock resolution: {} preempted, {} moved to ready, {} still blocked",
            report.preempted.len(),
            report.promoted.len(),
            report.still_blocked.len()
        ));

        self.processing = true;
        report
    }

    /// Resource conservation over every live job.
    pub fn is_conserved(&self) -> bool {
        self.pool.is_conserved(self.jobs.all_jobs())
    }

    pub fn snapshot(&self, running: bool) -> StatusSnapshot {
        let rows = |kind: QueueKind| -> Vec<JobRow> {
            self.jobs.jobs_in(kind).into_iter().map(JobRow::from).collect()
        };
        StatusSnapshot {
            running,
            processing: self.processing,
            quantum: self.quantum,
            admitted_total: self.admitted_total,
            pool: PoolSnapshot {
                available_paper: self.pool.available_paper(),
                available_printer: self.pool.available_printer(),
                paper_capacity: self.capacity.paper,
                printer_capacity: self.capacity.printer,
            },
            admission: rows(QueueKind::Admission),
            execution: rows(QueueKind::Execution),
            ready: rows(QueueKind::Ready),
            clients: self.clients.list(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolSnapshot {
    pub available_paper: u32,
    pub available_printer: u32,
    pub paper_capacity: u32,
    pub printer_capacity: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobRow {
    pub queue_number: u64,
    pub client: String,
    pub resource_type: String,
    pub status: JobStatus,
    pub has_paper: bool,
    pub has_printer: bool,
    pub remaining_lines: usize,
    pub operations_processed: u64,
}

impl From<&Job> for JobRow {
    fn from(job: &Job) -> Self {
        Self {
            queue_number: job.queue_number,
            client: job.client_addr.clone(),
            resource_type: job.resource_type.clone(),
            status: job.status,
            has_paper: job.has_paper,
            has_printer: job.has_printer,
            remaining_lines: job.remaining_lines(),
            operations_processed: job.operations_processed,
        }
    }
}

/// Point-in-time view of the spooler for monitors and dashboards.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub running: bool,
    pub processing: bool,
    pub quantum: u64,
    pub admitted_total: u64,
    pub pool: PoolSnapshot,
    pub admission: Vec<JobRow>,
    pub execution: Vec<JobRow>,
    pub ready: Vec<JobRow>,
    pub clients: Vec<ClientInfo>,
}
