//! The quantum-driven control loop.
//!
//! Each tick advances the quantum counter and then moves at most one unit of
//! work: a resource grant, a handoff into the execution queue, one printed
//! line, or a deferral back to admission. Priority is execution queue first,
//! then ready, then admission.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::protocol::{Completion, Response};
use crate::scheduler::job::JobStatus;
use crate::scheduler::queue::QueueKind;
use crate::scheduler::resources::Resource;
use crate::scheduler::state::SpoolState;

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Admission threshold not reached or processing not started
    Gated,
    /// The detector reported a stall; processing is paused
    Deadlocked,
    /// Nothing queued
    Idle,
    Granted {
        queue_number: u64,
        resource: Resource,
    },
    HandedOff {
        queue_number: u64,
        from: QueueKind,
        granted: Option<Resource>,
    },
    Printed {
        queue_number: u64,
        line: String,
        remaining: usize,
    },
    Completed {
        queue_number: u64,
        elapsed_quanta: u64,
        delivered: bool,
    },
    /// Resources unavailable; the job went back to the admission tail
    Deferred {
        queue_number: u64,
    },
}

impl SpoolState {
    /// Run one scheduling quantum.
    pub fn tick(&mut self) -> TickOutcome {
        self.quantum += 1;

        if self.admitted_total < self.admission_threshold || !self.processing {
            return TickOutcome::Gated;
        }

        if self.detect_deadlock() {
            self.processing = false;
            let waiting = self.jobs.ids(QueueKind::Admission);
            tracing::warn!(quantum = self.quantum, waiting = ?waiting, "Deadlock detected");
            self.monitor.warn(format!(
                "Deadlock detected: requests {:?} are stalled, waiting for resolution",
                waiting
            ));
            return TickOutcome::Deadlocked;
        }

        if let Some(queue_number) = self.jobs.pop_front(QueueKind::Execution) {
            return self.execute_step(queue_number);
        }
        for from in [QueueKind::Ready, QueueKind::Admission] {
            if let Some(queue_number) = self.jobs.pop_front(from) {
                return self.hand_off(queue_number, from);
            }
        }
        TickOutcome::Idle
    }

    fn hand_off(&mut self, queue_number: u64, from: QueueKind) -> TickOutcome {
        self.jobs.push_back(QueueKind::Execution, queue_number);
        let Some(job) = self.jobs.get_mut(queue_number) else {
            tracing::warn!(queue_number, "Queued job missing from table");
            return TickOutcome::Idle;
        };

        let granted = self.pool.try_acquire_next(job);
        match granted {
            Some(resource) => self.monitor.log(format!(
                "Request {} moved from {} to execution and acquired {}",
                queue_number, from, resource
            )),
            None => self.monitor.log(format!(
                "Request {} moved from {} to execution",
                queue_number, from
            )),
        }

        TickOutcome::HandedOff {
            queue_number,
            from,
            granted,
        }
    }

    fn execute_step(&mut self, queue_number: u64) -> TickOutcome {
        let Some(job) = self.jobs.get_mut(queue_number) else {
            tracing::warn!(queue_number, "Queued job missing from table");
            return TickOutcome::Idle;
        };

        if !job.has_paper && self.pool.try_acquire_paper(job) {
            return self.granted(queue_number, Resource::Paper);
        }
        if !job.has_printer && self.pool.try_acquire_printer(job) {
            return self.granted(queue_number, Resource::Printer);
        }

        if !job.holds_both() {
            job.set_status(JobStatus::Blocked);
            self.monitor.job_status(job);
            self.jobs.push_back(QueueKind::Admission, queue_number);
            self.monitor.log(format!(
                "Request {} is waiting for resources (paper: {}, printer: {})",
                queue_number,
                self.pool.available_paper(),
                self.pool.available_printer()
            ));
            return TickOutcome::Deferred { queue_number };
        }

        job.set_status(JobStatus::Running);
        self.monitor.job_status(job);
        let Some(line) = job.print_next_line() else {
            return self.complete(queue_number);
        };
        let remaining = job.remaining_lines();
        self.monitor.log(format!(
            "Request {} printed: {} ({} lines left)",
            queue_number, line, remaining
        ));

        if remaining == 0 {
            return self.complete(queue_number);
        }

        // Resources stay with the job until its last line.
        job.set_status(JobStatus::Blocked);
        self.monitor.job_status(job);
        self.jobs.push_back(QueueKind::Execution, queue_number);
        TickOutcome::Printed {
            queue_number,
            line,
            remaining,
        }
    }

    fn granted(&mut self, queue_number: u64, resource: Resource) -> TickOutcome {
        self.jobs.push_back(QueueKind::Execution, queue_number);
        self.monitor
            .log(format!("Request {} acquired {}", queue_number, resource));
        TickOutcome::Granted {
            queue_number,
            resource,
        }
    }

    /// Release the job's resources, mark it done, drop it from the table and
    /// send the completion line. Delivery is best-effort.
    fn complete(&mut self, queue_number: u64) -> TickOutcome {
        let Some(mut job) = self.jobs.remove(queue_number) else {
            tracing::warn!(queue_number, "Completed job missing from table");
            return TickOutcome::Idle;
        };

        self.pool.release(&mut job);
        job.set_status(JobStatus::Done);
        self.monitor.job_status(&job);

        let elapsed_quanta = job.elapsed_quanta(self.quantum);
        let response = Response::Completed(Completion {
            queue_number,
            elapsed_quanta,
            operations_processed: job.operations_processed,
            last_line: job.last_printed.clone().unwrap_or_default(),
        });

        let delivered = match self.clients.send(job.client, response.to_line()) {
            Ok(()) => true,
            Err(e) => {
                self.monitor.warn(format!(
                    "Could not deliver completion of request {}: {}",
                    queue_number, e
                ));
                false
            }
        };

        self.monitor.log(format!(
            "Request {} from {} finished in {} quanta",
            queue_number, job.client_addr, elapsed_quanta
        ));

        TickOutcome::Completed {
            queue_number,
            elapsed_quanta,
            delivered,
        }
    }
}

/// Drive [`SpoolState::tick`] once per quantum until `cancel` fires.
///
/// The lock is held for exactly one tick; outbound responses are only queued
/// for the connection writers, so a tick never waits on a socket.
pub async fn run_quantum_loop(
    state: Arc<Mutex<SpoolState>>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("Quantum loop stopped");
                break;
            }
            _ = interval.tick() => {
                let outcome = state.lock().await.tick();
                tracing::trace!(?outcome, "Quantum elapsed");
            }
        }
    }
}
