//! Stall detection and recovery over the admission queue.
//!
//! The detector is a cheap heuristic on observable state, not a cycle search
//! over a wait-for graph: it reports a stall when the admission queue holds at
//! least `min_jobs` jobs and every one of them already holds both resources.
//! Recovery is never automatic. [`resolve`] runs only when an operator asks
//! for it, preempts every blocked job in the admission queue uniformly, and
//! then re-grants from the refilled pool in admission order.

use serde::Serialize;

use crate::scheduler::job::JobStatus;
use crate::scheduler::queue::{JobTable, QueueKind};
use crate::scheduler::resources::{Resource, ResourcePool};

/// Returns true when progress appears stuck. Never mutates state.
pub fn detect(jobs: &JobTable, min_jobs: usize) -> bool {
    let waiting = jobs.jobs_in(QueueKind::Admission);
    waiting.len() >= min_jobs && waiting.iter().all(|job| job.holds_both())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolveReport {
    /// Blocked jobs that were considered, in admission order
    pub preempted: Vec<u64>,
    /// Jobs that ended up holding both resources and moved to the ready queue
    pub promoted: Vec<u64>,
    /// Jobs left blocked in the admission queue
    pub still_blocked: Vec<u64>,
    pub released_paper: u32,
    pub released_printer: u32,
    pub granted_paper: u32,
    pub granted_printer: u32,
}

/// Preempt every blocked job in the admission queue, then try to re-grant
/// paper and printer to each of them.
pub fn resolve(jobs: &mut JobTable, pool: &mut ResourcePool) -> ResolveReport {
    let mut report = ResolveReport::default();

    let blocked: Vec<u64> = jobs
        .jobs_in(QueueKind::Admission)
        .into_iter()
        .filter(|job| job.status == JobStatus::Blocked)
        .map(|job| job.queue_number)
        .collect();

    for &queue_number in &blocked {
        if let Some(job) = jobs.get_mut(queue_number) {
            for resource in pool.release(job) {
                match resource {
                    Resource::Paper => report.released_paper += 1,
                    Resource::Printer => report.released_printer += 1,
                }
            }
        }
    }

    for &queue_number in &blocked {
        let Some(job) = jobs.get_mut(queue_number) else {
            continue;
        };
        if pool.try_acquire_paper(job) {
            report.granted_paper += 1;
        }
        if pool.try_acquire_printer(job) {
            report.granted_printer += 1;
        }

        if job.holds_both() && job.set_status(JobStatus::Ready) {
            jobs.relocate(queue_number, QueueKind::Ready);
            report.promoted.push(queue_number);
        } else {
            report.still_blocked.push(queue_number);
        }
    }

    report.preempted = blocked;
    report
}
