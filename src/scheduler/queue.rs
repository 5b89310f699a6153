use std::collections::{HashMap, VecDeque};

use serde::Serialize;

use crate::scheduler::job::Job;

/// The three scheduling queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum QueueKind {
    Admission,
    Execution,
    Ready,
}

impl std::fmt::Display for QueueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueKind::Admission => write!(f, "admission"),
            QueueKind::Execution => write!(f, "execution"),
            QueueKind::Ready => write!(f, "ready"),
        }
    }
}

/// Arena of live jobs keyed by queue number, with the admission, execution
/// and ready queues holding keys into it.
///
/// A job is in at most one queue at a time. While the scheduler works on a
/// job it has been popped from its queue but is still in the arena.
#[derive(Debug, Default)]
pub struct JobTable {
    jobs: HashMap<u64, Job>,
    admission: VecDeque<u64>,
    execution: VecDeque<u64>,
    ready: VecDeque<u64>,
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue(&self, kind: QueueKind) -> &VecDeque<u64> {
        match kind {
            QueueKind::Admission => &self.admission,
            QueueKind::Execution => &self.execution,
            QueueKind::Ready => &self.ready,
        }
    }

    fn queue_mut(&mut self, kind: QueueKind) -> &mut VecDeque<u64> {
        match kind {
            QueueKind::Admission => &mut self.admission,
            QueueKind::Execution => &mut self.execution,
            QueueKind::Ready => &mut self.ready,
        }
    }

    /// Store a new job and append it to the admission queue. Returns false if
    /// the queue number is already live.
    pub fn admit(&mut self, job: Job) -> bool {
        let queue_number = job.queue_number;
        if self.jobs.contains_key(&queue_number) {
            return false;
        }
        self.jobs.insert(queue_number, job);
        self.admission.push_back(queue_number);
        true
    }

    pub fn get(&self, queue_number: u64) -> Option<&Job> {
        self.jobs.get(&queue_number)
    }

    pub fn get_mut(&mut self, queue_number: u64) -> Option<&mut Job> {
        self.jobs.get_mut(&queue_number)
    }

    /// Take the head of a queue. The job stays in the arena.
    pub fn pop_front(&mut self, kind: QueueKind) -> Option<u64> {
        self.queue_mut(kind).pop_front()
    }

    /// Append a live, unqueued job to the tail of a queue. Returns false if the
    /// job is unknown or already sits in a queue.
    pub fn push_back(&mut self, kind: QueueKind, queue_number: u64) -> bool {
        if !self.jobs.contains_key(&queue_number) || self.locate(queue_number).is_some() {
            return false;
        }
        self.queue_mut(kind).push_back(queue_number);
        true
    }

    /// Move a queued job to the tail of another queue.
    pub fn relocate(&mut self, queue_number: u64, to: QueueKind) -> bool {
        if let Some(from) = self.locate(queue_number) {
            self.queue_mut(from).retain(|&n| n != queue_number);
        }
        self.push_back(to, queue_number)
    }

    /// Drop a job from the arena and from whichever queue holds it.
    pub fn remove(&mut self, queue_number: u64) -> Option<Job> {
        if let Some(kind) = self.locate(queue_number) {
            self.queue_mut(kind).retain(|&n| n != queue_number);
        }
        self.jobs.remove(&queue_number)
    }

    /// Which queue currently holds the job, if any.
    pub fn locate(&self, queue_number: u64) -> Option<QueueKind> {
        [QueueKind::Admission, QueueKind::Execution, QueueKind::Ready]
            .into_iter()
            .find(|&kind| self.queue(kind).contains(&queue_number))
    }

    /// Queue numbers in queue order.
    pub fn ids(&self, kind: QueueKind) -> Vec<u64> {
        self.queue(kind).iter().copied().collect()
    }

    /// Jobs in queue order.
    pub fn jobs_in(&self, kind: QueueKind) -> Vec<&Job> {
        self.queue(kind)
            .iter()
            .filter_map(|n| self.jobs.get(n))
            .collect()
    }

    pub fn queue_len(&self, kind: QueueKind) -> usize {
        self.queue(kind).len()
    }

    /// All live jobs sorted by queue number.
    pub fn all_jobs(&self) -> Vec<&Job> {
        let mut jobs: Vec<&Job> = self.jobs.values().collect();
        jobs.sort_by_key(|j| j.queue_number);
        jobs
    }

    pub fn clear(&mut self) {
        self.jobs.clear();
        self.admission.clear();
        self.execution.clear();
        self.ready.clear();
    }

    /// Number of live jobs in the arena.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::job::{ClientId, Submission};

    fn job(n: u64) -> Job {
        let submission = Submission::parse("paper|1\nx").unwrap();
        Job::new(n, ClientId(1), "peer".to_string(), submission, 0)
    }

    #[test]
    fn admit_appends_to_admission() {
        let mut table = JobTable::new();
        assert!(table.admit(job(1)));
        assert!(table.admit(job(2)));
        assert!(!table.admit(job(1)));
        assert_eq!(table.ids(QueueKind::Admission), vec![1, 2]);
        assert_eq!(table.locate(2), Some(QueueKind::Admission));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn popped_job_can_only_be_queued_once() {
        let mut table = JobTable::new();
        table.admit(job(1));

        assert_eq!(table.pop_front(QueueKind::Admission), Some(1));
        assert_eq!(table.locate(1), None);
        assert!(table.get(1).is_some());

        assert!(table.push_back(QueueKind::Execution, 1));
        assert!(!table.push_back(QueueKind::Ready, 1));
        assert_eq!(table.locate(1), Some(QueueKind::Execution));
        assert!(!table.push_back(QueueKind::Ready, 99));
    }

    #[test]
    fn relocate_moves_between_queues() {
        let mut table = JobTable::new();
        table.admit(job(1));
        table.admit(job(2));

        assert!(table.relocate(1, QueueKind::Ready));
        assert_eq!(table.ids(QueueKind::Admission), vec![2]);
        assert_eq!(table.ids(QueueKind::Ready), vec![1]);
    }

    #[test]
    fn remove_clears_arena_and_queue() {
        let mut table = JobTable::new();
        table.admit(job(1));
        table.admit(job(2));

        let removed = table.remove(1).unwrap();
        assert_eq!(removed.queue_number, 1);
        assert_eq!(table.locate(1), None);
        assert!(table.get(1).is_none());
        assert_eq!(table.ids(QueueKind::Admission), vec![2]);
    }

    #[test]
    fn all_jobs_sorted_by_queue_number() {
        let mut table = JobTable::new();
        table.admit(job(3));
        table.admit(job(1));
        table.admit(job(2));
        let numbers: Vec<u64> = table.all_jobs().iter().map(|j| j.queue_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);

        table.clear();
        assert!(table.is_empty());
        assert_eq!(table.queue_len(QueueKind::Admission), 0);
    }
}
