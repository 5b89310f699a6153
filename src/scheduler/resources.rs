use serde::Serialize;

use crate::config::ResourceConfig;
use crate::scheduler::job::Job;

/// The two resource kinds a job must hold before it can print.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Resource {
    Paper,
    Printer,
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resource::Paper => write!(f, "paper"),
            Resource::Printer => write!(f, "printer"),
        }
    }
}

/// Counters for the paper and printer pools.
///
/// Carries no locking of its own; every call happens under the spooler lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourcePool {
    available_paper: u32,
    available_printer: u32,
    #[serde(skip)]
    capacity: ResourceConfig,
}

impl Default for ResourcePool {
    fn default() -> Self {
        Self::new(ResourceConfig::default())
    }
}

impl ResourcePool {
    pub fn new(capacity: ResourceConfig) -> Self {
        Self {
            available_paper: capacity.paper,
            available_printer: capacity.printer,
            capacity,
        }
    }

    pub fn available_paper(&self) -> u32 {
        self.available_paper
    }

    pub fn available_printer(&self) -> u32 {
        self.available_printer
    }

    pub fn capacity(&self) -> ResourceConfig {
        self.capacity
    }

    pub fn available(&self, resource: Resource) -> u32 {
        match resource {
            Resource::Paper => self.available_paper,
            Resource::Printer => self.available_printer,
        }
    }

    /// Grant one unit of paper if the pool has one and the job holds none.
    pub fn try_acquire_paper(&mut self, job: &mut Job) -> bool {
        if self.available_paper == 0 || job.has_paper {
            return false;
        }
        self.available_paper -= 1;
        job.has_paper = true;
        true
    }

    /// Grant one printer unit. Denied until the job holds paper, which fixes
    /// the acquisition order across all jobs.
    pub fn try_acquire_printer(&mut self, job: &mut Job) -> bool {
        if self.available_printer == 0 || job.has_printer || !job.has_paper {
            return false;
        }
        self.available_printer -= 1;
        job.has_printer = true;
        true
    }

    /// Attempt the next acquisition the job still needs, paper first.
    pub fn try_acquire_next(&mut self, job: &mut Job) -> Option<Resource> {
        if !job.has_paper {
            return self.try_acquire_paper(job).then_some(Resource::Paper);
        }
        if !job.has_printer {
            return self.try_acquire_printer(job).then_some(Resource::Printer);
        }
        None
    }

    /// Return every unit the job holds. Returns the resources released.
    pub fn release(&mut self, job: &mut Job) -> Vec<Resource> {
        let mut released = Vec::with_capacity(2);
        if job.has_paper {
            job.has_paper = false;
            self.available_paper += 1;
            debug_assert!(
                self.available_paper <= self.capacity.paper,
                "paper released beyond capacity"
            );
            released.push(Resource::Paper);
        }
        if job.has_printer {
            job.has_printer = false;
            self.available_printer += 1;
            debug_assert!(
                self.available_printer <= self.capacity.printer,
                "printer released beyond capacity"
            );
            released.push(Resource::Printer);
        }
        released
    }

    /// Check `available + held == capacity` for both pools.
    pub fn is_conserved<'a>(&self, jobs: impl IntoIterator<Item = &'a Job>) -> bool {
        let (paper, printer) = jobs.into_iter().fold((0u32, 0u32), |(p, r), job| {
            (p + job.has_paper as u32, r + job.has_printer as u32)
        });
        self.available_paper + paper == self.capacity.paper
            && self.available_printer + printer == self.capacity.printer
    }
}
