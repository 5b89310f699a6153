use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque identifier of the connection a job arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(pub u64);

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Scheduling state of a job.
///
/// Legal transitions:
///
/// | from      | to                          |
/// |-----------|-----------------------------|
/// | `Ready`   | `Blocked`, `Running`        |
/// | `Blocked` | `Running`, `Ready` (resolver) |
/// | `Running` | `Blocked`, `Done`           |
/// | `Done`    | (terminal)                  |
///
/// Staying in the same non-terminal state is always allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Ready,
    Blocked,
    Running,
    Done,
}

impl JobStatus {
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Ready, Ready | Blocked | Running)
                | (Blocked, Blocked | Running | Ready)
                | (Running, Running | Blocked | Done)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == JobStatus::Done
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Ready => write!(f, "ready"),
            JobStatus::Blocked => write!(f, "blocked"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Done => write!(f, "done"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmissionError {
    #[error("missing `resource|count` header")]
    MissingHeader,

    #[error("empty resource type")]
    EmptyResourceType,

    #[error("line count `{0}` is not a number")]
    InvalidLineCount(String),

    #[error("line count must be at least 1")]
    NoLines,

    #[error("expected {expected} payload lines, found {found}")]
    MissingLines { expected: usize, found: usize },

    #[error("line is not valid UTF-8")]
    InvalidEncoding,

    #[error("line exceeds {0} bytes")]
    LineTooLong(usize),
}

/// A parsed `resourceType|lineCount` submission and its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub resource_type: String,
    pub lines: Vec<String>,
}

impl Submission {
    /// Parse the header line of a submission, returning the resource type and
    /// the number of payload lines that follow it.
    pub fn parse_header(header: &str) -> Result<(String, usize), SubmissionError> {
        let header = header.trim_end_matches('\r');
        let (resource, count) = header
            .split_once('|')
            .ok_or(SubmissionError::MissingHeader)?;

        let resource = resource.trim();
        if resource.is_empty() {
            return Err(SubmissionError::EmptyResourceType);
        }

        let count = count.trim();
        let count: usize = count
            .parse()
            .map_err(|_| SubmissionError::InvalidLineCount(count.to_string()))?;
        if count == 0 {
            return Err(SubmissionError::NoLines);
        }

        Ok((resource.to_string(), count))
    }

    /// Parse a whole submission. Lines beyond the declared count are ignored.
    pub fn parse(content: &str) -> Result<Self, SubmissionError> {
        let mut lines = content.lines();
        let header = lines.next().ok_or(SubmissionError::MissingHeader)?;
        let (resource_type, expected) = Self::parse_header(header)?;

        let payload: Vec<String> = lines
            .take(expected)
            .map(|l| l.trim_end_matches('\r').to_string())
            .collect();
        if payload.len() < expected {
            return Err(SubmissionError::MissingLines {
                expected,
                found: payload.len(),
            });
        }

        Ok(Self {
            resource_type,
            lines: payload,
        })
    }

    /// Reassemble the raw wire content.
    pub fn content(&self) -> String {
        let mut content = format!("{}|{}", self.resource_type, self.lines.len());
        for line in &self.lines {
            content.push('\n');
            content.push_str(line);
        }
        content
    }
}

#[derive(Debug, Clone)]
pub struct Job {
    pub queue_number: u64,
    pub client: ClientId,
    pub client_addr: String,
    pub resource_type: String,
    pub content: String,
    pub status: JobStatus,
    pub has_paper: bool,
    pub has_printer: bool,
    /// Quantum counter value at admission
    pub start_quantum: u64,
    pub admitted_at: DateTime<Utc>,
    pub operations_processed: u64,
    pub last_printed: Option<String>,
    // Stored in reverse so that popping the tail yields lines in submission order.
    pending: Vec<String>,
}

impl Job {
    pub fn new(
        queue_number: u64,
        client: ClientId,
        client_addr: String,
        submission: Submission,
        start_quantum: u64,
    ) -> Self {
        let content = submission.content();
        let mut pending = submission.lines;
        pending.reverse();
        Self {
            queue_number,
            client,
            client_addr,
            resource_type: submission.resource_type,
            content,
            status: JobStatus::Ready,
            has_paper: false,
            has_printer: false,
            start_quantum,
            admitted_at: Utc::now(),
            operations_processed: 0,
            last_printed: None,
            pending,
        }
    }

    pub fn remaining_lines(&self) -> usize {
        self.pending.len()
    }

    pub fn holds_both(&self) -> bool {
        self.has_paper && self.has_printer
    }

    pub fn holds_any(&self) -> bool {
        self.has_paper || self.has_printer
    }

    /// Move to `next` if the transition is legal. Returns false and leaves the
    /// status untouched otherwise.
    pub fn set_status(&mut self, next: JobStatus) -> bool {
        if !self.status.can_transition_to(next) {
            tracing::warn!(
                queue_number = self.queue_number,
                from = %self.status,
                to = %next,
                "Rejected illegal job status transition"
            );
            return false;
        }
        self.status = next;
        true
    }

    /// Print one payload line. Only legal while both resources are held.
    pub fn print_next_line(&mut self) -> Option<String> {
        if !self.holds_both() {
            return None;
        }
        let line = self.pending.pop()?;
        self.operations_processed += 1;
        self.last_printed = Some(line.clone());
        Some(line)
    }

    pub fn elapsed_quanta(&self, now_quantum: u64) -> u64 {
        now_quantum.saturating_sub(self.start_quantum)
    }
}
