//! Plain-text wire protocol.
//!
//! A client writes a header line `<resourceType>|<lineCount>` followed by
//! exactly `lineCount` payload lines. The server answers with
//! `SOLICITUD_RECIBIDA|<queueNumber>` right away and, when the job finishes,
//! `SOLICITUD_TERMINADA|<queueNumber>|<elapsedQuanta>|<operations>|<queueNumber>|RoundRobin|<lastLine>`.

use serde::Serialize;

use crate::scheduler::job::{Submission, SubmissionError};

pub const RECEIVED_TAG: &str = "SOLICITUD_RECIBIDA";
pub const COMPLETED_TAG: &str = "SOLICITUD_TERMINADA";

pub const POLICY_NAME: &str = "RoundRobin";

/// Longest accepted line in bytes, terminator excluded.
pub const MAX_LINE_BYTES: usize = 8 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Completion {
    pub queue_number: u64,
    pub elapsed_quanta: u64,
    pub operations_processed: u64,
    pub last_line: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Response {
    Received { queue_number: u64 },
    Completed(Completion),
}

impl std::fmt::Display for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Response::Received { queue_number } => write!(f, "{}|{}", RECEIVED_TAG, queue_number),
            Response::Completed(c) => write!(
                f,
                "{}|{}|{}|{}|{}|{}|{}",
                COMPLETED_TAG,
                c.queue_number,
                c.elapsed_quanta,
                c.operations_processed,
                c.queue_number,
                POLICY_NAME,
                c.last_line
            ),
        }
    }
}

impl Response {
    /// Newline-terminated wire form.
    pub fn to_line(&self) -> String {
        format!("{}\n", self)
    }

    /// Parse one response line. Unknown or truncated lines yield `None`.
    pub fn parse(line: &str) -> Option<Response> {
        let line = line.trim_end_matches(&['\r', '\n'][..]);
        let (tag, rest) = line.split_once('|')?;
        match tag {
            RECEIVED_TAG => Some(Response::Received {
                queue_number: rest.parse().ok()?,
            }),
            COMPLETED_TAG => {
                // The last field is free text and may contain the separator.
                let fields: Vec<&str> = rest.splitn(6, '|').collect();
                if fields.len() != 6 {
                    return None;
                }
                Some(Response::Completed(Completion {
                    queue_number: fields[0].parse().ok()?,
                    elapsed_quanta: fields[1].parse().ok()?,
                    operations_processed: fields[2].parse().ok()?,
                    last_line: fields[5].to_string(),
                }))
            }
            _ => None,
        }
    }
}

/// Encode a submission for the wire.
pub fn encode_submission(resource_type: &str, lines: &[String]) -> String {
    let mut out = format!("{}|{}\n", resource_type, lines.len());
    for line in lines {
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// Reassembles submissions from a stream of lines.
///
/// A bad header line is reported and discarded; the next line is then read as
/// a fresh header.
#[derive(Debug, Default)]
pub struct SubmissionFramer {
    pending: Option<(String, usize, Vec<String>)>,
}

impl SubmissionFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line (without its terminator). Returns a result once a
    /// submission is complete or its header has been rejected.
    pub fn push_line(&mut self, line: &str) -> Option<Result<Submission, SubmissionError>> {
        let line = line.trim_end_matches('\r');
        match self.pending.take() {
            None => match Submission::parse_header(line) {
                Ok((resource_type, expected)) => {
                    self.pending = Some((resource_type, expected, Vec::with_capacity(expected)));
                    None
                }
                Err(e) => Some(Err(e)),
            },
            Some((resource_type, expected, mut lines)) => {
                lines.push(line.to_string());
                if lines.len() == expected {
                    Some(Ok(Submission {
                        resource_type,
                        lines,
                    }))
                } else {
                    self.pending = Some((resource_type, expected, lines));
                    None
                }
            }
        }
    }

    /// Feed a line that could not be used (undecodable or oversized). Whatever
    /// submission it belongs to is dropped, and the next line is read as a
    /// fresh header.
    pub fn reject_line(&mut self, reason: SubmissionError) -> SubmissionError {
        self.pending = None;
        reason
    }

    /// True while a header has been read but its payload is incomplete.
    pub fn is_mid_submission(&self) -> bool {
        self.pending.is_some()
    }

    /// Called at end of stream. Reports a truncated submission, if any.
    pub fn finish(&mut self) -> Option<SubmissionError> {
        self.pending
            .take()
            .map(|(_, expected, lines)| SubmissionError::MissingLines {
                expected,
                found: lines.len(),
            })
    }
}
