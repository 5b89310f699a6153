use std::net::SocketAddr;

use thiserror::Error;

use crate::scheduler::job::SubmissionError;

#[derive(Error, Debug)]
pub enum SpoolError {
    #[error("Failed to bind listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed submission: {0}")]
    MalformedSubmission(#[from] SubmissionError),
}

pub type Result<T> = std::result::Result<T, SpoolError>;
