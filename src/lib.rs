pub mod clients;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod ingest;
pub mod monitor;
pub mod protocol;
pub mod scheduler;
pub mod shutdown;
pub mod spooler;

pub use error::{Result, SpoolError};
pub use spooler::Spooler;
