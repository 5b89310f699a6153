pub mod deadlock;
pub mod job;
pub mod quantum;
pub mod queue;
pub mod resources;
pub mod state;

pub use job::{ClientId, Job, JobStatus, Submission};
pub use quantum::TickOutcome;
pub use queue::{JobTable, QueueKind};
pub use resources::{Resource, ResourcePool};
pub use state::{SpoolState, StatusSnapshot};
