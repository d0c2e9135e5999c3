//! Worker thread model (spec.md §5).

pub mod handle;
pub mod messages;
pub mod worker;

pub use handle::WorkerHandle;
pub use messages::{RequestId, WorkerCommand, WorkerPayload, WorkerRequest, WorkerResponse};
