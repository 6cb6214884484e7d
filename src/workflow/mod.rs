// Durable workflow execution: checkpointed steps, replay-safe resume
pub mod checkpoint;
pub mod runtime;
pub mod step;

pub use checkpoint::{CheckpointStore, MemoryCheckpointStore, PgCheckpointStore, StepRecord};
pub use runtime::{RunOutcome, WorkflowRuntime};
pub use step::{StepExecutor, StepResult};
