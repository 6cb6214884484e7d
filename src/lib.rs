pub mod adapters;
pub mod db;
pub mod error;
pub mod handoff;
pub mod health;
pub mod pipeline;
pub mod store;
pub mod workflow;

pub use error::PipelineError;
pub use pipeline::{VideoPipeline, VideoPipelineInput, VideoPipelineOutput};
