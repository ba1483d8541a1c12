//! Feedloom pipeline core: the five stages and the scheduler that drives them.
//!
//! Items advance through a monotonic stage machine
//! (`unset → fetched → enriched → aggregated → narrated`, with `failed` as
//! the dead-letter terminal) driven by independently-timed recurring jobs.
//! The corpus store is the only coordination surface between stages.

pub mod aggregate;
pub mod enrich;
pub mod fetch;
pub mod narrate;
pub mod resolver;
pub mod scheduler;

pub use scheduler::{Pipeline, PipelineConfig, SchedulerHandle, StageIntervals};
