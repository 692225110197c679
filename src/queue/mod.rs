//! Dispatch boundary between job submission and pipeline execution.
//!
//! The service publishes a [`PipelineMessage`] through a [`JobQueue`]; a
//! [`WorkerPool`] consumes messages and runs the pipeline executor. Producer
//! and consumer share nothing but the job record store.

pub mod jobs;
pub mod redis_queue;
pub mod workers;

pub use jobs::{ChannelQueue, JobQueue, PipelineMessage};
pub use redis_queue::{RedisConsumer, RedisQueue};
pub use workers::WorkerPool;
