use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::types::{AppError, AppResult};

/// Queue payload: the only thing a worker needs to pick up a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineMessage {
    pub job_id: Uuid,
}

impl PipelineMessage {
    pub fn new(job_id: Uuid) -> Self {
        Self { job_id }
    }

    pub fn encode(&self) -> AppResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(payload: &str) -> AppResult<Self> {
        serde_json::from_str(payload)
            .map_err(|e| AppError::Queue(format!("invalid pipeline message: {}", e)))
    }
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Hand a job to the workers. Must not wait for the pipeline itself.
    async fn enqueue(&self, job_id: Uuid) -> AppResult<()>;

    fn name(&self) -> &'static str;
}

/// In-process queue over a bounded tokio channel.
#[derive(Clone)]
pub struct ChannelQueue {
    sender: mpsc::Sender<PipelineMessage>,
}

impl ChannelQueue {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<PipelineMessage>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }

    pub fn from_sender(sender: mpsc::Sender<PipelineMessage>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl JobQueue for ChannelQueue {
    async fn enqueue(&self, job_id: Uuid) -> AppResult<()> {
        self.sender
            .try_send(PipelineMessage::new(job_id))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => AppError::Queue("job queue is full".to_string()),
                mpsc::error::TrySendError::Closed(_) => {
                    AppError::Queue("job queue is closed".to_string())
                }
            })
    }

    fn name(&self) -> &'static str {
        "channel"
    }
}
