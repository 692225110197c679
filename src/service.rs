//! Job Service
//!
//! Public create/read operations. Submission validates, stores a `pending`
//! record and enqueues it, returning without waiting on the pipeline.
//! Fetches are plain lookups.

use std::sync::Arc;

use tracing::{error, info};
use uuid::Uuid;
use validator::Validate;

use crate::db::JobStore;
use crate::models::{CreateJobResponse, JobView};
use crate::queue::JobQueue;
use crate::types::{AppError, AppResult};

pub const MAX_GUIDELINE_CHARS: usize = 10_000;

#[derive(Debug, Validate)]
struct NewJob {
    #[validate(length(min = 1, max = 10000))]
    guideline_text: String,
}

pub struct JobService {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn JobQueue>,
}

impl JobService {
    pub fn new(store: Arc<dyn JobStore>, queue: Arc<dyn JobQueue>) -> Self {
        Self { store, queue }
    }

    pub fn queue_name(&self) -> &'static str {
        self.queue.name()
    }

    /// Leading and trailing whitespace is dropped before validation, so blank
    /// input is rejected like empty input.
    pub fn validate(guideline_text: Option<&str>) -> AppResult<&str> {
        let text = guideline_text
            .ok_or_else(|| AppError::Validation("guideline_text: This field is required.".to_string()))?
            .trim();

        NewJob { guideline_text: text.to_string() }.validate().map_err(|_| {
            AppError::Validation(format!(
                "guideline_text: must be between 1 and {} characters.",
                MAX_GUIDELINE_CHARS
            ))
        })?;

        Ok(text)
    }

    pub async fn submit(&self, guideline_text: Option<&str>) -> AppResult<CreateJobResponse> {
        let text = Self::validate(guideline_text)?;
        let job = self.store.create(text).await?;

        if let Err(e) = self.queue.enqueue(job.id).await {
            error!(job_id = %job.id, queue = self.queue.name(), error = %e, "Failed to enqueue job");
            self.abandon(job.id, &e).await;
            return Err(e);
        }

        info!(job_id = %job.id, input_len = text.len(), queue = self.queue.name(), "Job submitted");

        Ok(CreateJobResponse {
            id: job.id,
            status: job.status,
        })
    }

    pub async fn fetch(&self, id: Uuid) -> AppResult<JobView> {
        let job = self.store.get(id).await?;
        Ok(job.view())
    }

    /// A job that never reached the queue is failed so it cannot sit in
    /// `pending` forever.
    async fn abandon(&self, id: Uuid, cause: &AppError) {
        let result = async {
            let mut job = self.store.get(id).await?;
            job.fail(format!("Dispatch failed: {}", cause))?;
            self.store.update(&job).await
        }
        .await;

        if let Err(e) = result {
            error!(job_id = %id, error = %e, "Failed to mark undispatched job as failed");
        }
    }
}
