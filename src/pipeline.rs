//! Pipeline Executor
//!
//! Drives one job from `pending` to a terminal state in a single invocation:
//!
//! ```text
//! load ─► processing ─► summary (persisted) ─► checklist ─► completed
//!                │              │                  │
//!                └──────────────┴──────────────────┴──► failed (best effort)
//! ```
//!
//! Writes happen in that order so a concurrent reader only ever sees the
//! status move forward. Any stage error, or a panic inside a stage, is
//! recorded on the job instead of escaping to the worker. Nothing is retried.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::agents::{ChecklistAgent, SummaryAgent};
use crate::config::PipelineConfig;
use crate::db::JobStore;
use crate::llm::{GenerationParams, ModelGateway};
use crate::models::{Job, JobStatus};
use crate::types::{AppError, AppResult};

/// How a single pipeline run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    NotFound {
        job_id: Uuid,
    },
    /// The job was already completed or failed; nothing was touched.
    AlreadyFinished {
        job_id: Uuid,
        status: JobStatus,
    },
    Completed {
        job_id: Uuid,
        item_count: usize,
        used_fallback: bool,
    },
    Failed {
        job_id: Uuid,
        reason: String,
        /// False when the failure could not be written back to the record.
        recorded: bool,
    },
}

impl PipelineOutcome {
    pub fn job_id(&self) -> Uuid {
        match self {
            PipelineOutcome::NotFound { job_id }
            | PipelineOutcome::AlreadyFinished { job_id, .. }
            | PipelineOutcome::Completed { job_id, .. }
            | PipelineOutcome::Failed { job_id, .. } => *job_id,
        }
    }
}

impl std::fmt::Display for PipelineOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineOutcome::NotFound { job_id } => write!(f, "Job {} not found", job_id),
            PipelineOutcome::AlreadyFinished { job_id, status } => {
                write!(f, "Job {} already {}", job_id, status)
            }
            PipelineOutcome::Completed { job_id, .. } => {
                write!(f, "Job {} completed successfully", job_id)
            }
            PipelineOutcome::Failed { job_id, reason, .. } => {
                write!(f, "Job {} failed: {}", job_id, reason)
            }
        }
    }
}

pub struct PipelineExecutor {
    store: Arc<dyn JobStore>,
    gateway: Arc<dyn ModelGateway>,
    config: PipelineConfig,
}

impl PipelineExecutor {
    pub fn new(
        store: Arc<dyn JobStore>,
        gateway: Arc<dyn ModelGateway>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            config,
        }
    }

    fn summary_params(&self) -> GenerationParams {
        GenerationParams {
            max_output_tokens: self.config.summary_max_tokens,
            temperature: self.config.temperature,
        }
    }

    fn checklist_params(&self) -> GenerationParams {
        GenerationParams {
            max_output_tokens: self.config.checklist_max_tokens,
            temperature: self.config.temperature,
        }
    }

    /// Run the pipeline for `job_id`. Never returns an error: every ending is
    /// described by the returned outcome.
    pub async fn run(&self, job_id: Uuid) -> PipelineOutcome {
        let job = match self.store.get(job_id).await {
            Ok(job) => job,
            Err(AppError::NotFound(_)) => {
                warn!(job_id = %job_id, "Job not found, nothing to process");
                return PipelineOutcome::NotFound { job_id };
            }
            Err(e) => return self.capture_failure(job_id, e.to_string()).await,
        };

        if job.status.is_terminal() {
            info!(job_id = %job_id, status = %job.status, "Job already finished, skipping duplicate dispatch");
            return PipelineOutcome::AlreadyFinished {
                job_id,
                status: job.status,
            };
        }

        info!(job_id = %job_id, input_len = job.input_text.len(), "Starting guideline pipeline");

        match AssertUnwindSafe(self.drive(job)).catch_unwind().await {
            Ok(Ok((item_count, used_fallback))) => {
                info!(job_id = %job_id, item_count, used_fallback, "Guideline pipeline complete");
                PipelineOutcome::Completed {
                    job_id,
                    item_count,
                    used_fallback,
                }
            }
            Ok(Err(e)) => self.capture_failure(job_id, e.to_string()).await,
            Err(panic) => {
                let reason = format!("Unexpected fault: {}", panic_message(panic.as_ref()));
                self.capture_failure(job_id, reason).await
            }
        }
    }

    async fn drive(&self, mut job: Job) -> AppResult<(usize, bool)> {
        if job.start_processing()? {
            self.store.update(&job).await?;
        }

        let summary = match job.summary.clone() {
            Some(summary) => {
                info!(job_id = %job.id, "Resuming with previously saved summary");
                summary
            }
            None => {
                let summary =
                    SummaryAgent::summarize(self.gateway.as_ref(), &job.input_text, self.summary_params())
                        .await?;
                job.record_summary(summary.clone())?;
                // Saved before the next call so a later failure keeps it
                self.store.update(&job).await?;
                summary
            }
        };

        let parsed =
            ChecklistAgent::generate(self.gateway.as_ref(), &summary, self.checklist_params()).await?;
        let used_fallback = parsed.used_fallback();
        let item_count = parsed.items().len();

        job.complete(parsed.into_items())?;
        self.store.update(&job).await?;

        Ok((item_count, used_fallback))
    }

    /// Best-effort: re-read the record and mark it failed. A record that has
    /// vanished, or already reached a terminal state, is left alone.
    async fn capture_failure(&self, job_id: Uuid, reason: String) -> PipelineOutcome {
        error!(job_id = %job_id, error = %reason, "Guideline pipeline failed");

        let mut job = match self.store.get(job_id).await {
            Ok(job) => job,
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "Could not reload job to record failure, dropping it");
                return PipelineOutcome::Failed {
                    job_id,
                    reason,
                    recorded: false,
                };
            }
        };

        if job.status.is_terminal() {
            return PipelineOutcome::AlreadyFinished {
                job_id,
                status: job.status,
            };
        }

        let recorded = match job.fail(reason.clone()) {
            Ok(()) => match self.store.update(&job).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(job_id = %job_id, error = %e, "Failed to persist job failure");
                    false
                }
            },
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "Job cannot move to failed");
                false
            }
        };

        PipelineOutcome::Failed {
            job_id,
            reason,
            recorded,
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "pipeline panicked".to_string()
    }
}
