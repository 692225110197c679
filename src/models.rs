use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;
use crate::db::JobStore;
use crate::service::JobService;
use crate::types::{AppError, AppResult};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<JobService>,
    pub store: Arc<dyn JobStore>,
    pub config: Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "job_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Completed and failed records are never mutated again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Forward-only progression: pending -> processing -> completed | failed,
    /// with pending -> failed allowed for records that never got dispatched.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (*self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Pending, JobStatus::Failed)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }

    /// Persisted statuses a record may hold for an update that writes `self`.
    pub fn predecessors(&self) -> &'static [JobStatus] {
        match self {
            JobStatus::Pending => &[JobStatus::Pending],
            JobStatus::Processing => &[JobStatus::Pending, JobStatus::Processing],
            JobStatus::Completed => &[JobStatus::Processing],
            JobStatus::Failed => &[JobStatus::Pending, JobStatus::Processing],
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One guideline processing request and its lifecycle state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub status: JobStatus,
    pub input_text: String,
    pub summary: Option<String>,
    pub checklist: Option<Vec<String>>,
    pub error_detail: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(input_text: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            status: JobStatus::Pending,
            input_text: input_text.into(),
            summary: None,
            checklist: None,
            error_detail: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn transition(&mut self, next: JobStatus) -> AppResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(AppError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.touch();
        Ok(())
    }

    fn touch(&mut self) {
        // Clock skew must not make updated_at run backwards.
        self.updated_at = Utc::now().max(self.updated_at);
    }

    /// Move to `processing`. Returns false when the record was already
    /// processing (re-entry after an interrupted run) and nothing changed.
    pub fn start_processing(&mut self) -> AppResult<bool> {
        if self.status == JobStatus::Processing {
            return Ok(false);
        }
        self.transition(JobStatus::Processing)?;
        Ok(true)
    }

    pub fn record_summary(&mut self, summary: impl Into<String>) -> AppResult<()> {
        if self.status != JobStatus::Processing {
            return Err(AppError::Internal(format!(
                "cannot record a summary while {}",
                self.status
            )));
        }
        if self.summary.is_some() {
            return Err(AppError::Internal("summary already recorded".to_string()));
        }
        self.summary = Some(summary.into());
        self.touch();
        Ok(())
    }

    pub fn complete(&mut self, checklist: Vec<String>) -> AppResult<()> {
        if self.summary.is_none() {
            return Err(AppError::Internal(
                "cannot complete a job without a summary".to_string(),
            ));
        }
        self.transition(JobStatus::Completed)?;
        self.checklist = Some(checklist);
        Ok(())
    }

    pub fn fail(&mut self, detail: impl Into<String>) -> AppResult<()> {
        self.transition(JobStatus::Failed)?;
        self.error_detail = Some(detail.into());
        Ok(())
    }

    pub fn view(&self) -> JobView {
        let result = match self.status {
            JobStatus::Completed => Some(JobResult::Completed {
                summary: self.summary.clone(),
                checklist: self.checklist.clone().unwrap_or_default(),
            }),
            JobStatus::Failed => Some(JobResult::Failed {
                error: self.error_detail.clone().unwrap_or_default(),
            }),
            JobStatus::Pending | JobStatus::Processing => None,
        };

        JobView {
            id: self.id,
            status: self.status,
            result,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl std::fmt::Display for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Job {} - {}", self.id, self.status)
    }
}

// API Request/Response types

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub guideline_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateJobResponse {
    pub id: Uuid,
    pub status: JobStatus,
}

/// Payload attached to a fetched job once it reaches a terminal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobResult {
    Completed {
        summary: Option<String>,
        checklist: Vec<String>,
    },
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobView {
    pub id: Uuid,
    pub status: JobStatus,
    pub result: Option<JobResult>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub database: String,
    pub queue: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_creation() {
        let job = Job::new("Test guideline text");
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.input_text, "Test guideline text");
        assert!(job.summary.is_none());
        assert!(job.checklist.is_none());
        assert!(job.error_detail.is_none());
    }

    #[test]
    fn test_job_display() {
        let job = Job::new("Test");
        assert_eq!(job.to_string(), format!("Job {} - pending", job.id));
    }

    #[test]
    fn test_status_transitions() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Processing));
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Processing.can_transition_to(JobStatus::Pending));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Processing));
    }

    #[test]
    fn test_predecessors_never_include_terminal_states() {
        for status in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert!(status.predecessors().iter().all(|p| !p.is_terminal()));
        }
        assert_eq!(JobStatus::Completed.predecessors(), &[JobStatus::Processing]);
    }

    #[test]
    fn test_happy_path_lifecycle() {
        let mut job = Job::new("Follow safety protocol X");
        assert!(job.start_processing().unwrap());
        assert!(!job.start_processing().unwrap());
        job.record_summary("Summary text.").unwrap();
        job.complete(vec!["Step 1".to_string()]).unwrap();

        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.updated_at >= job.created_at);
        assert!(job.fail("late failure").is_err());
        assert!(job.error_detail.is_none());
    }

    #[test]
    fn test_summary_is_set_once() {
        let mut job = Job::new("text");
        job.start_processing().unwrap();
        job.record_summary("first").unwrap();
        assert!(job.record_summary("second").is_err());
        assert_eq!(job.summary.as_deref(), Some("first"));
    }

    #[test]
    fn test_failure_preserves_summary() {
        let mut job = Job::new("text");
        job.start_processing().unwrap();
        job.record_summary("kept").unwrap();
        job.fail("boom").unwrap();

        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.summary.as_deref(), Some("kept"));
        assert!(job.checklist.is_none());
        assert!(job.start_processing().is_err());
    }

    #[test]
    fn test_view_shapes_result_by_status() {
        let mut job = Job::new("text");
        assert!(job.view().result.is_none());

        job.start_processing().unwrap();
        job.record_summary("Summary").unwrap();
        assert!(job.view().result.is_none());

        job.complete(vec!["a".to_string(), "b".to_string()]).unwrap();
        let json = serde_json::to_value(job.view()).unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(
            json["result"],
            serde_json::json!({ "summary": "Summary", "checklist": ["a", "b"] })
        );

        let mut failed = Job::new("text");
        failed.fail("dispatch failed").unwrap();
        let json = serde_json::to_value(failed.view()).unwrap();
        assert_eq!(json["result"], serde_json::json!({ "error": "dispatch failed" }));
    }
}
