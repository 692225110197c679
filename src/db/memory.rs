use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::store::{not_found, JobStore};
use crate::models::Job;
use crate::types::{AppError, AppResult};

/// In-process record store used when no database is configured.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<Uuid, Job>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    /// All records, oldest first.
    pub async fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by_key(|job| job.created_at);
        jobs
    }

    /// Drop a record, simulating retention cleanup racing a pipeline run.
    pub async fn remove(&self, id: Uuid) -> Option<Job> {
        self.jobs.write().await.remove(&id)
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, input_text: &str) -> AppResult<Job> {
        let mut jobs = self.jobs.write().await;
        let mut job = Job::new(input_text);
        while jobs.contains_key(&job.id) {
            job.id = Uuid::new_v4();
        }
        jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn get(&self, id: Uuid) -> AppResult<Job> {
        self.jobs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found(id))
    }

    async fn update(&self, job: &Job) -> AppResult<()> {
        let mut jobs = self.jobs.write().await;
        let stored = jobs.get_mut(&job.id).ok_or_else(|| not_found(job.id))?;

        if !job.status.predecessors().contains(&stored.status) {
            return Err(AppError::InvalidTransition {
                from: stored.status,
                to: job.status,
            });
        }

        stored.status = job.status;
        stored.summary = job.summary.clone();
        stored.checklist = job.checklist.clone();
        stored.error_detail = job.error_detail.clone();
        stored.updated_at = job.updated_at;
        Ok(())
    }

    async fn health_check(&self) -> AppResult<()> {
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
