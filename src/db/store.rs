//! Job record store contract.
//!
//! Every operation is atomic for a single record. `update` refuses writes that
//! would move a record backwards or touch a completed/failed record, which is
//! what makes duplicate pipeline dispatches harmless.

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::Job;
use crate::types::AppResult;

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a fresh `pending` record for `input_text`.
    async fn create(&self, input_text: &str) -> AppResult<Job>;

    /// Fails with `AppError::NotFound` when no record has this id.
    async fn get(&self, id: Uuid) -> AppResult<Job>;

    /// Write the mutable fields of `job` (status, summary, checklist,
    /// error detail, updated_at) back by id.
    async fn update(&self, job: &Job) -> AppResult<()>;

    async fn health_check(&self) -> AppResult<()>;

    fn backend(&self) -> &'static str;
}

pub(crate) fn not_found(id: Uuid) -> crate::types::AppError {
    crate::types::AppError::NotFound(format!("job {}", id))
}
