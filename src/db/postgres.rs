use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use super::store::{not_found, JobStore};
use crate::models::{Job, JobStatus};
use crate::types::{AppError, AppResult};

const JOB_COLUMNS: &str =
    "id, status, input_text, summary, checklist, error_detail, created_at, updated_at";

// Note: runtime query_as so builds don't need DATABASE_URL at compile time
#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    status: JobStatus,
    input_text: String,
    summary: Option<String>,
    checklist: Option<Json<Vec<String>>>,
    error_detail: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<JobRow> for Job {
    fn from(row: JobRow) -> Self {
        Job {
            id: row.id,
            status: row.status,
            input_text: row.input_text,
            summary: row.summary,
            checklist: row.checklist.map(|Json(items)| items),
            error_detail: row.error_detail,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Postgres-backed job records (`jobs` table, see `migrations/`).
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

/// Text labels of the statuses an update writing `status` may replace.
fn prior_status_labels(status: JobStatus) -> Vec<String> {
    status
        .predecessors()
        .iter()
        .map(|s| s.as_str().to_string())
        .collect()
}

/// Why a guarded update touched no row, given the status now persisted.
fn update_conflict(id: Uuid, to: JobStatus, current: Option<JobStatus>) -> AppError {
    match current {
        None => not_found(id),
        Some(from) => AppError::InvalidTransition { from, to },
    }
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn current_status(&self, id: Uuid) -> AppResult<Option<JobStatus>> {
        let status = sqlx::query_scalar::<_, JobStatus>("SELECT status FROM jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(status)
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(&self, input_text: &str) -> AppResult<Job> {
        let job = Job::new(input_text);

        let row = sqlx::query_as::<_, JobRow>(&format!(
            r#"
            INSERT INTO jobs (id, status, input_text, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            JOB_COLUMNS
        ))
        .bind(job.id)
        .bind(job.status)
        .bind(&job.input_text)
        .bind(job.created_at)
        .bind(job.updated_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn get(&self, id: Uuid) -> AppResult<Job> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {} FROM jobs WHERE id = $1",
            JOB_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Job::from).ok_or_else(|| not_found(id))
    }

    async fn update(&self, job: &Job) -> AppResult<()> {
        let allowed = prior_status_labels(job.status);

        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = $2,
                summary = $3,
                checklist = $4,
                error_detail = $5,
                updated_at = $6
            WHERE id = $1 AND status::text = ANY($7)
            "#,
        )
        .bind(job.id)
        .bind(job.status)
        .bind(&job.summary)
        .bind(job.checklist.as_ref().map(Json))
        .bind(&job.error_detail)
        .bind(job.updated_at)
        .bind(&allowed)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        let current = self.current_status(job.id).await?;
        Err(update_conflict(job.id, job.status, current))
    }

    async fn health_check(&self) -> AppResult<()> {
        super::pool::health_check(&self.pool).await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}
