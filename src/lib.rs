// Guideline Jobs - asynchronous guideline summarization and checklist service

pub mod agents;
pub mod config;
pub mod db;
pub mod llm;
pub mod middleware;
pub mod models;
pub mod pipeline;
pub mod queue;
pub mod routes;
pub mod service;
pub mod types;
pub mod utils;

// Re-exports for convenience
pub use config::Config;
pub use models::AppState;
pub use pipeline::{PipelineExecutor, PipelineOutcome};
pub use service::JobService;

pub fn create_router(state: AppState) -> axum::Router {
    routes::create_router(state)
}
