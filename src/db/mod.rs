use sqlx::postgres::{PgPool, PgPoolOptions};
use crate::config::DatabaseConfig;
use anyhow::{Context, Result};

pub use memory::*;
pub use pool::*;
pub use postgres::*;
pub use store::*;

pub mod memory;
pub mod pool;
pub mod postgres;
pub mod store;

pub async fn create_pool(config: &DatabaseConfig, url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect(url)
        .await
        .context("Failed to connect to database")?;

    // Test connection
    health_check(&pool).await?;

    Ok(pool)
}
