use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use guideline_jobs::{
    config::Config,
    db::{self, JobStore, MemoryJobStore, PgJobStore},
    llm::{LLMProviderConfig, ModelGateway, LLM},
    queue::{ChannelQueue, JobQueue, RedisConsumer, RedisQueue, WorkerPool},
    routes::create_router,
    utils::init_tracing,
    AppState, JobService, PipelineExecutor,
};

#[derive(Parser)]
#[command(name = "guideline-jobs", version, about = "Guideline summary and checklist service")]
struct Cli {
    /// Also write a daily rolling log file into this directory
    #[arg(long, env = "LOG_DIR", global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// HTTP API with in-process workers (default)
    Serve,
    /// Consume the Redis queue without serving HTTP
    Worker,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_dir.as_deref());

    // Load configuration
    let config = Config::from_env()?;
    info!("Configuration loaded: {:?}", config.server);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Worker => worker(config).await,
    }
}

async fn build_store(config: &Config) -> anyhow::Result<Arc<dyn JobStore>> {
    let Some(url) = config.database.url.as_deref() else {
        warn!("DATABASE_URL not set, job records are kept in memory");
        return Ok(Arc::new(MemoryJobStore::new()));
    };

    let pool = db::create_pool(&config.database, url).await?;

    info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to run migrations: {}", e))?;
    info!("Database migrations completed");

    Ok(Arc::new(PgJobStore::new(pool)))
}

fn build_executor(config: &Config, store: Arc<dyn JobStore>) -> anyhow::Result<Arc<PipelineExecutor>> {
    let llm = LLM::new(LLMProviderConfig::from_config(&config.llm)?)?;
    info!(provider = %llm.provider(), model = llm.model(), "Model gateway ready");

    let gateway: Arc<dyn ModelGateway> = Arc::new(llm);
    Ok(Arc::new(PipelineExecutor::new(store, gateway, config.pipeline.clone())))
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let store = build_store(&config).await?;
    let executor = build_executor(&config, store.clone())?;

    let (sender, receiver) = mpsc::channel(config.workers.queue_capacity);
    let pool = WorkerPool::spawn(executor, receiver, config.workers.count);
    info!(workers = pool.size(), "Worker pool started");

    let (stop_consumer, consumer_shutdown) = watch::channel(false);
    let mut consumer = None;
    let queue: Arc<dyn JobQueue> = if config.redis.enabled {
        let queue = RedisQueue::connect(&config.redis).await?;
        queue.ping().await?;
        let redis_consumer = RedisConsumer::connect(&config.redis, sender.clone()).await?;
        consumer = Some(tokio::spawn(redis_consumer.run(consumer_shutdown)));
        Arc::new(queue)
    } else {
        Arc::new(ChannelQueue::from_sender(sender.clone()))
    };
    drop(sender);

    let state = AppState {
        service: Arc::new(JobService::new(store.clone(), queue)),
        store,
        config: config.clone(),
    };
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);
    info!("Server listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    if let Some(handle) = consumer {
        stop_consumer.send_replace(true);
        if let Err(e) = handle.await {
            error!(error = %e, "Redis consumer task failed");
        }
    }

    info!("Draining in-flight jobs");
    pool.join().await;
    info!("Shutdown complete");

    Ok(())
}

async fn worker(config: Config) -> anyhow::Result<()> {
    if !config.redis.enabled {
        anyhow::bail!("worker mode needs the Redis queue, set USE_JOB_QUEUE=true");
    }

    let store = build_store(&config).await?;
    let executor = build_executor(&config, store)?;

    let (sender, receiver) = mpsc::channel(config.workers.queue_capacity);
    let pool = WorkerPool::spawn(executor, receiver, config.workers.count);
    let consumer = RedisConsumer::connect(&config.redis, sender).await?;
    info!(workers = pool.size(), key = %config.redis.queue_key, "Worker mode started");

    let (stop_consumer, consumer_shutdown) = watch::channel(false);
    let mut consumer = tokio::spawn(consumer.run(consumer_shutdown));

    let stopped_early = tokio::select! {
        _ = &mut consumer => true,
        _ = shutdown_signal() => false,
    };

    if stopped_early {
        warn!("Redis consumer stopped");
    } else {
        // The consumer puts back any message it has claimed but not delivered
        stop_consumer.send_replace(true);
        if let Err(e) = consumer.await {
            error!(error = %e, "Redis consumer task failed");
        }
    }

    info!("Draining in-flight jobs");
    pool.join().await;
    info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
