// Logger initialization

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const DEFAULT_LOG_FILTER: &str = "guideline_jobs=debug,tower_http=debug,axum=info";

/// Install the global subscriber: `RUST_LOG` (or the default filter) to
/// stdout, plus a daily rolling file under `log_dir` when one is given.
///
/// Keep the returned guard alive for the life of the process or buffered
/// file output is lost.
pub fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "guideline-jobs.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);

            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer))
                .init();

            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();

            None
        }
    }
}
