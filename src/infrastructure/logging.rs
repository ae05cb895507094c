//! Logging initialization
//!
//! Console output through an env-filtered fmt subscriber, with an optional
//! daily-rolled file appender. The returned guard keeps the non-blocking
//! writer alive; `main` holds it for the process lifetime.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::infrastructure::config::LoggingConfig;

/// Initialize the global subscriber. Returns the file writer guard when file
/// output is enabled.
pub fn init(config: &LoggingConfig, fallback_log_dir: PathBuf) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    let console = tracing_subscriber::fmt::layer().with_target(false);

    if config.file_output {
        let dir = config.directory.clone().unwrap_or(fallback_log_dir);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create log directory {}", dir.display()))?;
        let appender = tracing_appender::rolling::daily(&dir, "catalog-harvester.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let file = tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer);

        tracing_subscriber::registry().with(filter).with(console).with(file).init();
        Ok(Some(guard))
    } else {
        tracing_subscriber::registry().with(filter).with(console).init();
        Ok(None)
    }
}
