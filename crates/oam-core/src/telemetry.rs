//! Tracing bootstrap: an `EnvFilter`-driven subscriber writing structured
//! (JSON, in production) logs to stdout, with an optional rolling file
//! appender for the rare deployment that wants on-disk logs.

use std::path::PathBuf;

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Where, in addition to stdout, logs should also be written.
#[derive(Debug, Clone, Default)]
pub struct FileLogSettings {
    pub directory: PathBuf,
    pub file_name_prefix: String,
}

/// Installs the global `tracing` subscriber. Idempotent across repeated
/// test invocations is the caller's responsibility (tests should call this
/// at most once per process, as `tracing_subscriber` panics on a second
/// global-default install).
pub fn init(app_name: &str, file_log: Option<FileLogSettings>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let env_filter = EnvFilter::try_from_env(format!("{}_LOG", app_name.to_uppercase()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(true);

    match file_log {
        Some(settings) => {
            let file_appender = tracing_appender::rolling::daily(
                settings.directory,
                settings.file_name_prefix,
            );
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .json();

            tracing_subscriber::registry()
                .with(env_filter)
                .with(stdout_layer)
                .with(file_layer)
                .init();

            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(stdout_layer)
                .init();

            None
        }
    }
}
