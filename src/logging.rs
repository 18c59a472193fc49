use std::io;
use tracing::Level;
use tracing_appender::rolling;
use tracing_subscriber::filter::FilterFn;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::TARGET_VECTOR;

/// Default stdout directives; `RUST_LOG` takes precedence when set.
pub const STDOUT_DIRECTIVES: &str = "info,vector=warn,cluster=info,location=warn,story=info";
pub const FILE_DIRECTIVES: &str = "info,cluster=debug,location=debug,story=debug";

pub fn configure_logging() {
    // Per-article rejections are repeated in the run diagnostics, keep them off stdout
    let custom_filter = FilterFn::new(|metadata| {
        !(metadata.level() == &Level::WARN && metadata.target() == TARGET_VECTOR)
    });

    // Stdout log configuration
    let stdout_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(STDOUT_DIRECTIVES));
    let stdout_log = fmt::layer()
        .with_writer(io::stdout)
        .with_filter(stdout_filter)
        .with_filter(custom_filter);

    // File log configuration
    let file_appender = rolling::daily("logs", "cluster.log");
    let file_log = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .with_filter(EnvFilter::new(FILE_DIRECTIVES));

    tracing_subscriber::Registry::default()
        .with(stdout_log)
        .with(file_log)
        .init();
}
