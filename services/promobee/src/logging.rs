//! Tracing setup
//!
//! JSON logs go to stdout, filtered by LOG_LEVEL / RUST_LOG. When an HTTP log
//! file is configured, the transport's request/response events are also
//! appended there, whatever the stdout filter says.

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use ecobee_auth::HTTP_LOG_TARGET;
use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::Targets;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

pub fn init(http_log: Option<&Path>) -> Result<()> {
    let env_filter = EnvFilter::try_from_env("LOG_LEVEL")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let http_log = http_log.map(http_log_layer).transpose()?;

    tracing_subscriber::registry()
        .with(http_log)
        .with(fmt::layer().json().with_filter(env_filter))
        .try_init()
        .context("failed to install tracing subscriber")
}

/// Append exchange events to `path`, creating it and its directory if needed.
fn http_log_layer(path: &Path) -> Result<BoxedLayer> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| anyhow!("http log path {} has no file name", path.display()))?;
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or(Path::new("."));

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name)
        .build(dir)
        .with_context(|| format!("failed to open http log {}", path.display()))?;

    Ok(fmt::layer()
        .with_writer(appender)
        .with_ansi(false)
        .with_filter(Targets::new().with_target(HTTP_LOG_TARGET, Level::DEBUG))
        .boxed())
}
