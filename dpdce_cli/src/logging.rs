//! Subscriber setup: console layer on stderr plus an optional file layer.
//!
//! The returned guard flushes the file writer when dropped; keep it alive
//! until the process is done logging.
use dpdce_config::Logging;
use eyre::WrapErr;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

pub fn init(
    level: &str,
    json: bool,
    logging: &Logging,
    logs_dir: &Path,
) -> eyre::Result<Option<WorkerGuard>> {
    // RUST_LOG wins over --log-level.
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let console = if json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer().with_writer(std::io::stderr).boxed()
    };

    let mut guard = None;
    let file = match &logging.file {
        Some(file) => {
            let path = resolve(logs_dir, file);
            let dir = path.parent().unwrap_or(Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| eyre::eyre!("logging.file has no file name: {file}"))?;
            std::fs::create_dir_all(dir)
                .wrap_err_with(|| format!("create log directory {}", dir.display()))?;
            let period = rotation(logging.rotation.as_deref());
            let appender = RollingFileAppender::new(period, dir, name);
            let (writer, g) = tracing_appender::non_blocking(appender);
            guard = Some(g);
            let file_level = logging.level.as_deref().unwrap_or("info");
            Some(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(writer)
                    .with_filter(EnvFilter::new(file_level)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console.with_filter(console_filter))
        .with(file)
        .try_init()
        .map_err(|e| eyre::eyre!("install tracing subscriber: {e}"))?;
    Ok(guard)
}

/// Relative log paths live under `paths.logs_directory`.
fn resolve(logs_dir: &Path, file: &str) -> PathBuf {
    let p = Path::new(file);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        logs_dir.join(p)
    }
}

fn rotation(name: Option<&str>) -> Rotation {
    match name {
        Some("daily") => Rotation::DAILY,
        Some("hourly") => Rotation::HOURLY,
        _ => Rotation::NEVER,
    }
}
