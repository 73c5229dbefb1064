use std::path::{Path, PathBuf};

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::layer::SubscriberExt;

const DEFAULT_FILTER: &str = "info";

#[derive(Debug, Clone, Default)]
pub struct TelemetryConfig {
    /// Fallback directive when `RUST_LOG` is not set.
    pub default_filter: Option<String>,
    pub local_log_file: Option<PathBuf>,
    pub with_target: bool,
}

impl TelemetryConfig {
    pub fn with_default_filter(mut self, filter: impl Into<String>) -> Self {
        self.default_filter = Some(filter.into());
        self
    }

    pub fn with_local_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.local_log_file = Some(path.into());
        self
    }

    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }
}

/// Keeps the non-blocking file writer alive; drop it last so buffered lines get flushed.
pub struct TelemetryGuard {
    _file_log_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, Box<dyn std::error::Error>> {
    let fallback = config.default_filter.as_deref().unwrap_or(DEFAULT_FILTER);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let (writer, file_log_guard) = if let Some(path) = &config.local_log_file {
        let file = open_log_file(path)?;
        let (file_writer, guard) = tracing_appender::non_blocking(file);
        (BoxMakeWriter::new(std::io::stderr.and(file_writer)), Some(guard))
    } else {
        (BoxMakeWriter::new(std::io::stderr), None)
    };

    let fmt_layer = fmt::layer()
        .with_target(config.with_target)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(writer);

    let subscriber = tracing_subscriber::registry().with(env_filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)?;

    // ic-agent and friends still speak `log`.
    let _ = tracing_log::LogTracer::builder().init();

    Ok(TelemetryGuard {
        _file_log_guard: file_log_guard,
    })
}

pub fn init_telemetry_from_env() -> Result<TelemetryGuard, Box<dyn std::error::Error>> {
    let mut config = TelemetryConfig::default();
    if let Ok(path) = std::env::var("LOG_FILE")
        && !path.trim().is_empty()
    {
        config = config.with_local_log_file(path.trim());
    }
    init_telemetry(config)
}

fn open_log_file(path: &Path) -> Result<std::fs::File, Box<dyn std::error::Error>> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_log_file_creates_missing_parent() {
        let dir = std::env::temp_dir().join(format!("dca_telemetry_{}", std::process::id()));
        let path = dir.join("nested").join("wallet.log");

        let file = open_log_file(&path);

        assert!(file.is_ok());
        assert!(path.exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn builder_keeps_requested_settings() {
        let config = TelemetryConfig::default()
            .with_default_filter("debug")
            .with_local_log_file("/tmp/wallet.log")
            .with_target(true);

        assert_eq!(config.default_filter.as_deref(), Some("debug"));
        assert_eq!(config.local_log_file, Some(PathBuf::from("/tmp/wallet.log")));
        assert!(config.with_target);
    }
}
