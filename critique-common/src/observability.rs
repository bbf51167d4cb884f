//! Logging setup for the `critique` binary.
//!
//! Events go to a daily file named `<app>.log.<YYYY-MM-DD>`, written off-thread,
//! and optionally to stderr as well. [`init_logging`] installs the subscriber
//! on first use; later calls return the same file path without touching it.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;

use anyhow::Context;
use chrono::{Local, NaiveDate};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();
static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();

const LOG_DIR_ENV: &str = "CRITIQUE_LOG_DIR";

type SinkLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Line format of every sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// File stem, and the directory name under `~/.local/share`.
    pub app_name: &'static str,
    /// Wins over `CRITIQUE_LOG_DIR`. `~/` is expanded.
    pub log_dir: Option<PathBuf>,
    /// Mirror every event to stderr.
    pub emit_stderr: bool,
    pub format: LogFormat,
    /// Used when `RUST_LOG` is unset or unparseable.
    pub default_filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            app_name: "critique",
            log_dir: None,
            emit_stderr: false,
            format: LogFormat::Text,
            default_filter: "info".to_string(),
        }
    }
}

impl LogConfig {
    /// Explicit `log_dir`, then `CRITIQUE_LOG_DIR`, then the user data dir.
    pub fn directory(&self) -> PathBuf {
        if let Some(dir) = &self.log_dir {
            return expand_home(dir);
        }
        match std::env::var(LOG_DIR_ENV) {
            Ok(dir) if !dir.trim().is_empty() => expand_home(Path::new(dir.trim())),
            _ => default_data_dir(self.app_name),
        }
    }
}

/// Install the global subscriber and return today's log file.
pub fn init_logging(config: LogConfig) -> anyhow::Result<PathBuf> {
    if let Some(path) = LOG_PATH.get() {
        return Ok(path.clone());
    }

    let dir = config.directory();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create log directory: {}", dir.display()))?;
    let path = log_file(&dir, config.app_name, Local::now().date_naive());

    let (writer, guard) =
        tracing_appender::non_blocking(rolling::daily(&dir, format!("{}.log", config.app_name)));
    let _ = LOG_GUARD.set(guard);

    let mut sinks = vec![sink(config.format, writer, false)];
    if config.emit_stderr {
        sinks.push(sink(config.format, std::io::stderr, true));
    }
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    tracing_subscriber::registry()
        .with(sinks)
        .with(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("tracing setup failed: {e}"))?;

    let _ = LOG_PATH.set(path.clone());
    Ok(path)
}

fn sink<W>(format: LogFormat, writer: W, ansi: bool) -> SinkLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    match format {
        LogFormat::Text => fmt::layer().with_writer(writer).with_ansi(ansi).boxed(),
        LogFormat::Json => fmt::layer().json().with_writer(writer).with_ansi(false).boxed(),
    }
}

/// Name `rolling::daily` gives the file for `day`.
fn log_file(dir: &Path, app_name: &str, day: NaiveDate) -> PathBuf {
    dir.join(format!("{app_name}.log.{}", day.format("%Y-%m-%d")))
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.to_str().and_then(|s| s.strip_prefix("~/")), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}

fn default_data_dir(app_name: &str) -> PathBuf {
    match std::env::var("HOME") {
        Ok(home) => PathBuf::from(home).join(".local/share").join(app_name),
        Err(_) => PathBuf::from(".").join(app_name),
    }
}
