//! Logging for consolidation runs.
//!
//! Runs log through the `tracing` ecosystem into a timestamped text file in
//! the export folder, plus a compact stderr layer.
//!
//! Per-file extraction does not log directly: it records its decisions in a
//! [`Diagnostics`] value so the cache can persist them next to the extracted
//! data and replay them later.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt as tfmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{ConsolidaError, Result};

/// Guard that must be held for the run so pending log lines get flushed.
pub struct LogGuard {
    _file_guard: WorkerGuard,
}

/// Install the global subscriber, writing to `log_dir/file_name`.
///
/// Level comes from `RUST_LOG` when set, otherwise `info` (`debug` when
/// `verbose`).
pub fn init_logging(log_dir: &Path, file_name: &str, verbose: bool) -> Result<LogGuard> {
    std::fs::create_dir_all(log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let default_level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("consolida={default_level}")));

    let file_layer = tfmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_target(false);

    let console_layer = tfmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| ConsolidaError::Config(format!("logging already initialized: {e}")))?;

    Ok(LogGuard {
        _file_guard: file_guard,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    pub level: LogLevel,
    pub message: String,
}

/// Log lines captured during one extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    lines: Vec<LogLine>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn debug(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Debug, message.into());
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Info, message.into());
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Warn, message.into());
    }

    fn push(&mut self, level: LogLevel, message: String) {
        self.lines.push(LogLine { level, message });
    }

    pub fn lines(&self) -> &[LogLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Emit every captured line through `tracing`.
    pub fn replay(&self) {
        for line in &self.lines {
            match line.level {
                LogLevel::Debug => tracing::debug!("{}", line.message),
                LogLevel::Info => tracing::info!("{}", line.message),
                LogLevel::Warn => tracing::warn!("{}", line.message),
            }
        }
    }

    /// One `LEVEL<TAB>message` line per entry.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            out.push_str(&format!("{}\t{}\n", line.level, line.message.replace('\n', " ")));
        }
        out
    }

    /// Inverse of [`Diagnostics::to_text`]. Returns `None` on malformed input.
    pub fn from_text(text: &str) -> Option<Self> {
        let mut diagnostics = Diagnostics::new();
        for raw in text.lines().filter(|l| !l.is_empty()) {
            let (level, message) = raw.split_once('\t')?;
            let level = match level {
                "DEBUG" => LogLevel::Debug,
                "INFO" => LogLevel::Info,
                "WARN" => LogLevel::Warn,
                _ => return None,
            };
            diagnostics.push(level, message.to_string());
        }
        Some(diagnostics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_form_round_trips() {
        let mut d = Diagnostics::new();
        d.info("Re-importo Analisi.xlsx");
        d.warn("casella COSTI duplicata\nin fase 1");
        let parsed = Diagnostics::from_text(&d.to_text()).unwrap();
        assert_eq!(parsed.lines().len(), 2);
        assert_eq!(parsed.lines()[1].level, LogLevel::Warn);
        assert_eq!(parsed.lines()[1].message, "casella COSTI duplicata in fase 1");
    }

    #[test]
    fn rejects_garbage() {
        assert!(Diagnostics::from_text("not a log line").is_none());
        assert!(Diagnostics::from_text("TRACE\tx").is_none());
        assert_eq!(Diagnostics::from_text("").unwrap(), Diagnostics::new());
    }
}
