//! Structured logging for measurement runs
//!
//! Entries carry a level, the emitting component, an optional correlation id
//! and JSON fields. They render as console lines, JSON objects or compact
//! one-liners. Everything goes to stderr; stdout and the output sinks carry
//! only measurement text.

use crate::error::{AppError, Result};
use crate::models::Config;
use crate::types::Phase;
use chrono::{DateTime, Utc};
use colored::{Color, Colorize};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Log level enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Trace = 0,
    /// Per-request detail: HTTP calls, probe trials, swallowed failures
    Debug = 1,
    /// Phase summaries
    Info = 2,
    /// Degraded but continuing, e.g. a phase cut short by its deadline
    Warn = 3,
    Error = 4,
    Fatal = 5,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Fatal => "FATAL",
        }
    }

    fn color(&self) -> Color {
        match self {
            LogLevel::Trace => Color::White,
            LogLevel::Debug => Color::Cyan,
            LogLevel::Info => Color::Green,
            LogLevel::Warn => Color::Yellow,
            LogLevel::Error => Color::Red,
            LogLevel::Fatal => Color::Magenta,
        }
    }

    /// Level a run logs at: `--debug` shows per-request detail, `--verbose`
    /// phase summaries, otherwise only warnings and worse
    pub fn for_config(config: &Config) -> Self {
        if config.debug {
            LogLevel::Debug
        } else if config.verbose {
            LogLevel::Info
        } else {
            LogLevel::Warn
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "TRACE" => Ok(LogLevel::Trace),
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" | "WARNING" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            "FATAL" => Ok(LogLevel::Fatal),
            _ => Err(AppError::parse(format!("Invalid log level: {}", s))),
        }
    }
}

/// One structured log record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    /// Emitting component (`APP`, `NET`, `MEASURE`)
    pub logger: String,
    pub correlation_id: Option<String>,
    /// Sorted so console output is stable
    pub fields: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogFormat {
    Console,
    Json,
    Compact,
}

#[derive(Clone)]
pub struct Logger {
    min_level: LogLevel,
    use_color: bool,
    format: LogFormat,
    name: String,
    session_id: Option<Arc<str>>,
}

impl Logger {
    pub fn new(name: String) -> Self {
        Self {
            min_level: LogLevel::Info,
            use_color: true,
            format: LogFormat::Console,
            name,
            session_id: None,
        }
    }

    /// Level, color and format derived from the run config; `--debug`
    /// switches to JSON lines
    pub fn with_config(name: String, config: &Config) -> Self {
        Self {
            min_level: LogLevel::for_config(config),
            use_color: config.enable_color,
            format: if config.debug { LogFormat::Json } else { LogFormat::Console },
            name,
            session_id: None,
        }
    }

    /// Drops everything below Fatal
    pub fn silent(name: &str) -> Self {
        let mut logger = Self::new(name.to_string());
        logger.set_level(LogLevel::Fatal);
        logger
    }

    /// Tag every entry with `session_id`
    pub fn with_session(mut self, session_id: Arc<str>) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_level(&mut self, level: LogLevel) {
        self.min_level = level;
    }

    pub fn set_format(&mut self, format: LogFormat) {
        self.format = format;
    }

    pub fn set_color(&mut self, use_color: bool) {
        self.use_color = use_color;
    }

    pub fn log(&self, level: LogLevel, message: &str) -> LogEntryBuilder<'_> {
        LogEntryBuilder::new(self, level, message.to_string())
    }

    pub fn debug(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Debug, message)
    }

    pub fn info(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Info, message)
    }

    pub fn warn(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Warn, message)
    }

    pub fn would_log(&self, level: LogLevel) -> bool {
        level >= self.min_level
    }

    fn write_entry(&self, entry: &LogEntry) {
        if !self.would_log(entry.level) {
            return;
        }
        let _ = writeln!(io::stderr().lock(), "{}", self.render(entry));
    }

    /// Render an entry in the configured format
    pub fn render(&self, entry: &LogEntry) -> String {
        match self.format {
            LogFormat::Console => self.format_console(entry),
            LogFormat::Json => serde_json::to_string(entry)
                .unwrap_or_else(|e| format!("{{\"logger\":\"{}\",\"serialize_error\":\"{}\"}}", entry.logger, e)),
            LogFormat::Compact => format!(
                "{} {} {}: {}",
                entry.timestamp.format("%H:%M:%S"),
                entry.level.as_str().chars().next().unwrap_or('?'),
                entry.logger,
                entry.message
            ),
        }
    }

    fn format_console(&self, entry: &LogEntry) -> String {
        let level = format!("{:>5}", entry.level.as_str());
        let level = if self.use_color {
            level.color(entry.level.color()).to_string()
        } else {
            level
        };

        let mut output = format!(
            "{} {} [{}] {}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            level,
            entry.logger,
            entry.message
        );

        if let Some(correlation_id) = &entry.correlation_id {
            let short: String = correlation_id.chars().take(8).collect();
            output.push_str(&format!(" [{}]", short));
        }

        if !entry.fields.is_empty() {
            let fields: Vec<String> = entry.fields.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            output.push_str(&format!(" {{{}}}", fields.join(", ")));
        }

        output
    }
}

/// Builder for one entry; nothing is written until [`LogEntryBuilder::log`]
pub struct LogEntryBuilder<'a> {
    logger: &'a Logger,
    entry: LogEntry,
}

impl<'a> LogEntryBuilder<'a> {
    fn new(logger: &'a Logger, level: LogLevel, message: String) -> Self {
        let mut fields = BTreeMap::new();
        if let Some(session_id) = &logger.session_id {
            fields.insert("session_id".to_string(), serde_json::Value::from(session_id.as_ref()));
        }

        Self {
            logger,
            entry: LogEntry {
                timestamp: Utc::now(),
                level,
                message,
                logger: logger.name.clone(),
                correlation_id: None,
                fields,
            },
        }
    }

    pub fn correlation_id(mut self, id: &str) -> Self {
        self.entry.correlation_id = Some(id.to_string());
        self
    }

    pub fn field<T: Serialize>(mut self, key: &str, value: T) -> Self {
        if let Ok(json_value) = serde_json::to_value(value) {
            self.entry.fields.insert(key.to_string(), json_value);
        }
        self
    }

    pub fn phase(self, phase: Phase) -> Self {
        self.field("phase", phase.as_str())
    }

    /// Category, recoverability and phase of `error`
    pub fn error_info(self, error: &AppError) -> Self {
        let builder = self
            .field("error", error.to_string())
            .field("error_category", error.category())
            .field("error_recoverable", error.is_recoverable());
        match error.phase() {
            Some(phase) => builder.phase(phase),
            None => builder,
        }
    }

    pub fn entry(&self) -> &LogEntry {
        &self.entry
    }

    pub async fn log(self) {
        self.logger.write_entry(&self.entry);
    }
}

/// HTTP request logging for the transport
#[derive(Clone)]
pub struct NetworkLogger {
    logger: Logger,
}

impl NetworkLogger {
    pub fn from_logger(logger: Logger) -> Self {
        Self { logger }
    }

    /// One completed or failed request. Failures log at Debug as well:
    /// during transfers they are expected and already accounted for.
    pub async fn log_http_request(&self, url: &str, method: &str, status_code: Option<u16>, duration_ms: f64) {
        let status = status_code.map_or_else(|| "FAILED".to_string(), |code| code.to_string());
        self.logger
            .debug(&format!("{} {} -> {} in {:.1}ms", method, url, status, duration_ms))
            .field("url", url)
            .field("method", method)
            .field("status_code", status_code)
            .field("success", status_code.is_some_and(|code| (200..400).contains(&code)))
            .field("duration_ms", duration_ms)
            .log()
            .await;
    }

    /// A request that never produced a status
    pub async fn log_request_error(&self, url: &str, method: &str, error: &AppError) {
        self.logger
            .debug(&format!("{} {} failed: {}", method, url, error))
            .field("url", url)
            .field("method", method)
            .error_info(error)
            .log()
            .await;
    }
}

/// Probe results, swallowed transfer failures and phase summaries
#[derive(Clone)]
pub struct MeasurementLogger {
    logger: Logger,
}

impl MeasurementLogger {
    pub fn new(config: &Config) -> Self {
        Self {
            logger: Logger::with_config("MEASURE".to_string(), config),
        }
    }

    pub fn from_logger(logger: Logger) -> Self {
        Self { logger }
    }

    /// A worker request failed; it contributes zero bytes and the phase goes on
    pub async fn log_transfer_failure(&self, phase: Phase, url: &str, error: &AppError) {
        self.logger
            .debug(&format!("{} request to {} contributed 0 bytes", phase.label(), url))
            .phase(phase)
            .field("url", url)
            .error_info(error)
            .log()
            .await;
    }

    /// A probe trial was charged the failure penalty
    pub async fn log_probe_failure(&self, server_id: u32, trial: usize, reason: &str) {
        self.logger
            .debug(&format!("Probe {} of server {} failed: {}", trial, server_id, reason))
            .phase(Phase::Selection)
            .field("server_id", server_id)
            .field("trial", trial)
            .log()
            .await;
    }

    pub async fn log_probe_result(&self, server_id: u32, latency_ms: f64, failed_trials: usize) {
        self.logger
            .debug(&format!("Server {} averaged {:.2} ms", server_id, latency_ms))
            .phase(Phase::Selection)
            .field("server_id", server_id)
            .field("latency_ms", latency_ms)
            .field("failed_trials", failed_trials)
            .log()
            .await;
    }

    pub async fn log_phase_summary(&self, phase: Phase, bytes: u64, elapsed: Duration, bits_per_second: f64) {
        self.logger
            .info(&format!(
                "{} finished: {} bytes in {:.3}s ({:.0} bps)",
                phase.label(),
                bytes,
                elapsed.as_secs_f64(),
                bits_per_second
            ))
            .phase(phase)
            .field("bytes", bytes)
            .field("elapsed_ms", elapsed.as_secs_f64() * 1000.0)
            .field("bits_per_second", bits_per_second)
            .log()
            .await;
    }

    /// The phase deadline fired; the bytes moved so far still count
    pub async fn log_phase_deadline(&self, phase: Phase, bytes: u64) {
        self.logger
            .warn(&format!("{} deadline reached after {} bytes", phase.label(), bytes))
            .phase(phase)
            .field("bytes", bytes)
            .log()
            .await;
    }
}

/// Builds the loggers of one run; they all share its session id
pub struct LoggerFactory {
    config: Config,
    session_id: Arc<str>,
}

impl LoggerFactory {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            session_id: Uuid::new_v4().to_string().into(),
        }
    }

    pub fn create_logger(&self, name: &str) -> Logger {
        Logger::with_config(name.to_string(), &self.config).with_session(self.session_id.clone())
    }

    pub fn create_network_logger(&self) -> NetworkLogger {
        NetworkLogger::from_logger(self.create_logger("NET"))
    }

    pub fn create_measurement_logger(&self) -> MeasurementLogger {
        MeasurementLogger::from_logger(self.create_logger("MEASURE"))
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}
