//! Error handling for the throughput measurement engine

use crate::types::Phase;
use thiserror::Error;

/// Custom error types for netpulse
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Parsing errors (URLs, numbers, etc.)
    #[error("Parsing error: {0}")]
    Parse(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Network connectivity errors
    #[error("Network error: {0}")]
    Network(String),

    /// HTTP request errors
    #[error("HTTP request error: {0}")]
    HttpRequest(String),

    /// Timeout or cancellation
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// The config document could not be retrieved
    #[error("could not fetch config: {0}")]
    ConfigFetch(String),

    /// The config document was retrieved but is malformed
    #[error("could not parse config: {0}")]
    ConfigParse(String),

    /// Every catalog URL failed or returned no servers
    #[error("no servers discovered: {0}")]
    NoServersDiscovered(String),

    /// No server could be selected as the active target
    #[error("no best server found: {0}")]
    NoBestServer(String),

    /// Upload workers finished without sending a single byte
    #[error("zero bytes uploaded: {0}")]
    ZeroBytesUploaded(String),

    /// The requested source address is not assigned locally
    #[error("invalid source IP: {0}")]
    InvalidSourceIp(String),

    /// A fatal error tagged with the run phase it came from
    #[error("{phase} failed: {source}")]
    Phase {
        phase: Phase,
        source: Box<AppError>,
    },

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation(message.into())
    }

    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse(message.into())
    }

    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io(message.into())
    }

    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network(message.into())
    }

    pub fn http_request<S: Into<String>>(message: S) -> Self {
        Self::HttpRequest(message.into())
    }

    pub fn timeout<S: Into<String>>(message: S) -> Self {
        Self::Timeout(message.into())
    }

    pub fn config_fetch<S: Into<String>>(message: S) -> Self {
        Self::ConfigFetch(message.into())
    }

    pub fn config_parse<S: Into<String>>(message: S) -> Self {
        Self::ConfigParse(message.into())
    }

    pub fn no_servers<S: Into<String>>(message: S) -> Self {
        Self::NoServersDiscovered(message.into())
    }

    pub fn no_best_server<S: Into<String>>(message: S) -> Self {
        Self::NoBestServer(message.into())
    }

    pub fn zero_bytes_uploaded<S: Into<String>>(message: S) -> Self {
        Self::ZeroBytesUploaded(message.into())
    }

    pub fn invalid_source_ip<S: Into<String>>(message: S) -> Self {
        Self::InvalidSourceIp(message.into())
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Tag this error with the phase it occurred in. Already tagged errors
    /// keep their original phase.
    pub fn in_phase(self, phase: Phase) -> Self {
        match self {
            Self::Phase { .. } => self,
            other => Self::Phase {
                phase,
                source: Box::new(other),
            },
        }
    }

    /// The error with any phase tag removed
    pub fn root(&self) -> &AppError {
        match self {
            Self::Phase { source, .. } => source.root(),
            other => other,
        }
    }

    /// Phase this error was tagged with, if any
    pub fn phase(&self) -> Option<Phase> {
        match self {
            Self::Phase { phase, .. } => Some(*phase),
            _ => None,
        }
    }

    /// Get error category for logging and reporting
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG",
            Self::Validation(_) => "VALIDATION",
            Self::Parse(_) => "PARSE",
            Self::Io(_) => "IO",
            Self::Network(_) => "NETWORK",
            Self::HttpRequest(_) => "HTTP",
            Self::Timeout(_) => "TIMEOUT",
            Self::ConfigFetch(_) => "CONFIG_FETCH",
            Self::ConfigParse(_) => "CONFIG_PARSE",
            Self::NoServersDiscovered(_) => "NO_SERVERS",
            Self::NoBestServer(_) => "NO_BEST_SERVER",
            Self::ZeroBytesUploaded(_) => "ZERO_UPLOAD",
            Self::InvalidSourceIp(_) => "SOURCE_IP",
            Self::Phase { source, .. } => source.category(),
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Check if error is recoverable (can retry)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Network(_) | Self::HttpRequest(_) | Self::Timeout(_) => true,
            Self::ConfigFetch(_) | Self::NoServersDiscovered(_) | Self::ZeroBytesUploaded(_) => true,
            Self::Config(_) | Self::Validation(_) | Self::Parse(_) | Self::InvalidSourceIp(_) => false,
            Self::ConfigParse(_) | Self::NoBestServer(_) | Self::Io(_) | Self::Internal(_) => false,
            Self::Phase { source, .. } => source.is_recoverable(),
        }
    }

    /// Get exit code for this error type
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Validation(_) | Self::Parse(_) | Self::InvalidSourceIp(_) => 1,
            Self::Network(_) | Self::HttpRequest(_) | Self::ConfigFetch(_) | Self::ConfigParse(_) => 2,
            Self::Timeout(_) => 3,
            Self::NoServersDiscovered(_) | Self::NoBestServer(_) => 4,
            Self::Io(_) => 5,
            Self::ZeroBytesUploaded(_) => 6,
            Self::Phase { source, .. } => source.exit_code(),
            Self::Internal(_) => 99,
        }
    }

    /// Format error for console display with color coding
    pub fn format_for_console(&self, use_color: bool) -> String {
        let category = self.category();
        let message = self.to_string();

        if !use_color {
            return format!("[{}] {}", category, message);
        }

        use colored::Colorize;
        match self.root() {
            Self::Config(_) | Self::Validation(_) | Self::Parse(_) | Self::InvalidSourceIp(_) => {
                format!("[{}] {}", category.red().bold(), message.red())
            }
            Self::Network(_) | Self::HttpRequest(_) | Self::ConfigFetch(_) | Self::ConfigParse(_) => {
                format!("[{}] {}", category.yellow().bold(), message.yellow())
            }
            Self::Timeout(_) => format!("[{}] {}", category.blue().bold(), message.blue()),
            Self::NoServersDiscovered(_) | Self::NoBestServer(_) | Self::ZeroBytesUploaded(_) => {
                format!("[{}] {}", category.magenta().bold(), message.magenta())
            }
            _ => format!("[{}] {}", category.bright_red().bold(), message.bright_red()),
        }
    }

    /// Get user-friendly suggestion for this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self.root() {
            Self::ConfigFetch(_) | Self::Network(_) => {
                Some("Check your internet connection, or try --secure if plain HTTP is blocked.")
            }
            Self::NoServersDiscovered(_) => {
                Some("The server list may be unreachable; a private server can be used with --mini <url>.")
            }
            Self::NoBestServer(_) => Some("No candidate answered its latency probe; try again or use --mini <url>."),
            Self::ZeroBytesUploaded(_) => {
                Some("Check the upload URL and server response, or increase --timeout.")
            }
            Self::Timeout(_) => Some("Increase the timeout with --timeout or --run-timeout."),
            Self::InvalidSourceIp(_) => Some("--source must be an address assigned to a local interface."),
            _ => None,
        }
    }
}

// Standard library error conversions
impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::io(error.to_string())
    }
}

impl From<url::ParseError> for AppError {
    fn from(error: url::ParseError) -> Self {
        Self::parse(format!("URL parse error: {}", error))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        Self::parse(format!("JSON error: {}", error))
    }
}

impl From<quick_xml::Error> for AppError {
    fn from(error: quick_xml::Error) -> Self {
        Self::parse(format!("XML error: {}", error))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::timeout(error.to_string())
        } else if error.is_connect() || error.is_request() {
            Self::network(error.to_string())
        } else {
            Self::http_request(error.to_string())
        }
    }
}

impl From<dotenv::Error> for AppError {
    fn from(error: dotenv::Error) -> Self {
        Self::config(format!("Environment file error: {}", error))
    }
}

impl From<std::num::ParseIntError> for AppError {
    fn from(error: std::num::ParseIntError) -> Self {
        Self::parse(format!("Integer parse error: {}", error))
    }
}

impl From<std::num::ParseFloatError> for AppError {
    fn from(error: std::num::ParseFloatError) -> Self {
        Self::parse(format!("Float parse error: {}", error))
    }
}

impl From<std::net::AddrParseError> for AppError {
    fn from(error: std::net::AddrParseError) -> Self {
        Self::parse(format!("IP address parse error: {}", error))
    }
}

/// Custom Result type for the application
pub type Result<T> = std::result::Result<T, AppError>;

/// Error reporter for user feedback on stderr
pub struct ErrorReporter {
    pub use_color: bool,
    pub verbose: bool,
}

impl ErrorReporter {
    pub fn new(use_color: bool, verbose: bool) -> Self {
        Self { use_color, verbose }
    }

    /// Render the report as text
    pub fn render(&self, error: &AppError) -> String {
        let mut report = error.format_for_console(self.use_color);

        if let Some(suggestion) = error.suggestion() {
            report.push_str("\n\nSuggestion: ");
            report.push_str(suggestion);
        }

        if self.verbose && error.is_recoverable() {
            report.push_str("\n\nThis error might be temporary. You can try running the command again.");
        }

        report
    }

    /// Report an error to the user
    pub fn report_error(&self, error: &AppError) {
        eprintln!("{}", self.render(error));
    }
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self::new(true, false)
    }
}
