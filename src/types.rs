//! Type definitions and aliases

use serde::{Deserialize, Serialize};
use std::fmt;

// Re-export commonly used types
pub use crate::error::{AppError, Result};

/// Stage of a measurement run, used to label errors and log entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Fetching the client configuration document
    Config,
    /// Fetching and filtering the server catalog
    Discovery,
    /// Latency probing and active server selection
    Selection,
    /// Download throughput phase
    Download,
    /// Upload throughput phase
    Upload,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Config => "config",
            Phase::Discovery => "discovery",
            Phase::Selection => "selection",
            Phase::Download => "download",
            Phase::Upload => "upload",
        }
    }

    /// Capitalized label used in progress lines
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Config => "Config",
            Phase::Discovery => "Discovery",
            Phase::Selection => "Selection",
            Phase::Download => "Download",
            Phase::Upload => "Upload",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the final measurement is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputMode {
    /// Progress chatter plus a colored line per phase
    #[default]
    Human,
    /// Ping, download and upload on three lines
    Simple,
    /// One delimited row, optionally preceded by a header
    Csv,
    /// Structured JSON object
    Json,
}

impl OutputMode {
    /// Resolve the mode from flags; simple wins over csv, csv over json
    pub fn from_flags(simple: bool, csv: bool, json: bool) -> Self {
        if simple {
            Self::Simple
        } else if csv {
            Self::Csv
        } else if json {
            Self::Json
        } else {
            Self::Human
        }
    }

    /// Whether progress lines and the "Hosted by" line are shown
    pub fn is_human(&self) -> bool {
        matches!(self, Self::Human)
    }
}
