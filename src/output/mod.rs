//! Output formatting and display system
//!
//! Everything a run prints goes through an [`OutputSink`]. Human mode writes
//! progress as it happens; the machine-readable modes render the finished
//! [`Results`](crate::models::Results) once through an [`OutputFormatter`].

pub mod banner;
pub mod colored;
pub mod formatter;
pub mod sink;

pub use formatter::{
    format_rate, format_server_list, hosted_by_line, CsvFormatter, JsonFormatter, OutputFormatter,
    SimpleFormatter,
};
pub use sink::{strip_ansi, BufferedSink, ConsoleSink, OutputSink, StreamingSink};

use crate::models::Config;
use crate::types::OutputMode;

/// Output formatting factory for creating appropriate formatters
pub struct OutputFormatterFactory;

impl OutputFormatterFactory {
    /// Formatter for the configured mode; `None` in human mode, where results
    /// are written while the run progresses
    pub fn create(config: &Config) -> Option<Box<dyn OutputFormatter>> {
        match config.output_mode() {
            OutputMode::Human => None,
            OutputMode::Simple => Some(Box::new(SimpleFormatter {
                bytes_mode: config.bytes,
                use_color: config.enable_color,
            })),
            OutputMode::Csv => Some(Box::new(CsvFormatter {
                delimiter: config.delimiter(),
                header: config.csv_header,
            })),
            OutputMode::Json => Some(Box::new(JsonFormatter)),
        }
    }
}
