//! Result formatting
//!
//! Pure functions turning a completed [`Results`] into text. Human mode has
//! no formatter: its lines are written while the run progresses.

use super::colored::{paint, ping_color};
use crate::error::{AppError, Result};
use crate::models::{Results, Server};
use serde::Serialize;

pub const CSV_HEADER: [&str; 8] = [
    "Server ID",
    "Sponsor",
    "Server Name",
    "Distance",
    "Ping",
    "Download(bps)",
    "Upload(bps)",
    "IP",
];

/// Convert bits per second to the display unit: MB/s when `bytes` is set,
/// otherwise Mbps
pub fn format_rate(bits_per_second: f64, bytes: bool) -> (f64, &'static str) {
    if bytes {
        (bits_per_second / 8.0 / 1e6, "MB/s")
    } else {
        (bits_per_second / 1e6, "Mbps")
    }
}

/// Renders the final measurement
pub trait OutputFormatter: Send + Sync {
    fn format_results(&self, results: &Results) -> Result<String>;
}

/// Three lines: ping, download, upload
#[derive(Debug, Clone)]
pub struct SimpleFormatter {
    pub bytes_mode: bool,
    pub use_color: bool,
}

impl OutputFormatter for SimpleFormatter {
    fn format_results(&self, results: &Results) -> Result<String> {
        let ping = paint(
            &format!("{:.2} ms", results.ping()),
            ping_color(results.ping()),
            self.use_color,
        );
        let (download, download_unit) = format_rate(results.download(), self.bytes_mode);
        let (upload, upload_unit) = format_rate(results.upload(), self.bytes_mode);

        Ok(format!(
            "Ping: {}\nDownload: {:.2} {}\nUpload: {:.2} {}\n",
            ping, download, download_unit, upload, upload_unit
        ))
    }
}

/// One delimited row, optionally preceded by the header
#[derive(Debug, Clone)]
pub struct CsvFormatter {
    pub delimiter: char,
    pub header: bool,
}

impl CsvFormatter {
    fn join(&self, fields: &[String]) -> String {
        let delimiter = self.delimiter.to_string();
        fields
            .iter()
            .map(|field| quote_field(field, self.delimiter))
            .collect::<Vec<_>>()
            .join(&delimiter)
    }
}

impl OutputFormatter for CsvFormatter {
    fn format_results(&self, results: &Results) -> Result<String> {
        let server = results
            .server()
            .ok_or_else(|| AppError::internal("no server recorded for CSV output"))?;

        let mut out = String::new();
        if self.header {
            let header: Vec<String> = CSV_HEADER.iter().map(|h| h.to_string()).collect();
            out.push_str(&self.join(&header));
            out.push('\n');
        }

        let row = vec![
            server.id.to_string(),
            server.sponsor.clone(),
            server.name.clone(),
            format!("{:.2}", server.distance),
            format!("{:.2}", results.ping()),
            format!("{:.2}", results.download()),
            format!("{:.2}", results.upload()),
            results.client_ip().to_string(),
        ];
        out.push_str(&self.join(&row));
        out.push('\n');
        Ok(out)
    }
}

/// Quote a field that contains the delimiter, quotes or line breaks
fn quote_field(field: &str, delimiter: char) -> String {
    if field.contains(delimiter) || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[derive(Serialize)]
struct JsonClient<'a> {
    ip: &'a str,
    isp: &'a str,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    ping: f64,
    download: f64,
    upload: f64,
    bytes_sent: u64,
    bytes_received: u64,
    server: Option<&'a Server>,
    client: JsonClient<'a>,
}

/// Pretty-printed JSON object
#[derive(Debug, Clone, Default)]
pub struct JsonFormatter;

impl OutputFormatter for JsonFormatter {
    fn format_results(&self, results: &Results) -> Result<String> {
        let report = JsonReport {
            ping: results.ping(),
            download: results.download(),
            upload: results.upload(),
            bytes_sent: results.bytes_sent(),
            bytes_received: results.bytes_received(),
            server: results.server(),
            client: JsonClient {
                ip: results.client_ip(),
                isp: results.isp(),
            },
        };
        let mut json = serde_json::to_string_pretty(&report)?;
        json.push('\n');
        Ok(json)
    }
}

/// `--list` output: one line per server
pub fn format_server_list(servers: &[Server]) -> String {
    servers
        .iter()
        .map(|s| format!("{:>5}) {} ({}, {}) [{:.2} km]\n", s.id, s.sponsor, s.name, s.country, s.distance))
        .collect()
}

/// The line announcing the selected server
pub fn hosted_by_line(server: &Server, use_color: bool) -> String {
    format!(
        "Hosted by {} ({}) [{:.2} km]: {}\n",
        server.sponsor,
        server.name,
        server.distance,
        paint(&format!("{:.2} ms", server.latency), ping_color(server.latency), use_color)
    )
}
