//! Measurement results built up over one run

use crate::models::{ClientLocation, Server};
use crate::types::{AppError, Result};
use serde::Serialize;

/// Results of one run. Every field is written at most once.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Results {
    ping: Option<f64>,
    download: Option<f64>,
    upload: Option<f64>,
    bytes_sent: Option<u64>,
    bytes_received: Option<u64>,
    server: Option<Server>,
    client_ip: String,
    isp: String,
}

impl Results {
    pub fn new(location: &ClientLocation) -> Self {
        Self {
            client_ip: location.ip.clone(),
            isp: location.isp.clone(),
            ..Self::default()
        }
    }

    /// Record the active server and its latency as the ping
    pub fn record_server(&mut self, server: &Server) -> Result<()> {
        set_once(&mut self.server, server.clone(), "server")?;
        set_once(&mut self.ping, server.latency, "ping")
    }

    /// Record the download bitrate and bytes received
    pub fn record_download(&mut self, bits_per_second: f64, bytes: u64) -> Result<()> {
        set_once(&mut self.download, bits_per_second, "download")?;
        set_once(&mut self.bytes_received, bytes, "bytes received")
    }

    /// Record the upload bitrate and bytes sent
    pub fn record_upload(&mut self, bits_per_second: f64, bytes: u64) -> Result<()> {
        set_once(&mut self.upload, bits_per_second, "upload")?;
        set_once(&mut self.bytes_sent, bytes, "bytes sent")
    }

    /// Ping in milliseconds, 0 when no server was selected
    pub fn ping(&self) -> f64 {
        self.ping.unwrap_or(0.0)
    }

    /// Download bitrate in bits per second, 0 when skipped
    pub fn download(&self) -> f64 {
        self.download.unwrap_or(0.0)
    }

    /// Upload bitrate in bits per second, 0 when skipped
    pub fn upload(&self) -> f64 {
        self.upload.unwrap_or(0.0)
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.unwrap_or(0)
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.unwrap_or(0)
    }

    pub fn server(&self) -> Option<&Server> {
        self.server.as_ref()
    }

    pub fn client_ip(&self) -> &str {
        &self.client_ip
    }

    pub fn isp(&self) -> &str {
        &self.isp
    }

    pub fn has_download(&self) -> bool {
        self.download.is_some()
    }

    pub fn has_upload(&self) -> bool {
        self.upload.is_some()
    }
}

fn set_once<T>(slot: &mut Option<T>, value: T, what: &str) -> Result<()> {
    if slot.is_some() {
        return Err(AppError::internal(format!("{} was already recorded for this run", what)));
    }
    *slot = Some(value);
    Ok(())
}
