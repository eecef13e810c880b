//! Scripted [`Transport`] for unit tests

use super::{ByteStream, Transport};
use crate::error::{AppError, Result};
use crate::executor::payload::UploadBody;
use crate::executor::progress::TransferTally;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::io::StreamReader;

/// How each download request behaves
#[derive(Debug, Clone, Copy)]
pub struct DownloadBehavior {
    /// Bytes recorded as soon as the request starts
    pub bytes_per_request: u64,
    /// Time the request stays open after delivering its bytes
    pub hold: Duration,
}

impl Default for DownloadBehavior {
    fn default() -> Self {
        Self {
            bytes_per_request: 0,
            hold: Duration::ZERO,
        }
    }
}

/// How each upload request behaves
#[derive(Debug, Clone, Copy, Default)]
pub enum UploadBehavior {
    /// Read the whole body and answer 200
    #[default]
    Consume,
    /// Answer with this status without reading the body
    Reject(u16),
    /// Read the whole body, then answer with this status
    ReadThenReject(u16),
    /// Pull `chunk` bytes at a time, pausing between chunks, then answer 200
    Trickle { chunk: usize, pause: Duration },
}

#[derive(Default)]
pub struct MockTransport {
    texts: HashMap<String, (u16, String)>,
    broken_streams: HashSet<String>,
    probe_delays: HashMap<String, Duration>,
    failing_probes: HashSet<String>,
    download: DownloadBehavior,
    upload: UploadBehavior,
    calls: Mutex<Vec<String>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` with `status` for GETs of `url`
    pub fn with_text(mut self, url: &str, status: u16, body: &str) -> Self {
        self.texts.insert(url.to_string(), (status, body.to_string()));
        self
    }

    /// Streams of `url` fail with an I/O error after the canned body
    pub fn with_broken_stream(mut self, url: &str) -> Self {
        self.broken_streams.insert(url.to_string());
        self
    }

    /// Probes against `host` take `delay` and succeed
    pub fn with_probe(mut self, host: &str, delay: Duration) -> Self {
        self.probe_delays.insert(host.to_string(), delay);
        self
    }

    /// Probes against `host` fail with a connection error
    pub fn with_failing_probe(mut self, host: &str) -> Self {
        self.failing_probes.insert(host.to_string());
        self
    }

    pub fn with_download(mut self, behavior: DownloadBehavior) -> Self {
        self.download = behavior;
        self
    }

    pub fn with_upload(mut self, behavior: UploadBehavior) -> Self {
        self.upload = behavior;
        self
    }

    /// Every request made so far, as `METHOD url`
    pub fn calls(&self) -> Vec<String> {
        match self.calls.lock() {
            Ok(calls) => calls.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn record(&self, method: &str, url: &str) {
        let mut calls = match self.calls.lock() {
            Ok(calls) => calls,
            Err(poisoned) => poisoned.into_inner(),
        };
        calls.push(format!("{} {}", method, url));
    }

    fn canned(&self, url: &str) -> Result<(u16, String)> {
        self.texts
            .get(url)
            .cloned()
            .ok_or_else(|| AppError::network(format!("connection refused: {}", url)))
    }
}

fn host_of(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default()
}

#[async_trait]
impl Transport for MockTransport {
    async fn get_text(&self, url: &str) -> Result<(u16, String)> {
        self.record("GET", url);
        self.canned(url)
    }

    async fn open_stream(&self, url: &str) -> Result<ByteStream> {
        self.record("GET", url);
        let (status, body) = self.canned(url)?;
        if status != 200 {
            return Err(AppError::http_request(format!("HTTP {} from {}", status, url)));
        }
        if self.broken_streams.contains(url) {
            let chunks: Vec<std::io::Result<Cursor<Vec<u8>>>> = vec![
                Ok(Cursor::new(body.into_bytes())),
                Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "connection reset")),
            ];
            return Ok(Box::new(StreamReader::new(futures::stream::iter(chunks))));
        }
        Ok(Box::new(Cursor::new(body.into_bytes())))
    }

    async fn probe(&self, url: &str) -> Result<u16> {
        self.record("GET", url);
        let host = host_of(url);
        if self.failing_probes.contains(&host) {
            return Err(AppError::network(format!("connection refused: {}", host)));
        }
        let delay = self.probe_delays.get(&host).copied().unwrap_or_default();
        tokio::time::sleep(delay).await;
        Ok(200)
    }

    async fn download(&self, url: &str, tally: &TransferTally) -> Result<u64> {
        self.record("GET", url);
        tally.record(self.download.bytes_per_request);
        tokio::time::sleep(self.download.hold).await;
        Ok(self.download.bytes_per_request)
    }

    async fn upload(&self, url: &str, body: UploadBody) -> Result<u16> {
        self.record("POST", url);
        match self.upload {
            UploadBehavior::Consume => {
                body.drain()?;
                Ok(200)
            }
            UploadBehavior::Reject(status) => Ok(status),
            UploadBehavior::ReadThenReject(status) => {
                body.drain()?;
                Ok(status)
            }
            UploadBehavior::Trickle { chunk, pause } => {
                for piece in body.into_chunks(chunk) {
                    piece?;
                    tokio::time::sleep(pause).await;
                }
                Ok(200)
            }
        }
    }
}
