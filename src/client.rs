//! HTTP transport for configuration, catalog, probe and transfer requests

#[cfg(test)]
pub mod mock;


use crate::{
    error::{AppError, Result},
    executor::payload::{UploadBody, UPLOAD_CHUNK_SIZE},
    executor::progress::TransferTally,
    logging::NetworkLogger,
    models::Config,
};
use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{redirect, Client, Url};
use std::{
    io,
    net::{IpAddr, SocketAddr, UdpSocket},
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};
use tokio::io::AsyncBufRead;
use tokio_util::io::StreamReader;

/// Response body exposed as a buffered async reader
pub type ByteStream = Box<dyn AsyncBufRead + Send + Unpin>;

/// Per-run HTTP settings
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Local address outbound connections are bound to
    pub source: Option<IpAddr>,
    /// Timeout applied to each request, body included
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            source: None,
            timeout: crate::defaults::DEFAULT_TIMEOUT,
            user_agent: crate::USER_AGENT.to_string(),
        }
    }
}

impl ClientConfig {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            source: config.source_ip()?,
            timeout: config.timeout(),
            user_agent: crate::USER_AGENT.to_string(),
        })
    }

    /// Check that the source address belongs to a local interface.
    /// Binding fails for addresses the host does not own.
    pub fn validate_source(&self) -> Result<()> {
        let Some(ip) = self.source else {
            return Ok(());
        };
        UdpSocket::bind(SocketAddr::new(ip, 0))
            .map(|_| ())
            .map_err(|e| AppError::invalid_source_ip(format!("{} is not assigned to a local interface: {}", ip, e)))
    }
}

/// Network operations used by a measurement run
#[async_trait]
pub trait Transport: Send + Sync {
    /// GET a small document, returning the status and body
    async fn get_text(&self, url: &str) -> Result<(u16, String)>;

    /// GET a document that is consumed incrementally; non-200 is an error
    async fn open_stream(&self, url: &str) -> Result<ByteStream>;

    /// GET with a cache-busting query and discard the body, returning the status
    async fn probe(&self, url: &str) -> Result<u16>;

    /// GET and count every body chunk into `tally` as it arrives.
    /// Returns the bytes read by this request.
    async fn download(&self, url: &str, tally: &TransferTally) -> Result<u64>;

    /// POST `body` with an explicit `Content-Length`, returning the status
    async fn upload(&self, url: &str, body: UploadBody) -> Result<u16>;
}

/// reqwest-backed transport; one client per run
pub struct HttpTransport {
    client: Client,
    logger: NetworkLogger,
    sequence: AtomicU64,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig, logger: NetworkLogger) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(config.timeout)
            .redirect(redirect::Policy::none())
            .user_agent(config.user_agent.clone());
        if let Some(source) = config.source {
            builder = builder.local_address(source);
        }
        let client = builder
            .build()
            .map_err(|e| AppError::network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            logger,
            sequence: AtomicU64::new(0),
        })
    }

    /// Append `x={nanos}.{seq}` so intermediaries never serve a cached response
    fn cache_bust(&self, url: &str) -> Result<String> {
        let mut parsed = Url::parse(url)?;
        let stamp = format!(
            "{}.{}",
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default(),
            self.sequence.fetch_add(1, Ordering::Relaxed)
        );
        parsed.query_pairs_mut().append_pair("x", &stamp);
        Ok(parsed.to_string())
    }

    async fn send(&self, method: &str, url: &str, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let started = Instant::now();
        match request.send().await {
            Ok(response) => {
                self.logger
                    .log_http_request(url, method, Some(response.status().as_u16()), elapsed_ms(started))
                    .await;
                Ok(response)
            }
            Err(e) => {
                let error = AppError::from(e);
                self.logger.log_request_error(url, method, &error).await;
                Err(error)
            }
        }
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

fn status_error(url: &str, status: reqwest::StatusCode) -> AppError {
    AppError::http_request(format!("HTTP {} from {}", status.as_u16(), url))
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get_text(&self, url: &str) -> Result<(u16, String)> {
        let response = self.send("GET", url, self.client.get(url)).await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok((status, body))
    }

    async fn open_stream(&self, url: &str) -> Result<ByteStream> {
        let response = self.send("GET", url, self.client.get(url)).await?;
        if response.status() != reqwest::StatusCode::OK {
            return Err(status_error(url, response.status()));
        }
        let body = response.bytes_stream().map_err(io::Error::other);
        Ok(Box::new(StreamReader::new(Box::pin(body))))
    }

    async fn probe(&self, url: &str) -> Result<u16> {
        let target = self.cache_bust(url)?;
        let response = self.send("GET", &target, self.client.get(&target)).await?;
        let status = response.status().as_u16();
        response.bytes().await?;
        Ok(status)
    }

    async fn download(&self, url: &str, tally: &TransferTally) -> Result<u64> {
        let mut response = self.send("GET", url, self.client.get(url)).await?;
        if !response.status().is_success() {
            return Err(status_error(url, response.status()));
        }

        let mut received = 0u64;
        while let Some(chunk) = response.chunk().await? {
            received += chunk.len() as u64;
            tally.record(chunk.len() as u64);
        }
        Ok(received)
    }

    async fn upload(&self, url: &str, body: UploadBody) -> Result<u16> {
        let target = self.cache_bust(url)?;
        let len = body.len();
        let chunks = futures::stream::iter(body.into_chunks(UPLOAD_CHUNK_SIZE));
        let request = self
            .client
            .post(&target)
            .header(CONTENT_LENGTH, len)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(reqwest::Body::wrap_stream(chunks));

        let response = self.send("POST", &target, request).await?;
        let status = response.status().as_u16();
        response.bytes().await?;
        Ok(status)
    }
}
