//! Measurement server and client location models

use crate::types::{AppError, Result};
use serde::{Deserialize, Serialize};

/// Caller location reported by the config document
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClientLocation {
    pub lat: f64,
    pub lon: f64,
    pub ip: String,
    pub isp: String,
}

/// One measurement server from the catalog (or the mini override)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Server {
    pub id: u32,
    pub sponsor: String,
    pub name: String,
    pub country: String,
    /// URL as advertised by the catalog
    pub url: String,
    pub scheme: String,
    /// Host with optional port
    pub host: String,
    /// Average probe latency in milliseconds, set by selection
    pub latency: f64,
    /// Distance from the client in kilometers
    pub distance: f64,
}

impl Server {
    /// Build a server from its advertised URL; scheme and host come from the URL
    pub fn from_url(
        id: u32,
        raw_url: &str,
        sponsor: impl Into<String>,
        name: impl Into<String>,
        country: impl Into<String>,
        distance: f64,
    ) -> Result<Self> {
        let (scheme, host) = split_origin(raw_url)?;
        Ok(Self {
            id,
            sponsor: sponsor.into(),
            name: name.into(),
            country: country.into(),
            url: raw_url.trim().to_string(),
            scheme,
            host,
            latency: 0.0,
            distance: distance.max(0.0),
        })
    }

    /// This server with its measured latency recorded
    pub fn with_latency(mut self, latency_ms: f64) -> Self {
        self.latency = latency_ms.max(0.0);
        self
    }

    /// `{scheme}://{host}`
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.scheme, self.host)
    }

    /// Latency probe endpoint; the transport appends the cache-busting query
    pub fn latency_url(&self) -> String {
        format!("{}/latency.txt", self.base_url())
    }

    /// Synthetic image URLs of increasing size
    pub fn download_urls(&self) -> Vec<String> {
        let base = self.base_url();
        crate::defaults::DOWNLOAD_SIZES
            .iter()
            .map(|size| format!("{}/random{}x{}.jpg", base, size, size))
            .collect()
    }

    /// `upload.php` next to the advertised URL, or at the host root when the
    /// advertised URL cannot be resolved
    pub fn upload_url(&self) -> String {
        url::Url::parse(&self.url)
            .and_then(|advertised| advertised.join("upload.php"))
            .ok()
            .filter(|resolved| resolved.host_str().is_some())
            .map(|mut resolved| {
                resolved.set_query(None);
                resolved.set_fragment(None);
                resolved.to_string()
            })
            .unwrap_or_else(|| format!("{}/upload.php", self.base_url()))
    }
}

/// Split a URL into its scheme and `host[:port]`
fn split_origin(raw: &str) -> Result<(String, String)> {
    let parsed = url::Url::parse(raw.trim())?;
    let host = parsed
        .host_str()
        .ok_or_else(|| AppError::parse(format!("URL has no host: {}", raw)))?;
    let host = match parsed.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };
    Ok((parsed.scheme().to_string(), host))
}
