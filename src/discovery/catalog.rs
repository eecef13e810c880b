//! Server catalog discovery
//!
//! The catalog is a large XML list of `<server>` elements. It is read token by
//! token straight off the response body, computing each server's distance as
//! soon as its element is seen.

use super::config_fetcher::attribute;
use super::geo;
use crate::client::Transport;
use crate::context::RunContext;
use crate::defaults::MINI_SPONSOR;
use crate::error::{AppError, Result};
use crate::logging::Logger;
use crate::models::{ClientLocation, Server};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::sync::Arc;
use tokio::io::AsyncBufRead;
use tokio::time::Instant;

/// Fetches the server list from an ordered set of candidate URLs
pub struct ServerCatalog {
    transport: Arc<dyn Transport>,
    urls: Vec<String>,
    logger: Logger,
}

impl ServerCatalog {
    pub fn new(transport: Arc<dyn Transport>, urls: Vec<String>, logger: Logger) -> Self {
        Self { transport, urls, logger }
    }

    /// Try each candidate URL in order until one yields at least one server.
    /// Servers listed in `ignore_ids` are dropped.
    pub async fn fetch_servers(
        &self,
        ctx: &RunContext,
        location: &ClientLocation,
        ignore_ids: &[u32],
    ) -> Result<Vec<Server>> {
        let mut last_error: Option<AppError> = None;

        for url in &self.urls {
            let stream = match ctx.run(self.transport.open_stream(url)).await {
                Ok(stream) => stream,
                Err(e @ AppError::Timeout(_)) if ctx.is_cancelled() => return Err(e),
                Err(e) => {
                    self.logger
                        .debug(&format!("Server list {} unavailable: {}", url, e))
                        .field("url", url.as_str())
                        .error_info(&e)
                        .log()
                        .await;
                    last_error = Some(e);
                    continue;
                }
            };

            let (servers, stream_error) = ctx
                .run(async { Ok(read_servers(stream, location, ignore_ids).await) })
                .await?;

            if let Some(e) = stream_error {
                self.logger
                    .debug(&format!(
                        "Server list {} broke off after {} servers: {}",
                        url,
                        servers.len(),
                        e
                    ))
                    .field("url", url.as_str())
                    .field("servers", servers.len())
                    .log()
                    .await;
                last_error = Some(e);
            }

            if !servers.is_empty() {
                self.logger
                    .debug(&format!("Discovered {} servers from {}", servers.len(), url))
                    .field("url", url.as_str())
                    .field("servers", servers.len())
                    .log()
                    .await;
                return Ok(servers);
            }
        }

        Err(AppError::no_servers(match last_error {
            Some(e) => e.to_string(),
            None => "every server list was empty".to_string(),
        }))
    }

    /// Single-entry list for a private server, bypassing the catalog and the
    /// prober. The reachability GET's round trip becomes the server latency.
    pub async fn use_mini_server(&self, ctx: &RunContext, url: &str) -> Result<Server> {
        let mut server = Server::from_url(0, url, MINI_SPONSOR, "", "", 0.0)?;
        server.name = server.host.clone();

        let started = Instant::now();
        ctx.run(self.transport.get_text(url)).await.map_err(|e| match e {
            AppError::Timeout(_) => e,
            other => AppError::network(format!("mini server {} unreachable: {}", url, other)),
        })?;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        Ok(server.with_latency(latency_ms))
    }
}

/// Read `<server>` elements until the document ends or the stream breaks.
/// Entries read before a failure are returned alongside the error.
pub async fn read_servers<R>(source: R, location: &ClientLocation, ignore_ids: &[u32]) -> (Vec<Server>, Option<AppError>)
where
    R: AsyncBufRead + Unpin,
{
    let mut reader = Reader::from_reader(source);
    let mut buf = Vec::new();
    let mut servers = Vec::new();

    loop {
        match reader.read_event_into_async(&mut buf).await {
            Ok(Event::Start(element)) | Ok(Event::Empty(element)) if element.name().as_ref() == b"server" => {
                if let Some(server) = parse_server(&element, location) {
                    if !ignore_ids.contains(&server.id) {
                        servers.push(server);
                    }
                }
            }
            Ok(Event::Eof) => return (servers, None),
            Ok(_) => {}
            Err(e) => return (servers, Some(AppError::parse(format!("server list: {}", e)))),
        }
        buf.clear();
    }
}

/// One catalog entry; `None` when the id, URL or coordinates are unusable
fn parse_server(element: &BytesStart<'_>, location: &ClientLocation) -> Option<Server> {
    let id = attribute(element, "id")?.trim().parse::<u32>().ok()?;
    let lat = attribute(element, "lat")?.trim().parse::<f64>().ok()?;
    let lon = attribute(element, "lon")?.trim().parse::<f64>().ok()?;
    if !geo::is_valid_position(lat, lon) {
        return None;
    }
    let url = attribute(element, "url")?;

    Server::from_url(
        id,
        &url,
        attribute(element, "sponsor").unwrap_or_default(),
        attribute(element, "name").unwrap_or_default(),
        attribute(element, "country").unwrap_or_default(),
        geo::distance(location.lat, location.lon, lat, lon),
    )
    .ok()
}

/// The `n` nearest servers, ascending by distance; equal distances keep
/// catalog order. The input is left untouched.
pub fn closest(servers: &[Server], n: usize) -> Vec<Server> {
    let mut ranked = servers.to_vec();
    ranked.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    ranked.truncate(n);
    ranked
}

/// Restrict to the requested ids; an empty request keeps everything
pub fn filter_by_ids(servers: Vec<Server>, ids: &[u32]) -> Vec<Server> {
    if ids.is_empty() {
        return servers;
    }
    servers.into_iter().filter(|s| ids.contains(&s.id)).collect()
}
