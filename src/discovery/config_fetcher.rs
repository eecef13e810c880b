//! Client configuration document
//!
//! The config endpoint answers with a small XML document:
//!
//! ```xml
//! <settings>
//!   <client ip="203.0.113.9" lat="-41.28" lon="174.77" isp="Example Net"/>
//!   <server-config threadcount="4" ignoreids="1,2,3"/>
//! </settings>
//! ```

use super::geo;
use crate::client::Transport;
use crate::context::RunContext;
use crate::error::{AppError, Result};
use crate::models::ClientLocation;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::sync::Arc;

/// What the run needs from the config document
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClientSettings {
    pub location: ClientLocation,
    /// Server ids the catalog must skip
    pub ignore_ids: Vec<u32>,
}

/// Fetches and parses the config document
pub struct ConfigFetcher {
    transport: Arc<dyn Transport>,
    url: String,
}

impl ConfigFetcher {
    pub fn new(transport: Arc<dyn Transport>, url: impl Into<String>) -> Self {
        Self {
            transport,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// One GET, no retries
    pub async fn fetch_settings(&self, ctx: &RunContext) -> Result<ClientSettings> {
        let (status, body) = ctx
            .run(self.transport.get_text(&self.url))
            .await
            .map_err(|e| match e {
                AppError::Timeout(_) => e,
                other => AppError::config_fetch(other.to_string()),
            })?;

        if status != 200 {
            return Err(AppError::config_fetch(format!(
                "config returned status {} from {}",
                status, self.url
            )));
        }

        parse_settings(&body)
    }

    pub async fn fetch_client_config(&self, ctx: &RunContext) -> Result<ClientLocation> {
        Ok(self.fetch_settings(ctx).await?.location)
    }
}

/// Parse the config document
pub fn parse_settings(document: &str) -> Result<ClientSettings> {
    let mut reader = Reader::from_str(document);
    let mut location = None;
    let mut ignore_ids = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(element)) | Ok(Event::Empty(element)) => match element.name().as_ref() {
                b"client" => location = Some(parse_client(&element)?),
                b"server-config" => {
                    if let Some(ids) = attribute(&element, "ignoreids") {
                        ignore_ids = parse_id_list(&ids);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(AppError::config_parse(format!(
                    "malformed XML at position {}: {}",
                    reader.error_position(),
                    e
                )))
            }
        }
    }

    let location = location.ok_or_else(|| AppError::config_parse("no <client> element in config document"))?;
    Ok(ClientSettings { location, ignore_ids })
}

fn parse_client(element: &BytesStart<'_>) -> Result<ClientLocation> {
    let coordinate = |name: &str| -> Result<f64> {
        let raw = attribute(element, name)
            .ok_or_else(|| AppError::config_parse(format!("client element has no {} attribute", name)))?;
        raw.trim()
            .parse::<f64>()
            .map_err(|e| AppError::config_parse(format!("client {} '{}': {}", name, raw, e)))
    };

    let (lat, lon) = (coordinate("lat")?, coordinate("lon")?);
    if !geo::is_valid_position(lat, lon) {
        return Err(AppError::config_parse(format!("client position ({}, {}) is out of range", lat, lon)));
    }

    Ok(ClientLocation {
        lat,
        lon,
        ip: attribute(element, "ip").unwrap_or_default(),
        isp: attribute(element, "isp").unwrap_or_default(),
    })
}

/// Unescaped value of an attribute, `None` when absent or undecodable
pub(crate) fn attribute(element: &BytesStart<'_>, name: &str) -> Option<String> {
    element
        .try_get_attribute(name)
        .ok()
        .flatten()
        .and_then(|attr| attr.unescape_value().ok().map(|value| value.into_owned()))
}

/// Comma separated ids; entries that are not numbers are ignored
fn parse_id_list(raw: &str) -> Vec<u32> {
    raw.split(',')
        .filter_map(|id| id.trim().parse::<u32>().ok())
        .collect()
}
