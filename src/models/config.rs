//! Run configuration data model and validation

use crate::types::{AppError, OutputMode, Result};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

/// Every option recognized by a measurement run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Skip the download phase
    #[serde(default)]
    pub no_download: bool,

    /// Skip the upload phase
    #[serde(default)]
    pub no_upload: bool,

    /// Use a single connection for both transfer phases
    #[serde(default)]
    pub single: bool,

    /// Report MB/s instead of Mbps
    #[serde(default)]
    pub bytes: bool,

    #[serde(default)]
    pub simple: bool,

    #[serde(default)]
    pub csv: bool,

    #[serde(default)]
    pub csv_header: bool,

    #[serde(default = "default_csv_delimiter")]
    pub csv_delimiter: String,

    #[serde(default)]
    pub json: bool,

    /// Print the ranked candidates and exit
    #[serde(default)]
    pub list: bool,

    /// Restrict the catalog to these server ids
    #[serde(default)]
    pub server_ids: Vec<u32>,

    /// URL of a private measurement server
    #[serde(default)]
    pub mini: Option<String>,

    /// Local address outbound connections bind to
    #[serde(default)]
    pub source: Option<String>,

    /// Per-request and per-phase timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_seconds: u64,

    /// Deadline for the whole run
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_seconds: u64,

    /// Use HTTPS for the config and catalog documents
    #[serde(default)]
    pub secure: bool,

    /// Upload buffer pre-allocation; accepted for compatibility only
    #[serde(default = "default_true")]
    pub pre_allocate: bool,

    #[serde(default = "default_enable_color")]
    pub enable_color: bool,

    #[serde(default)]
    pub banner: bool,

    #[serde(default = "default_banner_width")]
    pub banner_width: usize,

    #[serde(default)]
    pub verbose: bool,

    #[serde(default)]
    pub debug: bool,

    /// Override for the config document URL
    #[serde(default)]
    pub config_url: Option<String>,

    /// Override for the ordered catalog URL candidates
    #[serde(default)]
    pub server_list_urls: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            no_download: false,
            no_upload: false,
            single: false,
            bytes: false,
            simple: false,
            csv: false,
            csv_header: false,
            csv_delimiter: default_csv_delimiter(),
            json: false,
            list: false,
            server_ids: Vec::new(),
            mini: None,
            source: None,
            timeout_seconds: default_timeout_secs(),
            run_timeout_seconds: default_run_timeout_secs(),
            secure: false,
            pre_allocate: true,
            enable_color: default_enable_color(),
            banner: false,
            banner_width: default_banner_width(),
            verbose: false,
            debug: false,
            config_url: None,
            server_list_urls: Vec::new(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-request and per-phase timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Deadline for the whole run
    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_seconds)
    }

    /// Transfer workers allowed in flight per phase
    pub fn concurrency(&self) -> usize {
        if self.single {
            crate::defaults::SINGLE_CONNECTION
        } else {
            crate::defaults::DEFAULT_CONCURRENCY
        }
    }

    pub fn output_mode(&self) -> OutputMode {
        OutputMode::from_flags(self.simple, self.csv, self.json)
    }

    /// Scheme used for the config and catalog documents
    pub fn scheme(&self) -> &'static str {
        if self.secure {
            "https"
        } else {
            "http"
        }
    }

    /// The csv delimiter as a single character
    pub fn delimiter(&self) -> char {
        self.csv_delimiter
            .chars()
            .next()
            .unwrap_or(crate::defaults::DEFAULT_CSV_DELIMITER)
    }

    /// Config document URL, honouring the override
    pub fn resolved_config_url(&self) -> String {
        match &self.config_url {
            Some(url) => url.clone(),
            None => format!("{}://{}", self.scheme(), crate::defaults::CONFIG_HOST_PATH),
        }
    }

    /// Ordered catalog URL candidates: primary then mirror, unless overridden
    pub fn resolved_server_list_urls(&self) -> Vec<String> {
        if !self.server_list_urls.is_empty() {
            return self.server_list_urls.clone();
        }
        vec![
            format!("{}://{}", self.scheme(), crate::defaults::SERVER_LIST_HOST_PATH),
            crate::defaults::SERVER_LIST_MIRROR.to_string(),
        ]
    }

    /// Parsed source address, if one was requested
    pub fn source_ip(&self) -> Result<Option<IpAddr>> {
        match &self.source {
            Some(source) => IpAddr::from_str(source.trim())
                .map(Some)
                .map_err(|e| AppError::invalid_source_ip(format!("'{}': {}", source, e))),
            None => Ok(None),
        }
    }

    /// Validate the configuration and return the first problem found
    pub fn validate(&self) -> Result<()> {
        if self.no_download && self.no_upload {
            return Err(AppError::validation(
                "--no-download and --no-upload cannot be used together",
            ));
        }

        if self.csv_delimiter.chars().count() != 1 {
            return Err(AppError::validation(format!(
                "--csv-delimiter must be a single character, got '{}'",
                self.csv_delimiter
            )));
        }

        if self.timeout_seconds == 0 {
            return Err(AppError::config("Timeout must be greater than 0"));
        }

        if self.timeout_seconds > 300 {
            return Err(AppError::config("Timeout cannot exceed 300 seconds"));
        }

        if self.run_timeout_seconds < self.timeout_seconds {
            return Err(AppError::config(format!(
                "Run timeout ({}s) cannot be shorter than the phase timeout ({}s)",
                self.run_timeout_seconds, self.timeout_seconds
            )));
        }

        if let Some(mini) = &self.mini {
            validate_http_url("mini server", mini)?;
        }

        if let Some(url) = &self.config_url {
            validate_http_url("config", url)?;
        }

        for url in &self.server_list_urls {
            validate_http_url("server list", url)?;
        }

        self.source_ip()?;

        Ok(())
    }

    /// Merge environment variables into this configuration
    pub fn merge_from_env(&mut self) -> Result<()> {
        self.merge_from_lookup(|key| std::env::var(key).ok())
    }

    /// Merge values from an arbitrary key lookup using the environment
    /// variable names
    pub fn merge_from_lookup<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(timeout) = lookup("NETPULSE_TIMEOUT") {
            self.timeout_seconds = timeout
                .trim()
                .parse()
                .map_err(|e| AppError::config(format!("Invalid NETPULSE_TIMEOUT value '{}': {}", timeout, e)))?;
        }

        if let Some(run_timeout) = lookup("NETPULSE_RUN_TIMEOUT") {
            self.run_timeout_seconds = run_timeout.trim().parse().map_err(|e| {
                AppError::config(format!("Invalid NETPULSE_RUN_TIMEOUT value '{}': {}", run_timeout, e))
            })?;
        }

        if let Some(secure) = lookup("NETPULSE_SECURE") {
            self.secure = parse_bool("NETPULSE_SECURE", &secure)?;
        }

        if let Some(source) = lookup("NETPULSE_SOURCE") {
            let source = source.trim();
            if !source.is_empty() {
                self.source = Some(source.to_string());
            }
        }

        if let Some(width) = lookup("NETPULSE_WIDTH") {
            self.banner_width = width
                .trim()
                .parse()
                .map_err(|e| AppError::config(format!("Invalid NETPULSE_WIDTH value '{}': {}", width, e)))?;
        }

        // NO_COLOR disables color whenever it is present
        if lookup("NO_COLOR").is_some() {
            self.enable_color = false;
        }

        if let Some(no_color) = lookup("NETPULSE_NO_COLOR") {
            if parse_bool("NETPULSE_NO_COLOR", &no_color)? {
                self.enable_color = false;
            }
        }

        if let Some(url) = lookup("NETPULSE_CONFIG_URL") {
            let url = url.trim();
            if !url.is_empty() {
                self.config_url = Some(url.to_string());
            }
        }

        if let Some(urls) = lookup("NETPULSE_SERVER_LIST_URLS") {
            self.server_list_urls = urls
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        Ok(())
    }
}

fn validate_http_url(what: &str, raw: &str) -> Result<()> {
    match url::Url::parse(raw) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") && parsed.host_str().is_some() => Ok(()),
        Ok(_) => Err(AppError::config(format!("Invalid {} URL '{}': must be http(s) with a host", what, raw))),
        Err(e) => Err(AppError::config(format!("Invalid {} URL '{}': {}", what, raw, e))),
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(AppError::config(format!("Invalid {} value '{}': expected a boolean", key, other))),
    }
}

// Default value functions for serde
fn default_csv_delimiter() -> String {
    crate::defaults::DEFAULT_CSV_DELIMITER.to_string()
}

fn default_timeout_secs() -> u64 {
    crate::defaults::DEFAULT_TIMEOUT.as_secs()
}

fn default_run_timeout_secs() -> u64 {
    crate::defaults::DEFAULT_RUN_TIMEOUT.as_secs()
}

fn default_enable_color() -> bool {
    crate::defaults::DEFAULT_ENABLE_COLOR
}

fn default_banner_width() -> usize {
    crate::defaults::DEFAULT_BANNER_WIDTH
}

fn default_true() -> bool {
    true
}
