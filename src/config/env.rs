//! Environment variable handling and .env file management

use crate::error::{AppError, Result};
use std::path::Path;

/// Environment variable configuration manager
pub struct EnvManager;

impl EnvManager {
    /// Load `.env` from the current directory if it exists. Variables already
    /// set in the environment are not overridden.
    pub fn load_env_file() -> Result<bool> {
        Self::load_env_file_from(Path::new(".env"))
    }

    /// Load a specific env file if it exists; returns whether it was loaded
    pub fn load_env_file_from(path: &Path) -> Result<bool> {
        if !path.exists() {
            return Ok(false);
        }
        dotenv::from_path(path)
            .map_err(|e| AppError::config(format!("Failed to load {}: {}", path.display(), e)))?;
        Ok(true)
    }

    /// Validate one environment variable before it is merged
    pub fn validate_env_var(key: &str, value: &str) -> Result<()> {
        match key {
            "NETPULSE_TIMEOUT" => {
                let timeout: u64 = value
                    .parse()
                    .map_err(|e| AppError::config(format!("Invalid {} value '{}': {}", key, value, e)))?;
                if timeout == 0 || timeout > 300 {
                    return Err(AppError::config(format!(
                        "{} must be between 1 and 300, got: {}",
                        key, timeout
                    )));
                }
            }
            "NETPULSE_RUN_TIMEOUT" => {
                let timeout: u64 = value
                    .parse()
                    .map_err(|e| AppError::config(format!("Invalid {} value '{}': {}", key, value, e)))?;
                if timeout == 0 {
                    return Err(AppError::config(format!("{} must be greater than 0", key)));
                }
            }
            "NETPULSE_WIDTH" => {
                value
                    .parse::<usize>()
                    .map_err(|e| AppError::config(format!("Invalid {} value '{}': {}", key, value, e)))?;
            }
            "NETPULSE_SECURE" | "NETPULSE_NO_COLOR" => {
                if !matches!(
                    value.to_lowercase().as_str(),
                    "1" | "0" | "true" | "false" | "yes" | "no" | "on" | "off"
                ) {
                    return Err(AppError::config(format!("Invalid {} value '{}': expected a boolean", key, value)));
                }
            }
            "NETPULSE_SOURCE" => {
                value
                    .parse::<std::net::IpAddr>()
                    .map_err(|e| AppError::config(format!("Invalid {} value '{}': {}", key, value, e)))?;
            }
            "NETPULSE_CONFIG_URL" | "NETPULSE_SERVER_LIST_URLS" => {
                for url in value.split(',').map(str::trim).filter(|u| !u.is_empty()) {
                    url::Url::parse(url)
                        .map_err(|e| AppError::config(format!("Invalid {} entry '{}': {}", key, url, e)))?;
                }
            }
            _ => {}
        }

        Ok(())
    }

    /// All supported environment variables with descriptions and examples
    pub fn get_supported_env_vars() -> Vec<(&'static str, &'static str, &'static str)> {
        vec![
            ("NETPULSE_TIMEOUT", "HTTP timeout and per-phase deadline (1-300 s)", "10"),
            ("NETPULSE_RUN_TIMEOUT", "Deadline for the whole run in seconds", "60"),
            ("NETPULSE_SECURE", "Use HTTPS for config and server list", "false"),
            ("NETPULSE_SOURCE", "Local source IP address", "192.168.1.10"),
            ("NETPULSE_WIDTH", "Banner width in columns", "80"),
            ("NETPULSE_NO_COLOR", "Disable colored output", "true"),
            ("NETPULSE_CONFIG_URL", "Config document URL", "http://www.speedtest.net/speedtest-config.php"),
            (
                "NETPULSE_SERVER_LIST_URLS",
                "Comma-separated server list URLs, tried in order",
                "http://c.speedtest.net/speedtest-servers.php",
            ),
        ]
    }

    /// Environment variable help text
    pub fn display_env_help() -> String {
        let mut help = String::new();
        help.push_str("Supported Environment Variables:\n\n");

        for (var, description, example) in Self::get_supported_env_vars() {
            help.push_str(&format!("  {:<26} {}\n", var, description));
            help.push_str(&format!("  {:<26} Example: {}\n\n", "", example));
        }

        help.push_str("Configuration Priority (highest to lowest):\n");
        help.push_str("  1. Command-line arguments\n");
        help.push_str("  2. Environment variables\n");
        help.push_str("  3. .env file values\n");
        help.push_str("  4. Default values\n");

        help
    }

    /// Warnings for currently set environment variables that fail validation
    pub fn validate_current_env() -> Vec<String> {
        Self::get_supported_env_vars()
            .into_iter()
            .filter_map(|(name, _, _)| {
                let value = std::env::var(name).ok()?;
                Self::validate_env_var(name, &value)
                    .err()
                    .map(|e| format!("Warning: {}", e))
            })
            .collect()
    }
}
