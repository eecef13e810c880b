//! Configuration parsing from CLI arguments and environment variables

use crate::{cli::Cli, config::env::EnvManager, error::AppError, error::Result, models::Config};

/// Combines defaults, the `.env` file, environment variables and CLI flags,
/// in that order of precedence (later wins)
pub struct ConfigParser {
    cli: Cli,
    load_env_file: bool,
}

impl ConfigParser {
    pub fn new(cli: Cli) -> Self {
        Self {
            cli,
            load_env_file: true,
        }
    }

    /// Skip the `.env` file; environment variables are still honoured
    pub fn without_env_file(mut self) -> Self {
        self.load_env_file = false;
        self
    }

    /// Parse and build the complete configuration
    pub fn parse(&self) -> Result<Config> {
        self.cli.validate().map_err(AppError::validation)?;

        let mut config = Config::default();

        if self.load_env_file {
            EnvManager::load_env_file()?;
        }

        config.merge_from_env()?;

        self.apply_cli_overrides(&mut config);

        config.validate()?;

        Ok(config)
    }

    /// Parse against an explicit key lookup instead of the process environment
    pub fn parse_with_lookup<F>(&self, lookup: F) -> Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.cli.validate().map_err(AppError::validation)?;

        let mut config = Config::default();
        config.merge_from_lookup(lookup)?;
        self.apply_cli_overrides(&mut config);
        config.validate()?;

        Ok(config)
    }

    fn apply_cli_overrides(&self, config: &mut Config) {
        let cli = &self.cli;

        config.no_download = cli.no_download;
        config.no_upload = cli.no_upload;
        config.single = cli.single;
        config.bytes = cli.bytes;
        config.simple = cli.simple;
        config.csv = cli.csv;
        config.csv_header = cli.csv_header;
        config.csv_delimiter = cli.csv_delimiter.clone();
        config.json = cli.json;
        config.list = cli.list;
        config.server_ids = cli.servers.clone();
        config.mini = cli.mini.clone();
        config.verbose = cli.verbose;
        config.debug = cli.debug;
        config.banner = cli.banner;

        if cli.no_pre_allocate {
            config.pre_allocate = false;
        }

        if cli.secure {
            config.secure = true;
        }

        if cli.no_color {
            config.enable_color = false;
        }

        if let Some(source) = &cli.source {
            config.source = Some(source.clone());
        }

        if let Some(timeout) = cli.timeout {
            config.timeout_seconds = timeout;
            // The run deadline must leave room for every stage to use its own timeout
            let stages = timeout.saturating_mul(crate::defaults::TIMED_STAGES);
            if config.run_timeout_seconds < stages {
                config.run_timeout_seconds = stages;
            }
        }

        if let Some(run_timeout) = cli.run_timeout {
            config.run_timeout_seconds = run_timeout;
        }

        if let Some(width) = cli.banner_width {
            config.banner_width = width;
        }

        if let Some(url) = &cli.config_url {
            config.config_url = Some(url.clone());
        }

        if !cli.server_list_urls.is_empty() {
            config.server_list_urls = cli.server_list_urls.clone();
        }
    }
}

/// Convenience function to load complete configuration from CLI arguments
pub fn load_config(cli: Cli) -> Result<Config> {
    ConfigParser::new(cli).parse()
}

/// Configuration summary for debug output
pub fn display_config_summary(config: &Config) -> String {
    let mut summary = Vec::new();

    summary.push(format!("Output Mode: {:?}", config.output_mode()));
    summary.push(format!("Connections: {}", config.concurrency()));
    summary.push(format!("Download: {}", !config.no_download));
    summary.push(format!("Upload: {}", !config.no_upload));
    summary.push(format!("Units: {}", if config.bytes { "MB/s" } else { "Mbps" }));
    summary.push(format!("Timeout: {}s (run {}s)", config.timeout_seconds, config.run_timeout_seconds));
    summary.push(format!("Secure: {}", config.secure));
    if let Some(source) = &config.source {
        summary.push(format!("Source: {}", source));
    }
    if let Some(mini) = &config.mini {
        summary.push(format!("Mini Server: {}", mini));
    } else {
        summary.push(format!("Config URL: {}", config.resolved_config_url()));
        summary.push(format!("Server Lists: {}", config.resolved_server_list_urls().join(", ")));
    }
    if !config.server_ids.is_empty() {
        let ids: Vec<String> = config.server_ids.iter().map(|id| id.to_string()).collect();
        summary.push(format!("Server IDs: {}", ids.join(", ")));
    }
    summary.push(format!("Color Output: {}", config.enable_color));

    summary.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_from_args(args.iter().copied()).unwrap()
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults_without_env() {
        let config = ConfigParser::new(cli(&[])).parse_with_lookup(no_env).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_cli_overrides_env() {
        let lookup = |key: &str| match key {
            "NETPULSE_TIMEOUT" => Some("20".to_string()),
            "NETPULSE_RUN_TIMEOUT" => Some("90".to_string()),
            "NETPULSE_WIDTH" => Some("72".to_string()),
            _ => None,
        };

        let config = ConfigParser::new(cli(&["--timeout", "5", "--no-color", "--single"]))
            .parse_with_lookup(lookup)
            .unwrap();

        assert_eq!(config.timeout_seconds, 5);
        assert_eq!(config.run_timeout_seconds, 90);
        assert_eq!(config.banner_width, 72);
        assert!(!config.enable_color);
        assert_eq!(config.concurrency(), 1);
    }

    #[test]
    fn test_long_phase_timeout_stretches_run() {
        let config = ConfigParser::new(cli(&["--timeout", "120"]))
            .parse_with_lookup(no_env)
            .unwrap();
        assert_eq!(config.run_timeout_seconds, 480);

        // Four 10 s stages fit in the default run deadline
        let config = ConfigParser::new(cli(&["--timeout", "10"]))
            .parse_with_lookup(no_env)
            .unwrap();
        assert_eq!(config.run_timeout_seconds, 60);

        let config = ConfigParser::new(cli(&["--timeout", "20"]))
            .parse_with_lookup(no_env)
            .unwrap();
        assert_eq!(config.run_timeout_seconds, 80);
    }

    #[test]
    fn test_explicit_run_timeout_wins_over_stretching() {
        let config = ConfigParser::new(cli(&["--timeout", "20", "--run-timeout", "30"]))
            .parse_with_lookup(no_env)
            .unwrap();
        assert_eq!(config.run_timeout_seconds, 30);
    }

    #[test]
    fn test_flag_conflict_is_validation_error() {
        let err = ConfigParser::new(cli(&["--no-download", "--no-upload"]))
            .parse_with_lookup(no_env)
            .unwrap_err();
        assert_eq!(err.category(), "VALIDATION");
    }

    #[test]
    fn test_invalid_env_value_reported() {
        let lookup = |key: &str| (key == "NETPULSE_WIDTH").then(|| "wide".to_string());
        let err = ConfigParser::new(cli(&[])).parse_with_lookup(lookup).unwrap_err();
        assert!(err.to_string().contains("NETPULSE_WIDTH"));
    }

    #[test]
    fn test_config_summary() {
        let config = ConfigParser::new(cli(&["--json", "--server", "7,9", "--bytes"]))
            .parse_with_lookup(no_env)
            .unwrap();
        let summary = display_config_summary(&config);
        assert!(summary.contains("Output Mode: Json"));
        assert!(summary.contains("Units: MB/s"));
        assert!(summary.contains("Server IDs: 7, 9"));
        assert!(summary.contains("speedtest-config.php"));
    }
}
