//! Command-line interface

use clap::Parser;

/// NetPulse - measure download and upload throughput against the nearest speed-test server
#[derive(Parser, Debug, Clone)]
#[command(name = "netpulse")]
#[command(about, long_about = None)]
#[command(disable_version_flag = true)]
pub struct Cli {
    /// Do not perform the download test
    #[arg(long)]
    pub no_download: bool,

    /// Do not perform the upload test
    #[arg(long)]
    pub no_upload: bool,

    /// Only use a single connection instead of multiple
    #[arg(long)]
    pub single: bool,

    /// Display values in bytes (MB/s) instead of bits (Mbps)
    #[arg(long)]
    pub bytes: bool,

    /// Suppress verbose output, only show basic information
    #[arg(long)]
    pub simple: bool,

    /// Print a single CSV row of the results
    #[arg(long)]
    pub csv: bool,

    /// Print the CSV header before the row
    #[arg(long)]
    pub csv_header: bool,

    /// Single character delimiter for CSV output
    #[arg(long, default_value = ",", value_name = "CHAR")]
    pub csv_delimiter: String,

    /// Print the results as JSON
    #[arg(long)]
    pub json: bool,

    /// Display a list of servers sorted by distance and exit
    #[arg(long)]
    pub list: bool,

    /// Restrict selection to these server ids (comma-separated or repeated)
    #[arg(long = "server", value_name = "ID", value_delimiter = ',')]
    pub servers: Vec<u32>,

    /// URL of a Speedtest Mini server
    #[arg(long, value_name = "URL")]
    pub mini: Option<String>,

    /// Source IP address to bind to
    #[arg(long, value_name = "IP")]
    pub source: Option<String>,

    /// HTTP timeout in seconds, also the per-phase deadline
    #[arg(long, value_parser = parse_duration, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Deadline for the whole run in seconds
    #[arg(long, value_parser = parse_run_timeout, value_name = "SECS")]
    pub run_timeout: Option<u64>,

    /// Use HTTPS when fetching the config and server list
    #[arg(long)]
    pub secure: bool,

    /// Do not pre-allocate upload data
    #[arg(long)]
    pub no_pre_allocate: bool,

    /// Show the version number and exit
    #[arg(long)]
    pub version: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Print a banner before the run
    #[arg(long)]
    pub banner: bool,

    /// Banner width in columns
    #[arg(long, value_name = "COLS")]
    pub banner_width: Option<usize>,

    /// Enable verbose logging
    #[arg(long, env = "NETPULSE_VERBOSE")]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(long, env = "NETPULSE_DEBUG")]
    pub debug: bool,

    /// Override the config document URL
    #[arg(long, hide = true, value_name = "URL")]
    pub config_url: Option<String>,

    /// Override the server list URL (repeat for fallbacks)
    #[arg(long = "server-list-url", hide = true, value_name = "URL")]
    pub server_list_urls: Vec<String>,
}

impl Cli {
    /// Parse an argument list that does not include the program name
    pub fn try_from_args<I, S>(args: I) -> std::result::Result<Self, clap::Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let argv = std::iter::once(crate::PKG_NAME.to_string()).chain(args.into_iter().map(Into::into));
        Self::try_parse_from(argv)
    }

    /// Validate CLI arguments for conflicts and requirements
    pub fn validate(&self) -> Result<(), String> {
        if self.no_download && self.no_upload {
            return Err("Cannot specify both --no-download and --no-upload".to_string());
        }

        if self.csv_delimiter.chars().count() != 1 {
            return Err(format!(
                "--csv-delimiter must be a single character, got '{}'",
                self.csv_delimiter
            ));
        }

        if self.mini.is_some() && !self.servers.is_empty() {
            return Err("--server cannot be combined with --mini".to_string());
        }

        if let Some(width) = self.banner_width {
            if width == 0 {
                return Err("--banner-width must be greater than 0".to_string());
            }
        }

        Ok(())
    }

    /// The line printed by `--version`
    pub fn version_line() -> String {
        format!("{} {}", crate::PKG_NAME, crate::VERSION)
    }
}

/// Parse duration from seconds string
fn parse_duration(s: &str) -> Result<u64, String> {
    parse_seconds(s, 300)
}

fn parse_run_timeout(s: &str) -> Result<u64, String> {
    parse_seconds(s, 3600)
}

fn parse_seconds(s: &str, max: u64) -> Result<u64, String> {
    if s.starts_with('+') || s.starts_with("0x") || s.starts_with("0X") {
        return Err(format!("Invalid duration: {}", s));
    }

    s.parse::<u64>()
        .map_err(|_| format!("Invalid duration: {}", s))
        .and_then(|secs| {
            if secs == 0 {
                Err("Duration must be greater than 0".to_string())
            } else if secs > max {
                Err(format!("Duration cannot exceed {} seconds", max))
            } else {
                Ok(secs)
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing_defaults() {
        let cli = Cli::try_from_args(Vec::<String>::new()).unwrap();
        assert!(!cli.no_download);
        assert!(!cli.single);
        assert_eq!(cli.csv_delimiter, ",");
        assert_eq!(cli.timeout, None);
        assert!(cli.servers.is_empty());
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn test_cli_parsing_all_options() {
        let cli = Cli::try_from_args([
            "--single",
            "--bytes",
            "--csv",
            "--csv-header",
            "--csv-delimiter",
            ";",
            "--server",
            "1234,5678",
            "--server",
            "42",
            "--source",
            "127.0.0.1",
            "--timeout",
            "30",
            "--run-timeout",
            "120",
            "--secure",
            "--no-pre-allocate",
            "--no-color",
            "--banner",
            "--banner-width",
            "60",
        ])
        .unwrap();

        assert!(cli.single);
        assert!(cli.bytes);
        assert!(cli.csv && cli.csv_header);
        assert_eq!(cli.csv_delimiter, ";");
        assert_eq!(cli.servers, vec![1234, 5678, 42]);
        assert_eq!(cli.source.as_deref(), Some("127.0.0.1"));
        assert_eq!(cli.timeout, Some(30));
        assert_eq!(cli.run_timeout, Some(120));
        assert!(cli.secure && cli.no_pre_allocate && cli.no_color && cli.banner);
        assert_eq!(cli.banner_width, Some(60));
    }

    #[test]
    fn test_duration_parsing() {
        assert_eq!(parse_duration("10"), Ok(10));
        assert_eq!(parse_duration("300"), Ok(300));
        assert!(parse_duration("0").is_err());
        assert!(parse_duration("301").is_err());
        assert!(parse_duration("+5").is_err());
        assert!(parse_duration("0x10").is_err());
        assert!(parse_duration("ten").is_err());
        assert_eq!(parse_run_timeout("900"), Ok(900));
    }

    #[test]
    fn test_cli_validation() {
        let cli = Cli::try_from_args(["--no-download", "--no-upload"]).unwrap();
        assert!(cli.validate().unwrap_err().contains("--no-download"));

        let cli = Cli::try_from_args(["--csv-delimiter", "ab"]).unwrap();
        assert!(cli.validate().unwrap_err().contains("single character"));

        let cli = Cli::try_from_args(["--mini", "http://mini.example.net/", "--server", "1"]).unwrap();
        assert!(cli.validate().is_err());
    }

    #[test]
    fn test_invalid_server_id_rejected() {
        assert!(Cli::try_from_args(["--server", "abc"]).is_err());
    }

    #[test]
    fn test_version_flag() {
        let cli = Cli::try_from_args(["--version"]).unwrap();
        assert!(cli.version);
        assert_eq!(Cli::version_line(), format!("netpulse {}", crate::VERSION));
    }
}
