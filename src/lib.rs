//! NetPulse
//!
//! A network throughput measurement client for the legacy speed-test
//! protocol. It fetches the client configuration, discovers and ranks
//! measurement servers by distance and latency, then drives concurrent
//! download and upload transfers to compute achievable bitrate with live
//! progress.

pub mod app;
pub mod cli;
pub mod client;
pub mod config;
pub mod context;
pub mod discovery;
pub mod error;
pub mod executor;
pub mod logging;
pub mod models;
pub mod output;
pub mod types;

// Re-export commonly used types
pub use app::{run_buffered, run_streaming, App};
pub use context::RunContext;
pub use error::{AppError, Result};
pub use models::{ClientLocation, Config, Results, Server};
pub use output::{BufferedSink, ConsoleSink, OutputSink, StreamingSink};
pub use types::{OutputMode, Phase};

/// Application version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const PKG_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// User agent sent with every request
pub const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Default configuration values
pub mod defaults {
    use std::time::Duration;

    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
    pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(60);
    /// Stages that each get a full per-phase timeout: discovery, selection,
    /// download and upload
    pub const TIMED_STAGES: u64 = 4;
    pub const DEFAULT_BANNER_WIDTH: usize = 80;
    pub const DEFAULT_CSV_DELIMITER: char = ',';
    pub const DEFAULT_ENABLE_COLOR: bool = true;

    /// Config document path on the speed-test host
    pub const CONFIG_HOST_PATH: &str = "www.speedtest.net/speedtest-config.php";
    /// Primary catalog path (scheme follows the secure flag)
    pub const SERVER_LIST_HOST_PATH: &str = "www.speedtest.net/speedtest-servers.php";
    /// Catalog mirror, always plain http
    pub const SERVER_LIST_MIRROR: &str = "http://c.speedtest.net/speedtest-servers.php";

    /// Number of closest servers handed to the prober
    pub const CLOSEST_SERVERS: usize = 5;
    /// Number of servers printed by `--list`
    pub const LIST_SERVERS: usize = 50;

    /// Transfer workers in flight per phase
    pub const DEFAULT_CONCURRENCY: usize = 4;
    pub const SINGLE_CONNECTION: usize = 1;

    /// Edge lengths of the synthetic download images
    pub const DOWNLOAD_SIZES: [u32; 8] = [350, 500, 750, 1000, 1500, 2000, 2500, 3000];
    /// Candidate upload payload sizes (32 KiB to 512 KiB)
    pub const UPLOAD_SIZES: [u64; 5] = [32_768, 65_536, 131_072, 262_144, 524_288];
    pub const UPLOAD_REQUESTS: usize = 6;

    pub const PROBE_TRIALS: usize = 3;
    /// Latency charged for a failed probe trial
    pub const FAILED_PROBE_PENALTY_MS: f64 = 3600.0;

    pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(200);
    /// Capacity of the per-phase progress channel
    pub const PROGRESS_CHANNEL_CAPACITY: usize = 64;
    /// Lower bound for elapsed seconds in bitrate computation
    pub const MIN_ELAPSED_SECS: f64 = 0.000_001;

    pub const MINI_SPONSOR: &str = "Speedtest Mini";
}
