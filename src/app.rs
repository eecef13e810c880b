//! Main application orchestration and execution

use crate::{
    cli::Cli,
    client::{ClientConfig, HttpTransport, Transport},
    config::ConfigParser,
    context::RunContext,
    defaults::{CLOSEST_SERVERS, LIST_SERVERS},
    discovery::{closest, filter_by_ids, ConfigFetcher, ServerCatalog, ServerProber},
    error::{AppError, Result},
    executor::{ProgressStyle, ThroughputMeasurer},
    logging::{Logger, LoggerFactory, MeasurementLogger},
    models::{Config, Results, Server},
    output::{banner, format_server_list, hosted_by_line, BufferedSink, OutputFormatterFactory, OutputSink, StreamingSink},
    types::Phase,
};
use std::sync::Arc;
use tokio::sync::mpsc;

/// One measurement run: configuration, discovery, selection, then the
/// download and upload phases
pub struct App {
    config: Config,
    transport: Arc<dyn Transport>,
    logger: Logger,
    measurement_logger: MeasurementLogger,
}

impl App {
    /// Build the run over a reqwest transport. The source address is checked
    /// before anything touches the network.
    pub async fn new(config: Config) -> Result<Self> {
        let client_config = ClientConfig::from_config(&config)?;
        client_config.validate_source()?;

        let factory = LoggerFactory::new(config.clone());
        let transport = HttpTransport::new(&client_config, factory.create_network_logger())?;

        Ok(Self {
            logger: factory.create_logger("APP"),
            measurement_logger: factory.create_measurement_logger(),
            transport: Arc::new(transport),
            config,
        })
    }

    /// Build the run over any transport
    pub fn with_transport(config: Config, transport: Arc<dyn Transport>) -> Self {
        Self {
            logger: Logger::with_config("APP".to_string(), &config),
            measurement_logger: MeasurementLogger::new(&config),
            transport,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run to completion, writing progress and results to `out`
    pub async fn run(&self, out: Arc<dyn OutputSink>) -> Result<Results> {
        let config = &self.config;
        let human = config.output_mode().is_human();
        let say = |text: &str| {
            if human {
                out.write_text(text);
            }
        };

        if config.banner {
            out.write_text(&banner::render(config.banner_width));
        }

        let root = RunContext::with_timeout(config.run_timeout());
        let discovery = root.child_with_timeout(config.timeout());

        say("Retrieving speedtest configuration...\n");
        let settings = ConfigFetcher::new(self.transport.clone(), config.resolved_config_url())
            .fetch_settings(&discovery)
            .await
            .map_err(|e| e.in_phase(Phase::Config))?;
        let location = settings.location;
        say(&format!("Testing from {} ({})...\n", location.isp, location.ip));

        let mut results = Results::new(&location);

        let catalog = ServerCatalog::new(
            self.transport.clone(),
            config.resolved_server_list_urls(),
            self.logger.clone(),
        );
        let candidates = match &config.mini {
            Some(url) => vec![catalog
                .use_mini_server(&discovery, url)
                .await
                .map_err(|e| e.in_phase(Phase::Discovery))?],
            None => {
                say("Retrieving server list...\n");
                let servers = catalog
                    .fetch_servers(&discovery, &location, &settings.ignore_ids)
                    .await
                    .map_err(|e| e.in_phase(Phase::Discovery))?;
                let servers = filter_by_ids(servers, &config.server_ids);
                if servers.is_empty() {
                    return Err(AppError::no_servers(format!(
                        "no server in the list matches the requested ids {:?}",
                        config.server_ids
                    ))
                    .in_phase(Phase::Discovery));
                }
                servers
            }
        };

        if config.list {
            out.write_text(&format_server_list(&closest(&candidates, LIST_SERVERS)));
            return Ok(results);
        }

        let server = self.select_server(&root, &candidates, &say).await?;
        results.record_server(&server)?;
        say(&hosted_by_line(&server, config.enable_color));

        let measurer = ThroughputMeasurer::new(
            self.transport.clone(),
            self.measurement_logger.clone(),
            ProgressStyle {
                bytes_mode: config.bytes,
                use_color: config.enable_color,
                enabled: human,
            },
        )
        .with_pre_allocate(config.pre_allocate);

        if config.no_download {
            say("Skipping download\n");
        } else {
            self.check_deadline(&root, Phase::Download)?;
            let phase = root.child_with_timeout(config.timeout());
            let report = measurer
                .measure_download(&phase, &server, config.concurrency(), out.clone())
                .await
                .map_err(|e| e.in_phase(Phase::Download))?;
            results.record_download(report.bits_per_second, report.bytes)?;
        }

        if config.no_upload {
            say("Skipping upload\n");
        } else {
            self.check_deadline(&root, Phase::Upload)?;
            let phase = root.child_with_timeout(config.timeout());
            let report = measurer
                .measure_upload(&phase, &server, config.concurrency(), out.clone())
                .await
                .map_err(|e| e.in_phase(Phase::Upload))?;
            results.record_upload(report.bits_per_second, report.bytes)?;
        }

        if let Some(formatter) = OutputFormatterFactory::create(config) {
            out.write_text(&formatter.format_results(&results)?);
        }

        self.logger
            .info("Run finished")
            .field("server_id", server.id)
            .field("ping_ms", results.ping())
            .field("download_bps", results.download())
            .field("upload_bps", results.upload())
            .log()
            .await;

        Ok(results)
    }

    /// The mini server as is, otherwise the fastest of the closest candidates
    async fn select_server(&self, root: &RunContext, candidates: &[Server], say: &impl Fn(&str)) -> Result<Server> {
        if self.config.mini.is_some() {
            if let Some(mini) = candidates.first() {
                return Ok(mini.clone());
            }
        }

        say("Selecting best server based on ping...\n");
        let selection = root.child_with_timeout(self.config.timeout());
        ServerProber::new(self.transport.clone(), self.measurement_logger.clone())
            .select_best_server(&selection, &closest(candidates, CLOSEST_SERVERS))
            .await
            .map_err(|e| e.in_phase(Phase::Selection))
    }

    fn check_deadline(&self, root: &RunContext, phase: Phase) -> Result<()> {
        if root.is_cancelled() {
            return Err(AppError::timeout("run deadline exceeded before the phase started").in_phase(phase));
        }
        Ok(())
    }
}

/// Parse `args`, build the run and execute it against `out`
async fn run_with_args<I, S>(args: I, out: Arc<dyn OutputSink>) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let cli = match Cli::try_from_args(args) {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion) => {
            out.write_text(&e.to_string());
            return Ok(());
        }
        Err(e) => return Err(AppError::validation(e.to_string())),
    };

    if cli.version {
        out.write_text(&format!("{}\n", Cli::version_line()));
        return Ok(());
    }

    let config = ConfigParser::new(cli).without_env_file().parse()?;
    App::new(config).await?.run(out).await.map(|_| ())
}

/// Combine buffered output with a terminal error
fn buffered_report(text: String, outcome: Result<()>) -> String {
    match outcome {
        Ok(()) => text,
        Err(e) if text.is_empty() => format!("speedtest error: {}", e),
        Err(e) => format!("{}\nERROR: {}", text, e),
    }
}

/// Run with the given arguments and return everything that was written,
/// with any error appended
pub async fn run_buffered<I, S>(args: I) -> String
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let sink = Arc::new(BufferedSink::new());
    let outcome = run_with_args(args, sink.clone()).await;
    buffered_report(sink.contents(), outcome)
}

/// Run with the given arguments, forwarding completed lines to `tx` as they
/// are produced. Sends never block; lines that do not fit are dropped.
pub async fn run_streaming<I, S>(args: I, tx: mpsc::Sender<String>)
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let sink = Arc::new(StreamingSink::new(tx));
    let outcome = run_with_args(args, sink.clone()).await;
    sink.flush_remainder();
    if let Err(e) = outcome {
        sink.send_line(&format!("ERROR: {}", e));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::{DownloadBehavior, MockTransport, UploadBehavior};
    use std::time::Duration;

    const CONFIG_URL: &str = "http://www.speedtest.net/speedtest-config.php";
    const SERVERS_URL: &str = "http://www.speedtest.net/speedtest-servers.php";

    const CONFIG_XML: &str = r#"<settings><client ip="203.0.113.9" lat="0" lon="0" isp="Example Net"/><server-config ignoreids="9"/></settings>"#;

    const SERVERS_XML: &str = r#"<settings><servers>
<server url="http://near.example.net/speedtest/upload.php" lat="0" lon="1" name="Near" country="X" sponsor="Near ISP" id="1"/>
<server url="http://far.example.net/speedtest/upload.php" lat="0" lon="10" name="Far" country="X" sponsor="Far ISP" id="2"/>
<server url="http://ignored.example.net/speedtest/upload.php" lat="0" lon="0.5" name="Ignored" country="X" sponsor="Ignored" id="9"/>
</servers></settings>"#;

    fn transport() -> MockTransport {
        MockTransport::new()
            .with_text(CONFIG_URL, 200, CONFIG_XML)
            .with_text(SERVERS_URL, 200, SERVERS_XML)
            .with_probe("near.example.net", Duration::from_millis(30))
            .with_probe("far.example.net", Duration::from_millis(10))
            .with_download(DownloadBehavior {
                bytes_per_request: 125_000,
                hold: Duration::from_millis(100),
            })
            .with_upload(UploadBehavior::Consume)
    }

    fn config() -> Config {
        Config {
            enable_color: false,
            ..Config::default()
        }
    }

    async fn run(config: Config, transport: MockTransport) -> (Result<Results>, String, Arc<MockTransport>) {
        let transport = Arc::new(transport);
        let app = App::with_transport(config, transport.clone());
        let sink = Arc::new(BufferedSink::new());
        let outcome = app.run(sink.clone()).await;
        (outcome, sink.contents(), transport)
    }

    #[tokio::test(start_paused = true)]
    async fn test_human_run() {
        let (outcome, text, _) = run(config(), transport()).await;
        let results = outcome.unwrap();

        assert_eq!(results.server().map(|s| s.id), Some(2));
        assert!(results.download() > 0.0);
        assert!(results.upload() > 0.0);
        assert_eq!(results.bytes_received(), 1_000_000);

        assert!(text.starts_with("Retrieving speedtest configuration...\nTesting from Example Net (203.0.113.9)...\n"));
        assert!(text.contains("Retrieving server list...\n"));
        assert!(text.contains("Selecting best server based on ping...\n"));
        assert!(text.contains("Hosted by Far ISP (Far) ["));
        assert!(text.contains("\rDownload: "));
        assert!(text.contains("\rUpload: "));
    }

    #[tokio::test(start_paused = true)]
    async fn test_simple_run_prints_only_results() {
        let config = Config {
            simple: true,
            no_upload: true,
            ..config()
        };
        let (outcome, text, transport) = run(config, transport()).await;
        outcome.unwrap();

        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Ping: "));
        assert!(lines[1].starts_with("Download: "));
        assert_eq!(lines[2], "Upload: 0.00 Mbps");
        assert!(!transport.calls().iter().any(|c| c.starts_with("POST")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_skipped_phase_is_announced() {
        let config = Config {
            no_download: true,
            ..config()
        };
        let (outcome, text, _) = run(config, transport()).await;
        let results = outcome.unwrap();
        assert!(!results.has_download());
        assert!(text.contains("Skipping download\n"));
    }

    #[tokio::test]
    async fn test_list_mode_exits_after_listing() {
        let config = Config {
            list: true,
            ..config()
        };
        let (outcome, text, transport) = run(config, transport()).await;
        outcome.unwrap();

        assert!(text.contains("    1) Near ISP (Near, X) [111.19 km]\n    2) Far ISP (Far, X) ["));
        assert!(!text.contains("Ignored"));
        assert!(transport.calls().iter().all(|c| !c.contains("latency.txt")));
    }

    #[tokio::test]
    async fn test_unknown_server_ids() {
        let config = Config {
            server_ids: vec![77],
            ..config()
        };
        let (outcome, _, _) = run(config, transport()).await;
        let err = outcome.unwrap_err();
        assert_eq!(err.phase(), Some(Phase::Discovery));
        assert_eq!(err.category(), "NO_SERVERS");
    }

    #[tokio::test(start_paused = true)]
    async fn test_requested_server_id_skips_nearer_ones() {
        let config = Config {
            server_ids: vec![1],
            json: true,
            ..config()
        };
        let (outcome, text, _) = run(config, transport()).await;
        assert_eq!(outcome.unwrap().server().map(|s| s.id), Some(1));
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["server"]["id"], 1);
        assert_eq!(value["client"]["isp"], "Example Net");
    }

    #[tokio::test(start_paused = true)]
    async fn test_mini_server_skips_catalog_and_probes() {
        let mini = "http://mini.example.net/speedtest/";
        let config = Config {
            mini: Some(mini.to_string()),
            csv: true,
            ..config()
        };
        let transport = transport().with_text(mini, 200, "ok");
        let (outcome, text, transport) = run(config, transport).await;
        outcome.unwrap();

        assert!(text.starts_with("0,Speedtest Mini,mini.example.net,0.00,"));
        let calls = transport.calls();
        assert!(!calls.iter().any(|c| c.contains("speedtest-servers.php")));
        assert!(!calls.iter().any(|c| c.contains("latency.txt")));
        assert!(calls.contains(&"POST http://mini.example.net/speedtest/upload.php".to_string()));
    }

    #[tokio::test]
    async fn test_config_failure_is_tagged_with_phase() {
        let (outcome, text, _) = run(config(), MockTransport::new()).await;
        let err = outcome.unwrap_err();
        assert_eq!(err.phase(), Some(Phase::Config));
        assert_eq!(err.category(), "CONFIG_FETCH");
        assert_eq!(text, "Retrieving speedtest configuration...\n");
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_uploads_fail_the_run() {
        let transport = transport().with_upload(UploadBehavior::Reject(500));
        let (outcome, text, _) = run(config(), transport).await;
        let err = outcome.unwrap_err();
        assert_eq!(err.phase(), Some(Phase::Upload));
        assert_eq!(err.category(), "ZERO_UPLOAD");
        assert!(text.contains("\rDownload: "));
    }

    #[test]
    fn test_buffered_report() {
        assert_eq!(buffered_report("done\n".to_string(), Ok(())), "done\n");
        assert_eq!(
            buffered_report(String::new(), Err(AppError::config_fetch("offline"))),
            "speedtest error: could not fetch config: offline"
        );
        assert_eq!(
            buffered_report("partial".to_string(), Err(AppError::no_best_server("x"))),
            "partial\nERROR: no best server found: x"
        );
    }

    #[tokio::test]
    async fn test_version_and_argument_errors() {
        let text = run_buffered(["--version"]).await;
        assert_eq!(text, format!("netpulse {}\n", crate::VERSION));

        let text = run_buffered(["--no-download", "--no-upload"]).await;
        assert!(text.starts_with("speedtest error: "));

        let text = run_buffered(["--source", "203.0.113.77"]).await;
        assert!(text.starts_with("speedtest error: invalid source IP"));
    }

    #[tokio::test]
    async fn test_streaming_reports_errors_as_lines() {
        let (tx, mut rx) = mpsc::channel(8);
        run_streaming(["--csv-delimiter", ";;"], tx).await;

        let line = rx.recv().await.unwrap();
        assert!(line.starts_with("ERROR: "));
        assert!(rx.recv().await.is_none());
    }
}
