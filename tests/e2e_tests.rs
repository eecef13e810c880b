//! End-to-end tests for complete measurement runs
//!
//! A wiremock server plays every role of the speed-test network: config
//! document, server catalog and the measurement endpoints of the single
//! server it lists. Runs go through the public entry points, so argument
//! parsing, discovery, selection and both transfer phases are exercised
//! together.

use assert_cmd::prelude::*;
use netpulse::{run_buffered, run_streaming};
use predicates::prelude::*;
use serde_json::Value;
use std::process::Command;
use tempfile::TempDir;
use tokio::sync::mpsc;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CONFIG_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<settings>
  <client ip="198.51.100.20" lat="52.37" lon="4.89" isp="Example Fiber" />
  <server-config ignoreids="99" threadcount="4" />
</settings>"#;

/// Catalog with one usable server on the mock host plus an ignored one
fn catalog_xml(uri: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<settings>
  <servers>
    <server url="{uri}/speedtest/upload.php" lat="52.30" lon="4.90" name="Amsterdam" country="Netherlands" sponsor="Mock Net" id="7" />
    <server url="{uri}/speedtest/upload.php" lat="52.37" lon="4.89" name="Ignored" country="Netherlands" sponsor="Ignored Net" id="99" />
  </servers>
</settings>"#
    )
}

/// Mount config, catalog and measurement endpoints
async fn start_speedtest_network() -> MockServer {
    let server = MockServer::start().await;
    let catalog = catalog_xml(&server.uri());

    Mock::given(method("GET"))
        .and(path("/speedtest-config.php"))
        .respond_with(ResponseTemplate::new(200).set_body_string(CONFIG_XML))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/speedtest-servers.php"))
        .respond_with(ResponseTemplate::new(200).set_body_string(catalog))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/latency.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("test=test\n"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/random\d+x\d+\.jpg$"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0x5a_u8; 16 * 1024]))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/speedtest/upload.php"))
        .respond_with(ResponseTemplate::new(200).set_body_string("size=0"))
        .mount(&server)
        .await;

    server
}

fn endpoint_args(server: &MockServer) -> Vec<String> {
    vec![
        "--config-url".to_string(),
        format!("{}/speedtest-config.php", server.uri()),
        "--server-list-url".to_string(),
        format!("{}/speedtest-servers.php", server.uri()),
        "--timeout".to_string(),
        "10".to_string(),
        "--no-color".to_string(),
    ]
}

#[tokio::test]
async fn test_human_run_reports_every_phase() {
    let server = start_speedtest_network().await;

    let output = run_buffered(endpoint_args(&server)).await;

    assert!(output.contains("Retrieving speedtest configuration..."), "{}", output);
    assert!(output.contains("Testing from Example Fiber (198.51.100.20)..."), "{}", output);
    assert!(output.contains("Hosted by Mock Net (Amsterdam)"), "{}", output);
    assert!(!output.contains("Ignored Net"), "{}", output);
    assert!(output.contains("Download: "), "{}", output);
    assert!(output.contains("Upload: "), "{}", output);
    assert!(!output.contains("ERROR"), "{}", output);
}

#[tokio::test]
async fn test_json_run_counts_transferred_bytes() {
    let server = start_speedtest_network().await;
    let mut args = endpoint_args(&server);
    args.push("--json".to_string());

    let output = run_buffered(args).await;
    let results: Value = serde_json::from_str(&output).expect("JSON output");

    assert_eq!(results["server"]["id"], 7);
    assert_eq!(results["client"]["ip"], "198.51.100.20");
    assert_eq!(results["bytes_received"], 8 * 16 * 1024);
    assert!(results["bytes_sent"].as_u64().unwrap() >= 6 * 32_768);
    assert!(results["download"].as_f64().unwrap() > 0.0);
    assert!(results["upload"].as_f64().unwrap() > 0.0);
    assert!(results["ping"].as_f64().unwrap() >= 0.0);
}

#[tokio::test]
async fn test_catalog_falls_back_to_next_list() {
    let server = start_speedtest_network().await;
    Mock::given(method("GET"))
        .and(path("/broken-servers.php"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let args = vec![
        "--config-url".to_string(),
        format!("{}/speedtest-config.php", server.uri()),
        "--server-list-url".to_string(),
        format!("{}/broken-servers.php", server.uri()),
        "--server-list-url".to_string(),
        format!("{}/speedtest-servers.php", server.uri()),
        "--list".to_string(),
    ];

    let output = run_buffered(args).await;
    assert!(output.contains("7) Mock Net (Amsterdam, Netherlands)"), "{}", output);
    assert!(!output.contains("ERROR"), "{}", output);
}

#[tokio::test]
async fn test_skipped_upload_posts_nothing() {
    let server = start_speedtest_network().await;
    let mut args = endpoint_args(&server);
    args.push("--no-upload".to_string());
    args.push("--simple".to_string());

    let output = run_buffered(args).await;
    assert!(output.starts_with("Ping: "), "{}", output);
    assert!(output.contains("Upload: 0.00 Mbps"), "{}", output);

    let posts = server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|request| request.method.as_str() == "POST")
        .count();
    assert_eq!(posts, 0);
}

#[tokio::test]
async fn test_unreachable_config_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let output = run_buffered(endpoint_args(&server)).await;
    assert!(output.contains("could not fetch config"), "{}", output);
}

#[tokio::test]
async fn test_streaming_run_delivers_lines() {
    let server = start_speedtest_network().await;
    let mut args = endpoint_args(&server);
    args.push("--simple".to_string());

    let (tx, mut rx) = mpsc::channel(256);
    run_streaming(args, tx).await;

    let mut lines = Vec::new();
    while let Ok(line) = rx.try_recv() {
        lines.push(line);
    }
    assert!(lines.iter().any(|line| line.starts_with("Ping: ")), "{:?}", lines);
    assert!(lines.iter().any(|line| line.starts_with("Download: ")), "{:?}", lines);
    assert!(lines.iter().any(|line| line.starts_with("Upload: ")), "{:?}", lines);
    assert!(!lines.iter().any(|line| line.starts_with("ERROR")), "{:?}", lines);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_binary_csv_run() {
    let server = start_speedtest_network().await;
    let mut args = endpoint_args(&server);
    args.push("--csv".to_string());
    args.push("--csv-header".to_string());

    let workdir = TempDir::new().unwrap();
    let assert = tokio::task::spawn_blocking(move || {
        Command::cargo_bin("netpulse")
            .unwrap()
            .current_dir(workdir.path())
            .args(&args)
            .assert()
    })
    .await
    .unwrap();

    assert
        .success()
        .stdout(predicate::str::starts_with("Server ID,Sponsor,Server Name,Distance,Ping"))
        .stdout(predicate::str::contains("7,Mock Net,Amsterdam,"));
}
