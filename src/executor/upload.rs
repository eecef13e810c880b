//! Upload phase

use super::payload::{pre_allocate, UploadBody};
use super::progress::{ProgressAggregator, TransferTally};
use super::{ThroughputMeasurer, TransferReport};
use crate::context::RunContext;
use crate::defaults::{PROGRESS_CHANNEL_CAPACITY, UPLOAD_REQUESTS, UPLOAD_SIZES};
use crate::error::{AppError, Result};
use crate::models::Server;
use crate::output::OutputSink;
use crate::types::Phase;
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::Instant;

/// Payload sizes for one upload phase, drawn from [`UPLOAD_SIZES`]
pub fn pick_upload_sizes(count: usize) -> Vec<u64> {
    let mut rng = rand::rng();
    (0..count)
        .map(|_| UPLOAD_SIZES[rng.random_range(0..UPLOAD_SIZES.len())])
        .collect()
}

impl ThroughputMeasurer {
    /// POST synthetic payloads to the server's `upload.php`. The bitrate is
    /// computed from the bytes the transport actually pulled from the
    /// payloads of requests that were accepted or cut off by the deadline;
    /// if that is zero the phase fails. Pre-allocated payloads are
    /// built before the phase clock starts.
    pub async fn measure_upload(
        &self,
        ctx: &RunContext,
        server: &Server,
        concurrency: usize,
        out: Arc<dyn OutputSink>,
    ) -> Result<TransferReport> {
        let url = server.upload_url();
        let sizes = pick_upload_sizes(UPLOAD_REQUESTS);
        let expected: u64 = sizes.iter().sum();

        let mut buffers: HashMap<u64, Arc<[u8]>> = HashMap::new();
        if self.pre_allocate {
            for &size in &sizes {
                if !buffers.contains_key(&size) {
                    buffers.insert(size, pre_allocate(size)?);
                }
            }
        }

        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let (tally, events) = TransferTally::new(PROGRESS_CHANNEL_CAPACITY);
        let counter = tally.counter();

        let started = Instant::now();
        let aggregator = ProgressAggregator::new(Phase::Upload, self.style, &tally, started, out.clone())
            .with_expected(expected)
            .spawn(events);

        let mut tasks = Vec::with_capacity(sizes.len());
        for size in sizes {
            let semaphore = semaphore.clone();
            let tally = tally.clone();
            let transport = self.transport.clone();
            let logger = self.logger.clone();
            let ctx = ctx.clone();
            let url = url.clone();
            let buffer = buffers.get(&size).cloned();

            let task = tokio::spawn(async move {
                let _permit = tokio::select! {
                    biased;
                    _ = ctx.cancelled() => return,
                    permit = semaphore.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return,
                    },
                };
                if ctx.is_cancelled() {
                    return;
                }

                let request = Arc::new(AtomicU64::new(0));
                let body = match buffer {
                    Some(data) => UploadBody::from_buffer(data, tally.counter()),
                    None => UploadBody::new(size, tally.counter()),
                }
                .with_request_counter(request.clone());

                let failure = match ctx.run(transport.upload(&url, body)).await {
                    Ok(status) if (200..300).contains(&status) => {
                        tally.notify(size);
                        None
                    }
                    Ok(status) => Some(AppError::http_request(format!("HTTP {} from {}", status, url))),
                    // Cut off by the deadline: bytes sent so far still count
                    Err(_) if ctx.is_cancelled() => None,
                    Err(e) => Some(e),
                };
                if let Some(error) = failure {
                    tally.retract(request.load(Ordering::Relaxed));
                    logger.log_transfer_failure(Phase::Upload, &url, &error).await;
                }
            });
            tasks.push(task);
        }

        drop(tally);
        self.join_workers(Phase::Upload, &url, tasks).await;
        let elapsed = started.elapsed();
        let _ = aggregator.await;

        let sent = counter.load(Ordering::Relaxed);
        if sent == 0 {
            return Err(AppError::zero_bytes_uploaded(format!(
                "{} requests to {} sent nothing",
                UPLOAD_REQUESTS, url
            )));
        }

        Ok(self.finish(ctx, Phase::Upload, sent, elapsed, &out).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::{MockTransport, UploadBehavior};
    use crate::client::{ClientConfig, HttpTransport};
    use crate::executor::ProgressStyle;
    use crate::logging::{Logger, MeasurementLogger, NetworkLogger};
    use crate::output::BufferedSink;
    use std::time::Duration;
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    fn server() -> Server {
        Server::from_url(1, "http://speed.example.net/speedtest/upload.php", "S", "N", "C", 1.0).unwrap()
    }

    fn measurer(behavior: UploadBehavior) -> (ThroughputMeasurer, Arc<MockTransport>) {
        let transport = Arc::new(MockTransport::new().with_upload(behavior));
        let measurer = ThroughputMeasurer::new(
            transport.clone(),
            MeasurementLogger::from_logger(Logger::silent("MEASURE")),
            ProgressStyle::default(),
        );
        (measurer, transport)
    }

    #[test]
    fn test_sizes_come_from_the_fixed_set() {
        let sizes = pick_upload_sizes(100);
        assert_eq!(sizes.len(), 100);
        assert!(sizes.iter().all(|size| UPLOAD_SIZES.contains(size)));
    }

    #[tokio::test]
    async fn test_counts_bytes_actually_sent() {
        let (measurer, transport) = measurer(UploadBehavior::Consume);
        let sink = Arc::new(BufferedSink::new());

        let report = measurer
            .measure_upload(&RunContext::new(), &server(), 4, sink.clone())
            .await
            .unwrap();

        let calls = transport.calls();
        assert_eq!(calls.len(), UPLOAD_REQUESTS);
        assert!(calls
            .iter()
            .all(|call| call == "POST http://speed.example.net/speedtest/upload.php"));
        assert!(report.bytes >= UPLOAD_SIZES[0] * UPLOAD_REQUESTS as u64);
        assert!(report.bytes <= UPLOAD_SIZES[4] * UPLOAD_REQUESTS as u64);
        assert!(report.bits_per_second > 0.0);
        assert!(sink.contents().contains("\rUpload: "));
    }

    #[tokio::test]
    async fn test_generated_payloads_count_the_same() {
        let (measurer, transport) = measurer(UploadBehavior::Consume);
        let measurer = measurer.with_pre_allocate(false);

        let report = measurer
            .measure_upload(&RunContext::new(), &server(), 2, Arc::new(BufferedSink::new()))
            .await
            .unwrap();

        assert_eq!(transport.calls().len(), UPLOAD_REQUESTS);
        assert!(report.bytes >= UPLOAD_SIZES[0] * UPLOAD_REQUESTS as u64);
        assert!(report.bytes <= UPLOAD_SIZES[4] * UPLOAD_REQUESTS as u64);
    }

    #[tokio::test]
    async fn test_rejected_uploads_fail_the_phase() {
        let (measurer, transport) = measurer(UploadBehavior::Reject(403));
        let sink = Arc::new(BufferedSink::new());

        let err = measurer
            .measure_upload(&RunContext::new(), &server(), 4, sink.clone())
            .await
            .unwrap_err();

        assert_eq!(err.category(), "ZERO_UPLOAD");
        assert_eq!(transport.calls().len(), UPLOAD_REQUESTS);
        assert!(!sink.contents().contains("\rUpload: "));
    }

    #[tokio::test]
    async fn test_bodies_read_then_rejected_count_nothing() {
        let (measurer, transport) = measurer(UploadBehavior::ReadThenReject(403));

        let err = measurer
            .measure_upload(&RunContext::new(), &server(), 4, Arc::new(BufferedSink::new()))
            .await
            .unwrap_err();

        assert_eq!(err.category(), "ZERO_UPLOAD");
        assert_eq!(transport.calls().len(), UPLOAD_REQUESTS);
    }

    #[tokio::test]
    async fn test_http_403_after_reading_body_fails_the_phase() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/speedtest/upload.php"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&mock_server)
            .await;

        let config = ClientConfig {
            timeout: Duration::from_secs(5),
            ..ClientConfig::default()
        };
        let transport = HttpTransport::new(&config, NetworkLogger::from_logger(Logger::silent("NET"))).unwrap();
        let measurer = ThroughputMeasurer::new(
            Arc::new(transport),
            MeasurementLogger::from_logger(Logger::silent("MEASURE")),
            ProgressStyle::default(),
        );
        let target = Server::from_url(
            1,
            &format!("{}/speedtest/upload.php", mock_server.uri()),
            "S",
            "N",
            "C",
            1.0,
        )
        .unwrap();

        let err = measurer
            .measure_upload(&RunContext::new(), &target, 2, Arc::new(BufferedSink::new()))
            .await
            .unwrap_err();

        assert_eq!(err.category(), "ZERO_UPLOAD");
        let requests = mock_server.received_requests().await.unwrap();
        assert_eq!(requests.len(), UPLOAD_REQUESTS);
        assert!(requests.iter().all(|r| !r.body.is_empty()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_mid_upload_keeps_partial_bytes() {
        let (measurer, transport) = measurer(UploadBehavior::Trickle {
            chunk: 4096,
            pause: Duration::from_millis(100),
        });
        let ctx = RunContext::with_timeout(Duration::from_millis(250));

        let report = measurer
            .measure_upload(&ctx, &server(), UPLOAD_REQUESTS, Arc::new(BufferedSink::new()))
            .await
            .unwrap();

        let smallest_phase = UPLOAD_SIZES[0] * UPLOAD_REQUESTS as u64;
        assert!(report.deadline_reached);
        assert!(report.bytes > 0);
        assert!(report.bytes < smallest_phase, "{}", report.bytes);
        assert!(report.bits_per_second > 0.0);
        assert_eq!(transport.calls().len(), UPLOAD_REQUESTS);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_sends_nothing() {
        let (measurer, transport) = measurer(UploadBehavior::Consume);
        let ctx = RunContext::new();
        ctx.cancel();

        let err = measurer
            .measure_upload(&ctx, &server(), 1, Arc::new(BufferedSink::new()))
            .await
            .unwrap_err();
        assert_eq!(err.category(), "ZERO_UPLOAD");
        assert!(transport.calls().is_empty());
    }
}
