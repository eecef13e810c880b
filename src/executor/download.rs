//! Download phase

use super::progress::{ProgressAggregator, TransferTally};
use super::{ThroughputMeasurer, TransferReport};
use crate::context::RunContext;
use crate::defaults::PROGRESS_CHANNEL_CAPACITY;
use crate::error::Result;
use crate::models::Server;
use crate::output::OutputSink;
use crate::types::Phase;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::Instant;

impl ThroughputMeasurer {
    /// Fetch the server's synthetic images with at most `concurrency`
    /// requests in flight. Failed requests contribute zero bytes; a deadline
    /// stops the phase early and the bytes read so far still count.
    pub async fn measure_download(
        &self,
        ctx: &RunContext,
        server: &Server,
        concurrency: usize,
        out: Arc<dyn OutputSink>,
    ) -> Result<TransferReport> {
        let urls = server.download_urls();
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let (tally, events) = TransferTally::new(PROGRESS_CHANNEL_CAPACITY);
        let counter = tally.counter();

        let started = Instant::now();
        let aggregator = ProgressAggregator::new(Phase::Download, self.style, &tally, started, out.clone()).spawn(events);

        let mut tasks = Vec::with_capacity(urls.len());
        for url in urls {
            let semaphore = semaphore.clone();
            let tally = tally.clone();
            let transport = self.transport.clone();
            let logger = self.logger.clone();
            let ctx = ctx.clone();

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

                if let Err(e) = ctx.run(transport.download(&url, &tally)).await {
                    logger.log_transfer_failure(Phase::Download, &url, &e).await;
                }
            });
            tasks.push(task);
        }

        // Workers hold the remaining senders; the aggregator ends with the last one
        drop(tally);
        self.join_workers(Phase::Download, &server.base_url(), tasks).await;
        let elapsed = started.elapsed();
        let _ = aggregator.await;

        let bytes = counter.load(std::sync::atomic::Ordering::Relaxed);
        Ok(self.finish(ctx, Phase::Download, bytes, elapsed, &out).await)
    }
}
