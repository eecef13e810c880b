//! Throughput measurement engine
//!
//! Both phases share one shape: a worker task per request, an
//! `Arc<Semaphore>` bounding how many run at once, and a single progress
//! aggregator fed by a bounded channel. Bytes are counted on an atomic
//! counter, so a full progress channel never loses data.

pub mod download;
pub mod payload;
pub mod progress;
pub mod upload;

pub use payload::{pre_allocate, CountingReader, PatternReader, UploadBody};
pub use progress::{bitrate, final_line, ProgressAggregator, ProgressStyle, TransferSample, TransferTally};

use crate::client::Transport;
use crate::context::RunContext;
use crate::error::AppError;
use crate::logging::MeasurementLogger;
use crate::output::OutputSink;
use crate::types::Phase;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Outcome of one transfer phase
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TransferReport {
    pub bits_per_second: f64,
    pub bytes: u64,
    pub elapsed: Duration,
    /// The phase deadline cut the transfer short; the bitrate covers the
    /// bytes moved before it
    pub deadline_reached: bool,
}

/// Drives the download and upload phases against the active server
#[derive(Clone)]
pub struct ThroughputMeasurer {
    transport: Arc<dyn Transport>,
    logger: MeasurementLogger,
    style: ProgressStyle,
    pre_allocate: bool,
}

impl ThroughputMeasurer {
    pub fn new(transport: Arc<dyn Transport>, logger: MeasurementLogger, style: ProgressStyle) -> Self {
        Self {
            transport,
            logger,
            style,
            pre_allocate: true,
        }
    }

    /// Build upload payloads before the phase clock starts instead of while
    /// sending
    pub fn with_pre_allocate(mut self, pre_allocate: bool) -> Self {
        self.pre_allocate = pre_allocate;
        self
    }

    /// Wait for every worker; a panicked worker is logged and counts as a
    /// failed request
    async fn join_workers(&self, phase: Phase, url: &str, tasks: Vec<JoinHandle<()>>) {
        for joined in futures::future::join_all(tasks).await {
            if let Err(e) = joined {
                let error = AppError::internal(format!("transfer worker stopped: {}", e));
                self.logger.log_transfer_failure(phase, url, &error).await;
            }
        }
    }

    /// Shared tail of both phases: final line and summary logging
    async fn finish(
        &self,
        ctx: &RunContext,
        phase: Phase,
        bytes: u64,
        elapsed: Duration,
        out: &Arc<dyn OutputSink>,
    ) -> TransferReport {
        let bits_per_second = bitrate(bytes, elapsed);
        let deadline_reached = ctx.is_cancelled();

        if self.style.enabled {
            out.write_text(&final_line(phase, bits_per_second, &self.style));
        }
        if deadline_reached {
            self.logger.log_phase_deadline(phase, bytes).await;
        }
        self.logger.log_phase_summary(phase, bytes, elapsed, bits_per_second).await;

        TransferReport {
            bits_per_second,
            bytes,
            elapsed,
            deadline_reached,
        }
    }
}
