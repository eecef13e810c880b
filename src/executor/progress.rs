//! Progress fan-in for transfer phases
//!
//! Workers report through a [`TransferTally`]: the atomic counter is the
//! authoritative byte total, the bounded channel only feeds the live display.
//! A single [`ProgressAggregator`] task per phase drains the channel and
//! exits once every sender is dropped.

use crate::defaults::{MIN_ELAPSED_SECS, PROGRESS_INTERVAL};
use crate::output::colored::{paint, speed_color, LABEL_COLOR};
use crate::output::formatter::format_rate;
use crate::output::OutputSink;
use crate::types::Phase;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

const SPINNER: [char; 4] = ['|', '/', '-', '\\'];

/// Bytes moved by one worker step; consumed by the aggregator only
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferSample {
    pub bytes: u64,
}

/// Worker-side handle for reporting transferred bytes
#[derive(Debug, Clone)]
pub struct TransferTally {
    counter: Arc<AtomicU64>,
    events: mpsc::Sender<TransferSample>,
}

impl TransferTally {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<TransferSample>) {
        let (events, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                counter: Arc::new(AtomicU64::new(0)),
                events,
            },
            receiver,
        )
    }

    /// Count bytes and notify the display
    pub fn record(&self, bytes: u64) {
        self.counter.fetch_add(bytes, Ordering::Relaxed);
        self.notify(bytes);
    }

    /// Notify the display about bytes already counted elsewhere. Never blocks;
    /// a full channel drops the sample.
    pub fn notify(&self, bytes: u64) {
        let _ = self.events.try_send(TransferSample { bytes });
    }

    /// Take back bytes counted for a request that did not succeed
    pub fn retract(&self, bytes: u64) {
        let _ = self
            .counter
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |total| Some(total.saturating_sub(bytes)));
    }

    /// Shared counter, handed to [`CountingReader`](super::payload::CountingReader)s
    pub fn counter(&self) -> Arc<AtomicU64> {
        self.counter.clone()
    }
}

/// Bits per second over a wall-clock window, with the window floored to
/// avoid division by zero
pub fn bitrate(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64().max(MIN_ELAPSED_SECS);
    (bytes as f64 * 8.0) / secs
}

/// How progress and the final phase line are rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressStyle {
    /// Report MB/s instead of Mbps
    pub bytes_mode: bool,
    pub use_color: bool,
    /// Emit live ticks and the final line at all
    pub enabled: bool,
}

impl Default for ProgressStyle {
    fn default() -> Self {
        Self {
            bytes_mode: false,
            use_color: false,
            enabled: true,
        }
    }
}

/// Per-phase aggregator task state
pub struct ProgressAggregator {
    phase: Phase,
    style: ProgressStyle,
    counter: Arc<AtomicU64>,
    /// Expected upload total, shown as the denominator
    expected: Option<u64>,
    started: Instant,
    out: Arc<dyn OutputSink>,
}

impl ProgressAggregator {
    pub fn new(phase: Phase, style: ProgressStyle, tally: &TransferTally, started: Instant, out: Arc<dyn OutputSink>) -> Self {
        Self {
            phase,
            style,
            counter: tally.counter(),
            expected: None,
            started,
            out,
        }
    }

    pub fn with_expected(mut self, expected: u64) -> Self {
        self.expected = Some(expected);
        self
    }

    /// Spawn the aggregator; the handle resolves to the bytes seen on the
    /// channel once every sender has been dropped
    pub fn spawn(self, events: mpsc::Receiver<TransferSample>) -> JoinHandle<u64> {
        tokio::spawn(self.run(events))
    }

    async fn run(self, mut events: mpsc::Receiver<TransferSample>) -> u64 {
        let mut ticker = tokio::time::interval_at(self.started + PROGRESS_INTERVAL, PROGRESS_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut seen = 0u64;
        let mut spin = 0usize;

        loop {
            tokio::select! {
                sample = events.recv() => match sample {
                    Some(sample) => seen += sample.bytes,
                    None => break,
                },
                _ = ticker.tick() => {
                    if self.style.enabled {
                        self.out.write_text(&self.tick_line(spin, seen));
                    }
                    spin += 1;
                }
            }
        }

        seen
    }

    fn tick_line(&self, spin: usize, seen: u64) -> String {
        let spinner = SPINNER[spin % SPINNER.len()];
        match self.phase {
            Phase::Upload => {
                let sent = self.counter.load(Ordering::Relaxed);
                let (value, unit) = format_rate(bitrate(sent, self.started.elapsed()), self.style.bytes_mode);
                format!(
                    "\rTesting upload... {}  uploaded: {:.2}/{:.2} MB ({:.2} {})",
                    spinner,
                    sent as f64 / 1e6,
                    self.expected.unwrap_or(0) as f64 / 1e6,
                    value,
                    unit
                )
            }
            _ => {
                let (value, unit) = format_rate(bitrate(seen, self.started.elapsed()), self.style.bytes_mode);
                format!(
                    "\rTesting download... {}  downloaded: {:.2} MB ({:.2} {})",
                    spinner,
                    seen as f64 / 1e6,
                    value,
                    unit
                )
            }
        }
    }
}

/// The line that overwrites the live ticks once a phase is done
pub fn final_line(phase: Phase, bits_per_second: f64, style: &ProgressStyle) -> String {
    let (value, unit) = format_rate(bits_per_second, style.bytes_mode);
    let label = paint(phase.label(), LABEL_COLOR, style.use_color);
    let rate = paint(&format!("{:.2} {}", value, unit), speed_color(bits_per_second / 1e6), style.use_color);
    format!("\r{}: {}    \n", label, rate)
}
