//! Destinations for progress and result text
//!
//! Every stage of a run writes through [`OutputSink::write_text`]. Text may end
//! mid-line (live progress) and may start with `\r` to overwrite the current
//! line.

use regex::Regex;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use tokio::sync::mpsc;

/// Accepts text, possibly partial lines
pub trait OutputSink: Send + Sync {
    fn write_text(&self, text: &str);
}

/// Collects everything into one string returned at the end of the run
#[derive(Debug, Default)]
pub struct BufferedSink {
    buffer: Mutex<String>,
}

impl BufferedSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything written so far
    pub fn contents(&self) -> String {
        match self.buffer.lock() {
            Ok(buffer) => buffer.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl OutputSink for BufferedSink {
    fn write_text(&self, text: &str) {
        let mut buffer = match self.buffer.lock() {
            Ok(buffer) => buffer,
            Err(poisoned) => poisoned.into_inner(),
        };
        buffer.push_str(text);
    }
}

/// Forwards completed lines over a bounded channel to a live consumer.
///
/// Partial output is held in a carry-over buffer until its newline arrives. A
/// carriage return discards the pending partial line, so progress ticks never
/// reach the consumer; only the line that finally overwrites them does. ANSI
/// escapes are stripped. Sends never block: when the channel is full the line
/// is dropped and counted.
#[derive(Debug)]
pub struct StreamingSink {
    sender: mpsc::Sender<String>,
    carry: Mutex<String>,
    dropped: AtomicU64,
}

impl StreamingSink {
    pub fn new(sender: mpsc::Sender<String>) -> Self {
        Self {
            sender,
            carry: Mutex::new(String::new()),
            dropped: AtomicU64::new(0),
        }
    }

    /// Send any pending partial line
    pub fn flush_remainder(&self) {
        let remainder = {
            let mut carry = self.lock_carry();
            std::mem::take(&mut *carry)
        };
        if !remainder.is_empty() {
            self.send_line(&remainder);
        }
    }

    /// Send a line that bypasses the carry-over buffer
    pub fn send_line(&self, line: &str) {
        if self.sender.try_send(strip_ansi(line)).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Lines lost to a full or closed channel
    pub fn dropped_lines(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn lock_carry(&self) -> std::sync::MutexGuard<'_, String> {
        match self.carry.lock() {
            Ok(carry) => carry,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl OutputSink for StreamingSink {
    fn write_text(&self, text: &str) {
        let mut completed = Vec::new();
        {
            let mut carry = self.lock_carry();
            for piece in text.split_inclusive('\n') {
                let (body, ends_line) = match piece.strip_suffix('\n') {
                    Some(body) => (body, true),
                    None => (piece, false),
                };
                match body.rfind('\r') {
                    Some(index) => {
                        carry.clear();
                        carry.push_str(&body[index + 1..]);
                    }
                    None => carry.push_str(body),
                }
                if ends_line {
                    completed.push(std::mem::take(&mut *carry));
                }
            }
        }
        for line in completed {
            self.send_line(&line);
        }
    }
}

/// Writes straight to stdout, flushing so `\r` progress shows immediately
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl ConsoleSink {
    pub fn new() -> Self {
        Self
    }
}

impl OutputSink for ConsoleSink {
    fn write_text(&self, text: &str) {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        let _ = handle.write_all(text.as_bytes());
        let _ = handle.flush();
    }
}

fn ansi_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").ok())
        .as_ref()
}

/// Remove ANSI escape sequences and stray carriage returns
pub fn strip_ansi(text: &str) -> String {
    let text = text.replace('\r', "");
    match ansi_pattern() {
        Some(pattern) => pattern.replace_all(&text, "").into_owned(),
        None => text,
    }
}
