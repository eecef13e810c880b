//! Synthetic upload payloads
//!
//! Upload bodies are generated on the fly instead of being read from disk.
//! [`CountingReader`] adds every byte the transport actually pulls to a
//! counter shared by all upload workers of a phase.

use std::io::{self, Read};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Filler alphabet cycled through by [`PatternReader`]
pub const PATTERN: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Chunk size used when streaming an upload body
pub const UPLOAD_CHUNK_SIZE: usize = 16 * 1024;

/// Finite byte source yielding exactly `len` bytes of the cyclic pattern
#[derive(Debug, Clone)]
pub struct PatternReader {
    remaining: u64,
    position: usize,
}

impl PatternReader {
    pub fn new(len: u64) -> Self {
        Self {
            remaining: len,
            position: 0,
        }
    }
}

impl Read for PatternReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = (buf.len() as u64).min(self.remaining) as usize;
        for (i, byte) in buf[..n].iter_mut().enumerate() {
            *byte = PATTERN[(self.position + i) % PATTERN.len()];
        }
        self.position = (self.position + n) % PATTERN.len();
        self.remaining -= n as u64;
        Ok(n)
    }
}

/// Reader wrapper that adds bytes read to a shared counter, and optionally
/// to a second one owned by a single request
#[derive(Debug)]
pub struct CountingReader<R> {
    inner: R,
    counter: Arc<AtomicU64>,
    request: Option<Arc<AtomicU64>>,
}

impl<R: Read> CountingReader<R> {
    pub fn new(inner: R, counter: Arc<AtomicU64>) -> Self {
        Self {
            inner,
            counter,
            request: None,
        }
    }

    /// Also count into `request`
    pub fn with_request_counter(mut self, request: Arc<AtomicU64>) -> Self {
        self.request = Some(request);
        self
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            self.counter.fetch_add(n as u64, Ordering::Relaxed);
            if let Some(request) = &self.request {
                request.fetch_add(n as u64, Ordering::Relaxed);
            }
        }
        Ok(n)
    }
}

/// Pattern bytes of length `len`, generated up front
pub fn pre_allocate(len: u64) -> io::Result<Arc<[u8]>> {
    let mut data = Vec::with_capacity(len as usize);
    PatternReader::new(len).read_to_end(&mut data)?;
    Ok(data.into())
}

/// Where an upload body's bytes come from
#[derive(Debug)]
enum Payload {
    Pattern(PatternReader),
    Buffer(io::Cursor<Arc<[u8]>>),
}

impl Read for Payload {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Pattern(reader) => reader.read(buf),
            Self::Buffer(cursor) => cursor.read(buf),
        }
    }
}

/// One upload request body with its declared length
#[derive(Debug)]
pub struct UploadBody {
    reader: CountingReader<Payload>,
    len: u64,
}

impl UploadBody {
    /// Body generated while it is sent
    pub fn new(len: u64, counter: Arc<AtomicU64>) -> Self {
        Self {
            reader: CountingReader::new(Payload::Pattern(PatternReader::new(len)), counter),
            len,
        }
    }

    /// Body served from a buffer made by [`pre_allocate`]; buffers may be
    /// shared between bodies
    pub fn from_buffer(data: Arc<[u8]>, counter: Arc<AtomicU64>) -> Self {
        let len = data.len() as u64;
        Self {
            reader: CountingReader::new(Payload::Buffer(io::Cursor::new(data)), counter),
            len,
        }
    }

    /// Count this body's bytes into `request` as well as the phase counter,
    /// so a rejected request can be taken back out of the phase total
    pub fn with_request_counter(mut self, request: Arc<AtomicU64>) -> Self {
        self.reader = self.reader.with_request_counter(request);
        self
    }

    /// Value sent as `Content-Length`
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Stream the body as owned chunks; bytes are counted as each chunk is produced
    pub fn into_chunks(self, chunk_size: usize) -> UploadChunks {
        UploadChunks {
            reader: self.reader,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Read the whole body, returning how many bytes were consumed
    pub fn drain(self) -> io::Result<u64> {
        let mut reader = self.reader;
        io::copy(&mut reader, &mut io::sink())
    }
}

/// Iterator over the chunks of an [`UploadBody`]
pub struct UploadChunks {
    reader: CountingReader<Payload>,
    chunk_size: usize,
}

impl Iterator for UploadChunks {
    type Item = io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut chunk = vec![0u8; self.chunk_size];
        match self.reader.read(&mut chunk) {
            Ok(0) => None,
            Ok(n) => {
                chunk.truncate(n);
                Some(Ok(chunk))
            }
            Err(e) => Some(Err(e)),
        }
    }
}
