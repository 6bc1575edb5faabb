use bytes::{Bytes, BytesMut};

pub const DEFAULT_MAX_BUFFER_BYTES: usize = 2 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Buffered,
    /// The cap was exceeded and everything buffered, this chunk included,
    /// was discarded.
    Overflowed { discarded: usize },
}

/// Coalesces raw video chunks between timer flushes.
///
/// Exceeding the byte cap drops the whole buffer rather than trimming it:
/// a visible hiccup is preferred over growing memory or stale video.
pub struct PacketBatcher {
    buf: BytesMut,
    max_bytes: usize,
    overflows: u64,
    flushes: u64,
}

impl PacketBatcher {
    pub fn with_capacity(max_bytes: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            max_bytes,
            overflows: 0,
            flushes: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn overflows(&self) -> u64 {
        self.overflows
    }

    pub fn flushes(&self) -> u64 {
        self.flushes
    }

    /// Whether `len` more bytes can be buffered without overflowing.
    pub fn fits(&self, len: usize) -> bool {
        self.buf.len() + len <= self.max_bytes
    }

    pub fn push(&mut self, chunk: &[u8]) -> PushOutcome {
        self.buf.extend_from_slice(chunk);
        if self.buf.len() <= self.max_bytes {
            return PushOutcome::Buffered;
        }

        let discarded = self.buf.len();
        self.buf.clear();
        self.overflows += 1;
        metrics::counter!("mirror_batcher_overflow_total").increment(1);
        tracing::warn!(discarded, cap = self.max_bytes, "video batch overflowed, discarding");
        PushOutcome::Overflowed { discarded }
    }

    /// Takes everything buffered since the last flush.
    pub fn flush(&mut self) -> Option<Bytes> {
        if self.buf.is_empty() {
            return None;
        }
        let batch = self.buf.split().freeze();
        self.flushes += 1;
        metrics::histogram!("mirror_batcher_flush_bytes").record(batch.len() as f64);
        Some(batch)
    }
}
