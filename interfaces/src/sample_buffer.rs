//! Timestamp-Indexed Sample Ring Buffer
//!
//! Circular store of IQ samples addressed by absolute sample time. The radio
//! side writes whatever packets the hardware delivers, the burst side asks for
//! "the samples starting at time T". Reads are consuming: after a read the
//! window starts right behind the returned samples.
//!
//! The buffer mutates its cursor and length on both read and write and has no
//! internal synchronisation. Only one task may own it.

use num_traits::Zero;
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Ring buffer errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SampleBufferError {
    #[error("Wrong length {requested} (capacity {capacity})")]
    InvalidLength { requested: usize, capacity: usize },

    #[error("Timestamp overflow: {count} samples at t={timestamp}")]
    TimestampOverflow { timestamp: i64, count: usize },
}

/// Result of a write request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// All samples were stored. `evicted` samples of older data were dropped
    /// to make room.
    Written { count: usize, evicted: usize },
    /// The write started before the window; nothing was stored and the
    /// producer has to resynchronise.
    Stale,
}

impl WriteOutcome {
    /// Number of samples stored, `None` for a stale write
    pub fn written(&self) -> Option<usize> {
        match self {
            WriteOutcome::Written { count, .. } => Some(*count),
            WriteOutcome::Stale => None,
        }
    }

    /// Whether the write forced older samples out of the buffer
    pub fn overflowed(&self) -> bool {
        matches!(self, WriteOutcome::Written { evicted, .. } if *evicted > 0)
    }
}

/// Result of a read request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The requested time was already consumed or evicted
    Past,
    /// Nothing is buffered at the requested time yet
    NotYet,
    /// This many samples were copied out
    Read(usize),
}

impl ReadOutcome {
    /// Number of samples copied out (0 unless `Read`)
    pub fn count(&self) -> usize {
        match self {
            ReadOutcome::Read(n) => *n,
            _ => 0,
        }
    }
}

/// Buffer anomaly counters
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BufferStats {
    pub writes: u64,
    pub reads: u64,
    pub gap_fills: u64,
    pub overwrites: u64,
    pub overflows: u64,
    pub stale_writes: u64,
    pub evicted_samples: u64,
}

/// Fixed-capacity circular sample store addressed by absolute timestamp
///
/// The buffer always holds the contiguous interval `[origin, origin + length)`.
/// Sample `t` of that interval lives at physical index
/// `(cursor + (t - origin)) % capacity`.
#[derive(Debug, Clone)]
pub struct SampleRingBuffer<T> {
    storage: Vec<T>,
    origin: i64,
    cursor: usize,
    length: usize,
    stats: BufferStats,
}

impl<T: Copy + Zero> SampleRingBuffer<T> {
    /// Create an empty buffer holding at most `capacity` samples
    pub fn new(capacity: usize) -> Result<Self, SampleBufferError> {
        if capacity == 0 {
            return Err(SampleBufferError::InvalidLength { requested: 0, capacity });
        }

        Ok(Self {
            storage: vec![T::zero(); capacity],
            origin: 0,
            cursor: 0,
            length: 0,
            stats: BufferStats::default(),
        })
    }

    /// Maximum number of samples held
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Number of buffered samples
    pub fn len(&self) -> usize {
        self.length
    }

    /// Whether nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Free room before a write starts evicting
    pub fn space(&self) -> usize {
        self.capacity() - self.length
    }

    /// Timestamp of the oldest buffered sample
    pub fn origin(&self) -> i64 {
        self.origin
    }

    /// Buffered interval as `(start, end)` with `end` exclusive
    pub fn window(&self) -> (i64, i64) {
        (self.origin, self.end())
    }

    /// Anomaly counters
    pub fn stats(&self) -> &BufferStats {
        &self.stats
    }

    /// Samples available from `timestamp` to the end of the window.
    /// `None` if `timestamp` is already in the past.
    pub fn available(&self, timestamp: i64) -> Option<usize> {
        if timestamp < self.origin {
            return None;
        }
        let end = self.end();
        if timestamp >= end {
            return Some(0);
        }
        Some((end - timestamp) as usize)
    }

    /// Store `samples` with the first one at `timestamp`
    pub fn write(&mut self, samples: &[T], timestamp: i64) -> Result<WriteOutcome, SampleBufferError> {
        let capacity = self.capacity();
        let count = samples.len();
        if count > capacity {
            return Err(SampleBufferError::InvalidLength { requested: count, capacity });
        }
        if count == 0 {
            return Ok(WriteOutcome::Written { count: 0, evicted: 0 });
        }
        let write_end = timestamp
            .checked_add(count as i64)
            .ok_or(SampleBufferError::TimestampOverflow { timestamp, count })?;

        if self.length == 0 {
            self.origin = timestamp;
        }
        if timestamp < self.origin {
            self.stats.stale_writes += 1;
            warn!("Attempt to write data in the past: t={} window starts at {}", timestamp, self.origin);
            return Ok(WriteOutcome::Stale);
        }

        let end = self.end();
        let new_end = end.max(write_end);

        if timestamp < end {
            self.stats.overwrites += 1;
            debug!("Overwriting {} unconsumed samples at t={}", end.min(write_end) - timestamp, timestamp);
        }

        // Drop the oldest samples so the new span fits
        let mut evicted = 0;
        let excess = new_end - self.origin - capacity as i64;
        if excess > 0 {
            evicted = (excess as u64).min(self.length as u64) as usize;
            self.cursor = (self.cursor + (excess as u64 % capacity as u64) as usize) % capacity;
            self.origin += excess;
            self.length -= evicted;
            self.stats.overflows += 1;
            self.stats.evicted_samples += evicted as u64;
            warn!("Buffer overflow: evicted {} samples, window now starts at {}", evicted, self.origin);
        }

        let fill_from = end.max(self.origin);
        if timestamp > fill_from {
            let gap = (timestamp - fill_from) as usize;
            self.fill_zero(fill_from, gap);
            self.stats.gap_fills += 1;
            debug!("Making gap in data: {} zero samples at t={}", gap, fill_from);
        }

        self.copy_in(timestamp, samples);
        self.length = (new_end - self.origin) as usize;
        self.stats.writes += 1;
        trace!("Wrote {} samples at t={}, window=[{}, {})", count, timestamp, self.origin, self.end());

        Ok(WriteOutcome::Written { count, evicted })
    }

    /// Copy up to `out.len()` samples starting at `timestamp` and consume
    /// everything up to the last returned sample
    pub fn read(&mut self, out: &mut [T], timestamp: i64) -> Result<ReadOutcome, SampleBufferError> {
        if out.is_empty() {
            return Err(SampleBufferError::InvalidLength { requested: 0, capacity: self.capacity() });
        }
        if timestamp < self.origin {
            return Ok(ReadOutcome::Past);
        }
        let end = self.end();
        if timestamp >= end {
            return Ok(ReadOutcome::NotYet);
        }

        let count = out.len().min((end - timestamp) as usize);
        self.copy_out(timestamp, &mut out[..count]);

        let consumed = (timestamp - self.origin) as usize + count;
        self.cursor = (self.cursor + consumed) % self.capacity();
        self.origin = timestamp + count as i64;
        self.length -= consumed;
        self.stats.reads += 1;
        trace!("Read {} samples at t={}, window=[{}, {})", count, timestamp, self.origin, self.end());

        Ok(ReadOutcome::Read(count))
    }

    fn end(&self) -> i64 {
        self.origin + self.length as i64
    }

    /// Physical index of a timestamp that is not before the origin
    fn index_of(&self, timestamp: i64) -> usize {
        let offset = (timestamp - self.origin) as usize;
        (self.cursor + offset) % self.capacity()
    }

    fn copy_in(&mut self, timestamp: i64, src: &[T]) {
        let start = self.index_of(timestamp);
        let first = (self.capacity() - start).min(src.len());
        self.storage[start..start + first].copy_from_slice(&src[..first]);
        self.storage[..src.len() - first].copy_from_slice(&src[first..]);
    }

    fn copy_out(&self, timestamp: i64, dst: &mut [T]) {
        let start = self.index_of(timestamp);
        let first = (self.capacity() - start).min(dst.len());
        let rest = dst.len() - first;
        dst[..first].copy_from_slice(&self.storage[start..start + first]);
        dst[first..].copy_from_slice(&self.storage[..rest]);
    }

    fn fill_zero(&mut self, timestamp: i64, count: usize) {
        let start = self.index_of(timestamp);
        let first = (self.capacity() - start).min(count);
        self.storage[start..start + first].fill(T::zero());
        self.storage[..count - first].fill(T::zero());
    }
}
