//! # Buffer Clock
//!
//! Maps block timestamps onto fixed-length buffer windows.
//!
//! Buffer `i` covers `[offset + i * window, offset + (i + 1) * window)`.

use crate::domain::{invariant_window_positive, RelayError};

/// Buffer index containing `timestamp`.
///
/// `floor((timestamp - offset) / window)`. Fails for a zero window or a
/// timestamp before the offset.
pub fn buffer_index_for(
    timestamp: u64,
    window_secs: u64,
    offset_secs: u64,
) -> Result<u64, RelayError> {
    invariant_window_positive(window_secs)?;
    let since_offset = timestamp
        .checked_sub(offset_secs)
        .ok_or(RelayError::TimestampBeforeOffset {
            timestamp,
            offset: offset_secs,
        })?;
    Ok(since_offset / window_secs)
}

/// Whether block production has fallen more than one window behind wall time.
pub fn is_buffer_expired(block_timestamp: u64, wall_timestamp: u64, window_secs: u64) -> bool {
    wall_timestamp.saturating_sub(block_timestamp) > window_secs
}

/// Validated window/offset pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferClock {
    window_secs: u64,
    offset_secs: u64,
}

impl BufferClock {
    /// Create a clock. Fails with `InvalidConfig` for a zero window.
    pub fn new(window_secs: u64, offset_secs: u64) -> Result<Self, RelayError> {
        invariant_window_positive(window_secs)?;
        Ok(Self {
            window_secs,
            offset_secs,
        })
    }

    /// Window length in seconds.
    pub fn window_secs(&self) -> u64 {
        self.window_secs
    }

    /// Offset of buffer zero in seconds.
    pub fn offset_secs(&self) -> u64 {
        self.offset_secs
    }

    /// Buffer index containing `timestamp`.
    pub fn index_for(&self, timestamp: u64) -> Result<u64, RelayError> {
        buffer_index_for(timestamp, self.window_secs, self.offset_secs)
    }

    /// Whether the chain head at `block_timestamp` is stalled at `wall_timestamp`.
    pub fn is_expired(&self, block_timestamp: u64, wall_timestamp: u64) -> bool {
        is_buffer_expired(block_timestamp, wall_timestamp, self.window_secs)
    }

    /// First second covered by buffer `index`.
    pub fn buffer_start(&self, index: u64) -> u64 {
        self.offset_secs
            .saturating_add(index.saturating_mul(self.window_secs))
    }

    /// First second after buffer `index`.
    pub fn buffer_end(&self, index: u64) -> u64 {
        self.buffer_start(index.saturating_add(1))
    }
}
