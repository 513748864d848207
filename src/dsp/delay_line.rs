//! # Delay Line (Block Ring Buffer)
//!
//! The delay line stores the feedback-mixed history of the echo and hands
//! back a block of it once the echo delay has elapsed.
//!
//! ## Blocks, not samples
//!
//! The host delivers audio in blocks (a "cycle"). The echo delay is a whole
//! number of those blocks, so the line is addressed one block at a time:
//!
//! 1. Read `block_len` samples starting `echo_delay_blocks * block_len`
//!    samples behind the cursor.
//! 2. Write `block_len` new samples starting at the cursor.
//! 3. Advance the cursor by `block_len`, wrapping modulo the capacity.
//!
//! The capacity is `echo_delay_blocks * max_block_len`. When the host runs
//! at its maximum block length the read position and the cursor coincide,
//! so every read returns exactly what was written `echo_delay_blocks`
//! cycles earlier, and the cursor returns to 0 after `echo_delay_blocks`
//! cycles.
//!
//! ## Wrapping inside a block
//!
//! When the host runs at a shorter block length that does not divide the
//! capacity, a block can straddle the end of the storage:
//!
//! ```text
//! capacity = 10, block_len = 4, cursor = 8
//!
//!   index:  0  1  2  3  4  5  6  7  8  9
//!          [b  b  .  .  .  .  .  .  a  a]
//!           └─ tail ┘                └ head ┘
//! ```
//!
//! Both reads and writes split into a head slice (up to the end of the
//! storage) and a tail slice (from index 0), so no sample is dropped or
//! duplicated across the boundary.

use nih_plug::nih_debug_assert;

use crate::config::{self, EchoConfig};

/// Circular history buffer addressed in blocks relative to a write cursor.
///
/// The storage is allocated once in [`DelayLine::new`]. Nothing on the
/// read or write path allocates.
pub struct DelayLine {
    /// Feedback-mixed history, zero (silence) until first written.
    buffer: Vec<f32>,

    /// Position the next write starts at. Always `< buffer.len()`.
    cursor: usize,
}

/// A borrowed view of one block of history.
///
/// Split in two when the block wraps past the end of the storage. `tail`
/// is empty when it doesn't.
#[derive(Debug, Clone, Copy)]
pub struct EchoWindow<'a> {
    head: &'a [f32],
    tail: &'a [f32],
}

impl<'a> EchoWindow<'a> {
    /// The window as two contiguous slices, in playback order.
    pub fn as_slices(&self) -> (&'a [f32], &'a [f32]) {
        (self.head, self.tail)
    }

    /// Samples in playback order.
    pub fn iter(&self) -> impl Iterator<Item = f32> + 'a {
        self.head.iter().chain(self.tail.iter()).copied()
    }

    pub fn len(&self) -> usize {
        self.head.len() + self.tail.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DelayLine {
    /// Allocate a zeroed delay line holding `echo_delay_blocks` blocks of
    /// `max_block_len` samples.
    ///
    /// # Errors
    ///
    /// [`ConfigError::ZeroBlockLength`](config::ConfigError::ZeroBlockLength)
    /// if `max_block_len` is zero, or
    /// [`ConfigError::CapacityOverflow`](config::ConfigError::CapacityOverflow)
    /// if the product doesn't fit in a `usize`.
    pub fn new(config: &EchoConfig, max_block_len: usize) -> config::Result<Self> {
        let capacity = config.history_len(max_block_len)?;
        Ok(Self {
            buffer: vec![0.0; capacity],
            cursor: 0,
        })
    }

    /// Total number of samples the line can hold.
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Where the next write will start.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Return the `block_len` samples that start `echo_delay_blocks` full
    /// blocks behind the cursor.
    ///
    /// # Index math
    ///
    /// ```text
    /// start = (cursor + capacity - (echo_delay_blocks * block_len) % capacity) % capacity
    /// ```
    ///
    /// Adding `capacity` before subtracting keeps the `usize` from going
    /// negative. A look-back of exactly `capacity` samples lands on the
    /// cursor itself, i.e. the oldest sample still stored.
    ///
    /// Callers must keep `echo_delay_blocks * block_len <= capacity`; a
    /// longer look-back would alias newer history. `block_len` is clamped
    /// to the capacity. Violations are logged in debug builds, never
    /// panicked on, since this runs inside the audio callback.
    pub fn read_echo(&self, block_len: usize, echo_delay_blocks: usize) -> EchoWindow<'_> {
        let capacity = self.capacity();
        let look_back = echo_delay_blocks.saturating_mul(block_len);
        nih_debug_assert!(
            look_back <= capacity,
            "look-back of {} samples exceeds capacity {}",
            look_back,
            capacity
        );

        let len = block_len.min(capacity);
        let start = (self.cursor + capacity - look_back % capacity) % capacity;
        let head_len = len.min(capacity - start);

        EchoWindow {
            head: &self.buffer[start..start + head_len],
            tail: &self.buffer[..len - head_len],
        }
    }

    /// Store `samples` starting at the cursor, then advance the cursor past
    /// them.
    ///
    /// At most `capacity` samples are written; anything beyond that would
    /// overwrite the start of the same write.
    pub fn write_mixed(&mut self, samples: &[f32]) {
        let capacity = self.capacity();
        nih_debug_assert!(
            samples.len() <= capacity,
            "block of {} samples exceeds capacity {}",
            samples.len(),
            capacity
        );

        let samples = &samples[..samples.len().min(capacity)];
        let head_len = samples.len().min(capacity - self.cursor);
        let (head, tail) = samples.split_at(head_len);

        self.buffer[self.cursor..self.cursor + head_len].copy_from_slice(head);
        self.buffer[..tail.len()].copy_from_slice(tail);

        self.cursor = (self.cursor + samples.len()) % capacity;
    }

    /// Clear the history to silence and move the cursor back to 0.
    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.cursor = 0;
    }
}
