//! # Real-Time Fault Reporting
//!
//! The audio thread can't log, lock, or unwind. When the processor hits a
//! condition that should be impossible (a block longer than the delay line
//! was sized for), it passes the audio through untouched and records the
//! fault here with plain atomic stores. A non-real-time thread later drains
//! the monitor and writes the log line.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use thiserror::Error;

/// An invariant violation detected inside the audio callback.
///
/// Both variants mean the host broke its side of the contract. The cycle
/// that raised one passes its input through unchanged and leaves the delay
/// line as it was, so the echo resumes cleanly once the host behaves.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum CycleFault {
    /// The host delivered more samples than the delay line was sized for.
    #[error("block of {len} samples exceeds the negotiated maximum of {max}")]
    BlockTooLong {
        /// Samples in the offending block.
        len: usize,
        /// Largest block the processor was sized for in `initialize()`.
        max: usize,
    },

    /// Input and output buffers of different lengths.
    #[error("input block has {input} samples but output block has {output}")]
    LengthMismatch {
        /// Samples in the input buffer.
        input: usize,
        /// Samples in the output buffer.
        output: usize,
    },
}

/// Lock-free record of faults raised on the audio thread.
///
/// Shared between the audio thread and a reporting thread through an
/// `Arc`. All methods are wait-free.
///
/// ## Lifecycle of a burst
///
/// ```text
/// audio thread                        background thread
/// ────────────                        ─────────────────
/// record()        tripped = true
/// claim_report()  -> true, schedule
/// record()        count += 1
/// claim_report()  -> false
///                                     drain() -> Some(summary), re-arm
/// record()        tripped = true
/// claim_report()  -> true, schedule
/// ```
///
/// A host that keeps sending oversized blocks therefore produces one log
/// line per background drain, not one per cycle.
#[derive(Debug, Default)]
pub struct FaultMonitor {
    /// Set by the first fault after a drain.
    tripped: AtomicBool,

    /// Set once a report has been scheduled for the current burst.
    report_pending: AtomicBool,

    count: AtomicU64,
    last_len: AtomicUsize,
}

/// What [`FaultMonitor::drain`] found since the previous drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultSummary {
    /// Faults recorded since the last drain.
    pub count: u64,
    /// Length of the most recent offending block.
    pub last_len: usize,
}

impl FaultMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fault. Returns `true` if this is the first fault since the
    /// last [`drain`](Self::drain).
    pub fn record(&self, fault: &CycleFault) -> bool {
        let len = match *fault {
            CycleFault::BlockTooLong { len, .. } => len,
            CycleFault::LengthMismatch { input, .. } => input,
        };
        self.last_len.store(len, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        !self.tripped.swap(true, Ordering::AcqRel)
    }

    /// Whether a fault has been recorded and not yet drained.
    pub fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::Acquire)
    }

    /// Returns `true` exactly once per burst of faults, so the audio thread
    /// schedules one report instead of one per cycle. Re-armed by
    /// [`drain`](Self::drain).
    pub fn claim_report(&self) -> bool {
        self.is_tripped() && !self.report_pending.swap(true, Ordering::AcqRel)
    }

    /// Take the pending faults, resetting the monitor.
    pub fn drain(&self) -> Option<FaultSummary> {
        self.report_pending.store(false, Ordering::Release);
        if !self.tripped.swap(false, Ordering::AcqRel) {
            return None;
        }
        Some(FaultSummary {
            count: self.count.swap(0, Ordering::Relaxed),
            last_len: self.last_len.load(Ordering::Relaxed),
        })
    }
}
