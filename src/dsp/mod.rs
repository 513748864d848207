//! # DSP Core
//!
//! Everything that runs on the audio thread:
//!
//! - **`delay_line`**: the circular history buffer, read and written one
//!   block at a time relative to a write cursor.
//! - **`processor`**: the per-cycle echo transform on top of the delay
//!   line.
//! - **`fault`**: lock-free recording of invariant violations so they can
//!   be reported from a thread that is allowed to log.

pub mod delay_line;
pub mod fault;
pub mod processor;
