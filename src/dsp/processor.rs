//! # Cycle Processor
//!
//! The real-time entry point, called once per audio cycle with one block of
//! live input.
//!
//! ## The Echo Algorithm
//!
//! ```text
//!              ┌──────────────────────────────────────┐
//!              │                                      │
//! input ──┬──►(+)──────────────────────────┬─────────────────► output
//!         │    ▲                           │          │
//!         │    │ echo                      ÷ divisor  │
//!         │    │                           │          │
//!         │  [Delay Line] ◄──────────────(+)◄─────────┘
//!         │   (echo_delay_blocks                ▲
//!         │    blocks of history)               │
//!         └─────────────────────────────────────┘
//! ```
//!
//! Per sample `i` of a block:
//!
//! ```text
//! output[i]   = input[i] + echo[i]
//! feedback[i] = input[i] + output[i] / feedback_divisor
//! ```
//!
//! `echo` is the block of `feedback` written `echo_delay_blocks` cycles
//! ago. Because `output` already contains the previous echo, each pass
//! through the loop scales the repeat by `1 / feedback_divisor`: a unit
//! impulse comes back as `1 + 1/d`, then `(1 + 1/d) / d`, then
//! `(1 + 1/d) / d²`, and so on.

use std::sync::Arc;

use super::delay_line::DelayLine;
use super::fault::{CycleFault, FaultMonitor};
use crate::config::{self, EchoConfig};

/// Level (relative to the first echo) below which the tail is inaudible:
/// -60 dB.
const TAIL_FLOOR_DB: f32 = -60.0;

/// Owns the echo history and turns input blocks into output blocks.
///
/// Everything is allocated in [`CycleProcessor::new`]. The `process*`
/// methods never allocate, lock, or panic on host-provided lengths.
pub struct CycleProcessor {
    config: EchoConfig,
    delay_line: DelayLine,

    /// One block of working space. Its length is the largest block the
    /// processor accepts.
    scratch: Vec<f32>,

    faults: Arc<FaultMonitor>,
}

impl CycleProcessor {
    /// Size the processor for blocks of up to `max_block_len` samples.
    ///
    /// `faults` is shared with whoever reports faults off the audio thread.
    pub fn new(
        config: EchoConfig,
        max_block_len: usize,
        faults: Arc<FaultMonitor>,
    ) -> config::Result<Self> {
        let delay_line = DelayLine::new(&config, max_block_len)?;
        Ok(Self {
            config,
            delay_line,
            scratch: vec![0.0; max_block_len],
            faults,
        })
    }

    pub fn config(&self) -> &EchoConfig {
        &self.config
    }

    /// Largest block accepted by `process` and `process_in_place`.
    pub fn max_block_len(&self) -> usize {
        self.scratch.len()
    }

    pub fn delay_line(&self) -> &DelayLine {
        &self.delay_line
    }

    /// Handle for inspecting faults from outside the audio thread.
    pub fn fault_monitor(&self) -> &Arc<FaultMonitor> {
        &self.faults
    }

    /// Run one cycle with separate input and output buffers.
    ///
    /// On error the input is copied to the output unchanged (any extra
    /// output samples are silenced), the history is left alone, and the
    /// fault is recorded in the [`FaultMonitor`].
    pub fn process(&mut self, input: &[f32], output: &mut [f32]) -> Result<(), CycleFault> {
        if input.len() != output.len() {
            let len = input.len().min(output.len());
            output[..len].copy_from_slice(&input[..len]);
            output[len..].fill(0.0);
            return Err(self.fault(CycleFault::LengthMismatch {
                input: input.len(),
                output: output.len(),
            }));
        }
        if let Err(fault) = self.check_block_len(input.len()) {
            output.copy_from_slice(input);
            return Err(fault);
        }

        let block_len = input.len();
        let divisor = self.config.feedback_divisor();

        let echo = self
            .delay_line
            .read_echo(block_len, self.config.echo_delay_blocks());
        for ((out, &dry), wet) in output.iter_mut().zip(input).zip(echo.iter()) {
            *out = dry + wet;
        }

        let feedback = &mut self.scratch[..block_len];
        for ((fb, &dry), &out) in feedback.iter_mut().zip(input).zip(output.iter()) {
            *fb = dry + out / divisor;
        }
        self.delay_line.write_mixed(feedback);

        Ok(())
    }

    /// Run one cycle on a buffer that holds the input on entry and must
    /// hold the output on return.
    ///
    /// On error the buffer is left untouched, so the input passes through.
    pub fn process_in_place(&mut self, block: &mut [f32]) -> Result<(), CycleFault> {
        self.check_block_len(block.len())?;

        let block_len = block.len();
        let divisor = self.config.feedback_divisor();

        // Keep the dry input: the feedback mix needs it after `block` has
        // been overwritten with the output.
        let feedback = &mut self.scratch[..block_len];
        feedback.copy_from_slice(block);

        let echo = self
            .delay_line
            .read_echo(block_len, self.config.echo_delay_blocks());
        for ((sample, &dry), wet) in block.iter_mut().zip(feedback.iter()).zip(echo.iter()) {
            *sample = dry + wet;
        }

        for (fb, &out) in feedback.iter_mut().zip(block.iter()) {
            *fb += out / divisor;
        }
        self.delay_line.write_mixed(feedback);

        Ok(())
    }

    /// Forget all history.
    pub fn reset(&mut self) {
        self.delay_line.clear();
        self.scratch.fill(0.0);
    }

    /// How long, in samples, the echo stays audible after the input stops
    /// at the given block length.
    ///
    /// Each repeat is `20 * log10(divisor)` dB quieter than the last, so
    /// reaching -60 dB takes `60 / (20 * log10(divisor))` repeats, each one
    /// `echo_delay_blocks` blocks apart. Returns `None` when the divisor is
    /// 1 and the echo never decays.
    pub fn tail_samples(&self, block_len: usize) -> Option<u32> {
        let divisor = self.config.feedback_divisor();
        if divisor <= 1.0 {
            return None;
        }

        let db_per_repeat = 20.0 * divisor.log10();
        let repeats = (-TAIL_FLOOR_DB / db_per_repeat).ceil() + 1.0;
        let period = self.config.history_len(block_len).ok()? as f32;

        Some((repeats * period).min(u32::MAX as f32) as u32)
    }

    fn check_block_len(&self, len: usize) -> Result<(), CycleFault> {
        let max = self.max_block_len();
        if len > max {
            return Err(self.fault(CycleFault::BlockTooLong { len, max }));
        }
        Ok(())
    }

    fn fault(&self, fault: CycleFault) -> CycleFault {
        self.faults.record(&fault);
        fault
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processor(
        echo_delay_blocks: usize,
        feedback_divisor: f32,
        max_block_len: usize,
    ) -> CycleProcessor {
        let config = EchoConfig::new(echo_delay_blocks, feedback_divisor).unwrap();
        CycleProcessor::new(config, max_block_len, Arc::default()).unwrap()
    }

    fn assert_block_eq(actual: &[f32], expected: &[f32]) {
        assert_eq!(actual.len(), expected.len());
        for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
            assert!((a - e).abs() < 1e-6, "sample {i}: expected {e}, got {a}");
        }
    }

    /// With an empty history the first `echo_delay_blocks` cycles are dry.
    #[test]
    fn test_dry_until_echo_delay_elapses() {
        let mut p = processor(3, 2.0, 4);
        let input = [0.1, 0.2, 0.3, 0.4];
        let mut output = [0.0; 4];

        for _ in 0..3 {
            p.process(&input, &mut output).unwrap();
            assert_block_eq(&output, &input);
        }
    }

    /// echo_delay_blocks=2, feedback_divisor=2, block length 4, one unit
    /// impulse followed by silence.
    ///
    /// cycle 0: out = [1, 0, 0, 0], stored [1.5, 0, 0, 0]
    /// cycle 1: out = 0
    /// cycle 2: out = [1.5, ...],   stored [0.75, ...]
    /// cycle 3: out = 0
    /// cycle 4: out = [0.75, ...],  stored [0.375, ...]
    /// cycle 5: out = 0
    #[test]
    fn test_impulse_scenario() {
        let mut p = processor(2, 2.0, 4);
        let mut output = [0.0; 4];
        let mut outputs = Vec::new();

        p.process(&[1.0, 0.0, 0.0, 0.0], &mut output).unwrap();
        outputs.push(output);
        for _ in 0..5 {
            p.process(&[0.0; 4], &mut output).unwrap();
            outputs.push(output);
        }

        assert_block_eq(&outputs[0], &[1.0, 0.0, 0.0, 0.0]);
        assert_block_eq(&outputs[1], &[0.0; 4]);
        assert_block_eq(&outputs[2], &[1.5, 0.0, 0.0, 0.0]);
        assert_block_eq(&outputs[3], &[0.0; 4]);
        assert_block_eq(&outputs[4], &[0.75, 0.0, 0.0, 0.0]);
        assert_block_eq(&outputs[5], &[0.0; 4]);
    }

    /// Output = input + what was stored `echo_delay_blocks` cycles ago,
    /// even while new input keeps arriving.
    #[test]
    fn test_echo_adds_to_live_input() {
        let mut p = processor(1, 4.0, 2);
        let mut output = [0.0; 2];

        p.process(&[1.0, 2.0], &mut output).unwrap();
        // stored: [1 + 1/4, 2 + 2/4] = [1.25, 2.5]
        p.process(&[0.5, 0.5], &mut output).unwrap();
        assert_block_eq(&output, &[1.75, 3.0]);
    }

    #[test]
    fn test_in_place_matches_separate_buffers() {
        let mut separate = processor(3, 2.0, 8);
        let mut in_place = processor(3, 2.0, 8);

        for cycle in 0..20 {
            let input: Vec<f32> = (0..8)
                .map(|i| ((cycle * 8 + i) as f32 * 0.37).sin())
                .collect();

            let mut output = vec![0.0; 8];
            separate.process(&input, &mut output).unwrap();

            let mut block = input.clone();
            in_place.process_in_place(&mut block).unwrap();

            assert_block_eq(&block, &output);
        }
    }

    /// A block longer than the processor was sized for passes through
    /// untouched and trips the fault monitor.
    #[test]
    fn test_oversized_block_passes_through() {
        let mut p = processor(2, 2.0, 4);
        let mut block = [1.0; 6];

        let result = p.process_in_place(&mut block);
        assert_eq!(result, Err(CycleFault::BlockTooLong { len: 6, max: 4 }));
        assert_block_eq(&block, &[1.0; 6]);
        assert_eq!(p.delay_line().cursor(), 0);
        assert!(p.fault_monitor().is_tripped());

        let input = [0.5; 6];
        let mut output = [0.0; 6];
        assert!(p.process(&input, &mut output).is_err());
        assert_block_eq(&output, &input);
    }

    #[test]
    fn test_length_mismatch_passes_through() {
        let mut p = processor(2, 2.0, 4);
        let mut output = [9.0; 4];

        let result = p.process(&[0.5, 0.5], &mut output);
        assert_eq!(
            result,
            Err(CycleFault::LengthMismatch {
                input: 2,
                output: 4,
            })
        );
        assert_block_eq(&output, &[0.5, 0.5, 0.0, 0.0]);
        assert_eq!(p.fault_monitor().drain().map(|s| s.count), Some(1));
    }

    #[test]
    fn test_empty_block_is_a_no_op() {
        let mut p = processor(2, 2.0, 4);
        p.process_in_place(&mut []).unwrap();
        assert_eq!(p.delay_line().cursor(), 0);
        assert!(!p.fault_monitor().is_tripped());
    }

    #[test]
    fn test_reset_forgets_history() {
        let mut p = processor(1, 2.0, 4);
        let mut block = [1.0; 4];
        p.process_in_place(&mut block).unwrap();

        p.reset();

        let mut block = [0.0; 4];
        p.process_in_place(&mut block).unwrap();
        assert_block_eq(&block, &[0.0; 4]);
    }

    #[test]
    fn test_tail_samples() {
        // Divisor 10 is -20 dB per repeat: 3 repeats to -60 dB, plus the
        // first echo, each 2 * 128 samples apart.
        let p = processor(2, 10.0, 128);
        assert_eq!(p.tail_samples(128), Some(4 * 256));

        let p = processor(2, 1.0, 128);
        assert_eq!(p.tail_samples(128), None);
    }
}
