//! # Echo Configuration
//!
//! The echo has exactly two knobs:
//!
//! - **Echo delay** in whole blocks: how many audio cycles separate the
//!   live signal from its reflection. At 256 samples per block and
//!   48 kHz, the default of 15 blocks is an 80ms slapback.
//! - **Feedback divisor**: each pass through the loop divides the echoed
//!   signal by this amount before it is stored again. A divisor of 2
//!   halves every repeat (-6 dB per echo).
//!
//! Both are checked here, once, before anything is allocated or handed to
//! the audio thread. The real-time path never has to re-validate them.

use std::num::NonZeroUsize;
use std::sync::OnceLock;

use thiserror::Error;

/// Default echo delay, in blocks.
pub const DEFAULT_ECHO_DELAY_BLOCKS: usize = 15;

/// Default feedback divisor.
pub const DEFAULT_FEEDBACK_DIVISOR: f32 = 2.0;

/// Upper bound on the echo delay. Keeps the history buffer at a few MB
/// even with the largest block sizes hosts hand out.
pub const MAX_ECHO_DELAY_BLOCKS: usize = 256;

/// Smallest feedback divisor that cannot make the loop gain exceed unity.
///
/// A divisor below 1 amplifies every repeat, so the echo grows without
/// bound. Exactly 1 sustains the echo forever at constant level.
pub const MIN_FEEDBACK_DIVISOR: f32 = 1.0;

/// Largest accepted feedback divisor: each repeat 24 dB quieter than the
/// last.
pub const MAX_FEEDBACK_DIVISOR: f32 = 16.0;

/// Errors raised while validating the echo configuration or sizing the
/// delay line. All of them are fatal at startup.
#[derive(Debug, Clone, Copy, Error, PartialEq)]
pub enum ConfigError {
    /// An echo delay of zero blocks would read the block being written.
    #[error("echo delay must be at least one block")]
    ZeroEchoDelay,

    /// The echo delay exceeds [`MAX_ECHO_DELAY_BLOCKS`].
    #[error("echo delay of {blocks} blocks exceeds the maximum of {max}")]
    EchoDelayTooLong {
        /// Requested delay in blocks.
        blocks: usize,
        /// Largest accepted delay.
        max: usize,
    },

    /// The feedback divisor is not a finite number between
    /// [`MIN_FEEDBACK_DIVISOR`] and [`MAX_FEEDBACK_DIVISOR`].
    #[error("feedback divisor must be between 1 and 16, got {0}")]
    InvalidFeedbackDivisor(f32),

    /// The host negotiated a zero-length block.
    #[error("block length must be at least one sample")]
    ZeroBlockLength,

    /// `blocks * block_len` does not fit in memory addressing.
    #[error("delay line of {blocks} blocks x {block_len} samples overflows")]
    CapacityOverflow {
        /// Echo delay in blocks.
        blocks: usize,
        /// Negotiated maximum block length.
        block_len: usize,
    },
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// A validated echo configuration.
///
/// The fields are private so that every `EchoConfig` in existence went
/// through [`EchoConfig::new`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EchoConfig {
    echo_delay_blocks: NonZeroUsize,
    feedback_divisor: f32,
}

impl EchoConfig {
    /// Validate and build a configuration.
    ///
    /// The accepted ranges are the same ones the plugin parameters expose,
    /// so any configuration the launcher accepts survives a trip through
    /// the host's normalized parameter values.
    pub fn new(echo_delay_blocks: usize, feedback_divisor: f32) -> Result<Self> {
        let echo_delay_blocks =
            NonZeroUsize::new(echo_delay_blocks).ok_or(ConfigError::ZeroEchoDelay)?;
        if echo_delay_blocks.get() > MAX_ECHO_DELAY_BLOCKS {
            return Err(ConfigError::EchoDelayTooLong {
                blocks: echo_delay_blocks.get(),
                max: MAX_ECHO_DELAY_BLOCKS,
            });
        }

        // Also rejects NaN and the infinities.
        if !(MIN_FEEDBACK_DIVISOR..=MAX_FEEDBACK_DIVISOR).contains(&feedback_divisor) {
            return Err(ConfigError::InvalidFeedbackDivisor(feedback_divisor));
        }

        Ok(Self {
            echo_delay_blocks,
            feedback_divisor,
        })
    }

    /// How many blocks back the echo is read from.
    pub fn echo_delay_blocks(&self) -> usize {
        self.echo_delay_blocks.get()
    }

    /// Attenuation applied to the output before it is fed back.
    pub fn feedback_divisor(&self) -> f32 {
        self.feedback_divisor
    }

    /// Number of samples in `echo_delay_blocks` blocks of `block_len`.
    pub fn history_len(&self, block_len: usize) -> Result<usize> {
        if block_len == 0 {
            return Err(ConfigError::ZeroBlockLength);
        }
        self.echo_delay_blocks
            .get()
            .checked_mul(block_len)
            .ok_or(ConfigError::CapacityOverflow {
                blocks: self.echo_delay_blocks.get(),
                block_len,
            })
    }
}

impl Default for EchoConfig {
    fn default() -> Self {
        Self {
            echo_delay_blocks: NonZeroUsize::new(DEFAULT_ECHO_DELAY_BLOCKS)
                .unwrap_or(NonZeroUsize::MIN),
            feedback_divisor: DEFAULT_FEEDBACK_DIVISOR,
        }
    }
}

/// Startup configuration chosen by the standalone launcher.
static STARTUP_DEFAULTS: OnceLock<EchoConfig> = OnceLock::new();

/// Set the configuration that new plugin instances start from.
///
/// The standalone launcher calls this once, before the host constructs the
/// plugin. Later calls are rejected and hand the config back.
pub fn set_startup_defaults(config: EchoConfig) -> std::result::Result<(), EchoConfig> {
    STARTUP_DEFAULTS.set(config)
}

/// The configuration new plugin instances start from: whatever the launcher
/// set, or [`EchoConfig::default`].
pub fn startup_defaults() -> EchoConfig {
    STARTUP_DEFAULTS.get().copied().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EchoConfig::default();
        assert_eq!(config.echo_delay_blocks(), 15);
        assert_eq!(config.feedback_divisor(), 2.0);
        assert_eq!(EchoConfig::new(15, 2.0), Ok(config));
    }

    #[test]
    fn test_zero_echo_delay_rejected() {
        assert_eq!(EchoConfig::new(0, 2.0), Err(ConfigError::ZeroEchoDelay));
    }

    #[test]
    fn test_echo_delay_upper_bound() {
        assert!(EchoConfig::new(MAX_ECHO_DELAY_BLOCKS, 2.0).is_ok());
        assert_eq!(
            EchoConfig::new(MAX_ECHO_DELAY_BLOCKS + 1, 2.0),
            Err(ConfigError::EchoDelayTooLong {
                blocks: MAX_ECHO_DELAY_BLOCKS + 1,
                max: MAX_ECHO_DELAY_BLOCKS,
            })
        );
    }

    #[test]
    fn test_bad_feedback_divisors_rejected() {
        for divisor in [0.0, -2.0, 0.5, 16.5, 40.0, f32::INFINITY, f32::NEG_INFINITY] {
            assert_eq!(
                EchoConfig::new(4, divisor),
                Err(ConfigError::InvalidFeedbackDivisor(divisor)),
                "divisor {divisor} should be rejected"
            );
        }
        assert!(matches!(
            EchoConfig::new(4, f32::NAN),
            Err(ConfigError::InvalidFeedbackDivisor(d)) if d.is_nan()
        ));
        assert!(EchoConfig::new(4, 1.0).is_ok());
        assert!(EchoConfig::new(4, MAX_FEEDBACK_DIVISOR).is_ok());
    }

    #[test]
    fn test_history_len() {
        let config = EchoConfig::new(3, 2.0).unwrap();
        assert_eq!(config.history_len(256), Ok(768));
        assert_eq!(config.history_len(0), Err(ConfigError::ZeroBlockLength));

        let config = EchoConfig::new(2, 2.0).unwrap();
        assert_eq!(
            config.history_len(usize::MAX),
            Err(ConfigError::CapacityOverflow {
                blocks: 2,
                block_len: usize::MAX,
            })
        );
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            ConfigError::ZeroEchoDelay.to_string(),
            "echo delay must be at least one block"
        );
        assert_eq!(
            ConfigError::InvalidFeedbackDivisor(0.0).to_string(),
            "feedback divisor must be between 1 and 16, got 0"
        );
    }
}
