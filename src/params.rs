//! # Plugin Parameters
//!
//! The echo exposes its two configuration values as host parameters so
//! they are saved with the session and shown in the host's generic UI.
//!
//! ## Read once, not per sample
//!
//! Changing the echo delay changes how much history the delay line has to
//! hold, which means reallocating it. That can't happen on the audio
//! thread, so both parameters are read once in `initialize()` and the
//! values are fixed for the rest of the run. They are marked
//! non-automatable so hosts don't offer automation lanes that would
//! silently do nothing.
//!
//! The string IDs are what hosts store in presets. Once published, never
//! change them.

use nih_plug::prelude::*;

use crate::config::{
    self, EchoConfig, MAX_ECHO_DELAY_BLOCKS, MAX_FEEDBACK_DIVISOR, MIN_FEEDBACK_DIVISOR,
};

/// Host-visible configuration of the echo.
#[derive(Params)]
pub struct EchoParams {
    /// **Echo Delay**: how many audio blocks separate the live signal from
    /// its first echo. The resulting time depends on the host's block size:
    /// 15 blocks of 256 samples at 48 kHz is 80ms.
    #[id = "delay"]
    pub echo_delay_blocks: IntParam,

    /// **Feedback Divisor**: every trip through the feedback loop divides
    /// the echo by this amount. 2 halves each repeat; 1 repeats forever.
    #[id = "fbdiv"]
    pub feedback_divisor: FloatParam,
}

impl EchoParams {
    /// Parameters whose defaults are `defaults`.
    pub fn new(defaults: EchoConfig) -> Self {
        Self {
            echo_delay_blocks: IntParam::new(
                "Echo Delay",
                i32::try_from(defaults.echo_delay_blocks()).unwrap_or(1),
                IntRange::Linear {
                    min: 1,
                    max: MAX_ECHO_DELAY_BLOCKS as i32,
                },
            )
            .with_unit(" blocks")
            .non_automatable(),

            feedback_divisor: FloatParam::new(
                "Feedback Divisor",
                defaults.feedback_divisor(),
                FloatRange::Linear {
                    min: MIN_FEEDBACK_DIVISOR,
                    max: MAX_FEEDBACK_DIVISOR,
                },
            )
            .with_step_size(0.01)
            .non_automatable(),
        }
    }

    /// Validate the current values.
    ///
    /// The parameter ranges already keep the values valid, but a restored
    /// preset goes through the same check.
    pub fn snapshot(&self) -> config::Result<EchoConfig> {
        let echo_delay_blocks = usize::try_from(self.echo_delay_blocks.value()).unwrap_or(0);
        EchoConfig::new(echo_delay_blocks, self.feedback_divisor.value())
    }
}

impl Default for EchoParams {
    fn default() -> Self {
        Self::new(config::startup_defaults())
    }
}
