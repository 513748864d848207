//! # Simple Echo: A Block-Based Echo/Feedback Effect
//!
//! Mixes the live input with a copy of itself from a whole number of audio
//! blocks ago, and feeds an attenuated blend of both back into the delay
//! line so the echo repeats and fades.
//!
//! Built with [nih-plug](https://github.com/robbert-vdh/nih-plug). The same
//! code runs as a standalone JACK client (`src/main.rs`) and as an AUv2,
//! VST3 or CLAP plugin.
//!
//! ## Signal Flow
//!
//! ```text
//! Input ──┬──────────────────────────────►(+)──────┬──────────► Output
//!         │                                ▲       │
//!         │                           echo │       ÷ feedback_divisor
//!         │                                │       │
//!         │      ┌──────────────────────────────┐  │
//!         └─►(+)─► Delay Line                   │  │
//!             ▲  │ (echo_delay_blocks × block)  │  │
//!             │  └──────────────────────────────┘  │
//!             └────────────────────────────────────┘
//! ```

pub mod config;
pub mod dsp;
pub mod params;

use std::num::NonZeroU32;
use std::sync::Arc;

use dsp::{fault::FaultMonitor, processor::CycleProcessor};
use nih_plug::prelude::*;
use params::EchoParams;

/// Work the audio thread hands to the background thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoTask {
    /// Drain the fault monitor and log what the audio thread ran into.
    ReportFaults,
}

/// The plugin: parameters plus the per-run processor.
///
/// The processor is `None` until the host calls `initialize()` with the
/// negotiated block size; it is rebuilt on every re-initialisation.
pub struct SimpleEcho {
    params: Arc<EchoParams>,

    processor: Option<CycleProcessor>,

    /// Shared with the background task executor, which outlives any single
    /// processor.
    faults: Arc<FaultMonitor>,

    /// Result of [`CycleProcessor::tail_samples`], cached at init so
    /// `process()` doesn't do float math just to report it. `None` means
    /// the echo never decays.
    tail_samples: Option<u32>,
}

impl Default for SimpleEcho {
    fn default() -> Self {
        Self {
            params: Arc::new(EchoParams::default()),
            processor: None,
            faults: Arc::new(FaultMonitor::new()),
            tail_samples: None,
        }
    }
}

impl SimpleEcho {
    /// Validate the current parameters and size a processor for blocks of
    /// up to `max_block_len` samples.
    fn build_processor(&self, max_block_len: usize) -> config::Result<CycleProcessor> {
        let config = self.params.snapshot()?;
        CycleProcessor::new(config, max_block_len, self.faults.clone())
    }
}

impl Plugin for SimpleEcho {
    const NAME: &'static str = "Simple Echo";
    const VENDOR: &'static str = "Loveless Audio";
    const URL: &'static str = "";
    const EMAIL: &'static str = "steve.loveless@gmail.com";
    const VERSION: &'static str = env!("CARGO_PKG_VERSION");

    // One mono input, one mono output. The standalone registers these as
    // its two JACK ports.
    const AUDIO_IO_LAYOUTS: &'static [AudioIOLayout] = &[AudioIOLayout {
        main_input_channels: NonZeroU32::new(1),
        main_output_channels: NonZeroU32::new(1),
        aux_input_ports: &[],
        aux_output_ports: &[],
        names: PortNames::const_default(),
    }];

    const MIDI_INPUT: MidiConfig = MidiConfig::None;

    // Splitting blocks at automation points would change the block length
    // mid-cycle, and the echo delay is measured in blocks. There is nothing
    // to automate anyway.
    const SAMPLE_ACCURATE_AUTOMATION: bool = false;

    type SysExMessage = ();
    type BackgroundTask = EchoTask;

    fn params(&self) -> Arc<dyn Params> {
        self.params.clone()
    }

    fn task_executor(&mut self) -> TaskExecutor<Self> {
        let faults = self.faults.clone();
        Box::new(move |task| match task {
            EchoTask::ReportFaults => {
                if let Some(summary) = faults.drain() {
                    nih_error!(
                        "passed {} block(s) through without echo; last offending block had {} \
                         samples",
                        summary.count,
                        summary.last_len
                    );
                }
            }
        })
    }

    /// Validate the parameters and size the delay line for the negotiated
    /// block size. This is the only place memory is allocated.
    ///
    /// Returning `false` tells the host not to activate the plugin; the
    /// standalone exits with an error.
    fn initialize(
        &mut self,
        _audio_io_layout: &AudioIOLayout,
        buffer_config: &BufferConfig,
        _context: &mut impl InitContext<Self>,
    ) -> bool {
        let max_block_len = buffer_config.max_buffer_size as usize;
        let processor = match self.build_processor(max_block_len) {
            Ok(processor) => processor,
            Err(err) => {
                nih_error!("cannot start the echo: {}", err);
                return false;
            }
        };
        let config = *processor.config();

        let echo_ms = (config.echo_delay_blocks() * max_block_len) as f32 * 1000.0
            / buffer_config.sample_rate;
        nih_log!(
            "engine sample rate: {} Hz, block size: {} samples",
            buffer_config.sample_rate,
            max_block_len
        );
        nih_log!(
            "echo delay: {} blocks ({:.1} ms), feedback divisor: {}",
            config.echo_delay_blocks(),
            echo_ms,
            config.feedback_divisor()
        );

        self.tail_samples = processor.tail_samples(max_block_len);
        self.processor = Some(processor);

        true
    }

    /// Called when playback stops or the plugin is bypassed. Clears the
    /// history so old echoes don't bleed into the next run.
    fn reset(&mut self) {
        if let Some(processor) = &mut self.processor {
            processor.reset();
        }
    }

    /// One audio cycle. nih-plug hands us the input in `buffer` and expects
    /// the output in the same place.
    fn process(
        &mut self,
        buffer: &mut Buffer,
        _aux: &mut AuxiliaryBuffers,
        context: &mut impl ProcessContext<Self>,
    ) -> ProcessStatus {
        let Some(processor) = self.processor.as_mut() else {
            return ProcessStatus::Normal;
        };
        let Some(block) = buffer.as_slice().first_mut() else {
            return ProcessStatus::Normal;
        };

        // On a fault the block is left as it came in, so the input passes
        // through. The log line is written on the background thread.
        if processor.process_in_place(block).is_err() && self.faults.claim_report() {
            context.execute_background(EchoTask::ReportFaults);
        }

        match self.tail_samples {
            Some(samples) => ProcessStatus::Tail(samples),
            None => ProcessStatus::KeepAlive,
        }
    }
}

impl ClapPlugin for SimpleEcho {
    const CLAP_ID: &'static str = "com.loveless-audio.simple-echo";
    const CLAP_DESCRIPTION: Option<&'static str> =
        Some("A block-based echo with divided feedback");
    const CLAP_MANUAL_URL: Option<&'static str> = None;
    const CLAP_SUPPORT_URL: Option<&'static str> = None;
    const CLAP_FEATURES: &'static [ClapFeature] = &[
        ClapFeature::AudioEffect,
        ClapFeature::Mono,
        ClapFeature::Delay,
    ];
}

impl Vst3Plugin for SimpleEcho {
    const VST3_CLASS_ID: [u8; 16] = *b"SimpleEchoFx_v01";
    const VST3_SUBCATEGORIES: &'static [Vst3SubCategory] = &[
        Vst3SubCategory::Fx,
        Vst3SubCategory::Delay,
        Vst3SubCategory::Mono,
    ];
}

nih_export_clap!(SimpleEcho);
nih_export_vst3!(SimpleEcho);

// AUv2 entry point for hosts that only load Audio Units.
clap_wrapper::export_auv2!();

#[cfg(test)]
mod tests {
    use super::*;
    use config::{ConfigError, EchoConfig};

    #[test]
    fn test_builds_processor_from_params() {
        let plugin = SimpleEcho::default();
        let processor = plugin.build_processor(256).unwrap();

        assert_eq!(*processor.config(), EchoConfig::default());
        assert_eq!(processor.max_block_len(), 256);
        assert_eq!(processor.delay_line().capacity(), 15 * 256);
    }

    /// A configuration that can't be sized is an error, which makes
    /// `initialize()` refuse activation.
    #[test]
    fn test_zero_block_len_refused() {
        let plugin = SimpleEcho::default();
        assert_eq!(
            plugin.build_processor(0).err(),
            Some(ConfigError::ZeroBlockLength)
        );
    }

    #[test]
    fn test_processor_shares_fault_monitor() {
        let plugin = SimpleEcho::default();
        let mut processor = plugin.build_processor(4).unwrap();

        assert!(processor.process_in_place(&mut [0.0; 8]).is_err());
        assert!(plugin.faults.is_tripped());
    }
}
