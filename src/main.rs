//! Standalone launcher.
//!
//! Runs Simple Echo as its own JACK client instead of inside a plugin host.
//! Echo settings are taken from our own flags; everything after `--` goes to
//! nih-plug's standalone wrapper, which opens the audio backend and
//! registers the input and output ports.
//!
//! With nothing after `--` the launcher asks for JACK explicitly and wires
//! the input to the first physical capture port and the output to the first
//! physical playback port. If the JACK server can't be reached the wrapper
//! fails and the process exits non-zero. Pass host arguments to override
//! this, e.g. to pick other ports:
//!
//!   simple-echo --echo-delay-blocks 15 --feedback-divisor 2 -- \
//!       --backend jack --connect-jack-inputs system:capture_2
//!
//! Invalid echo settings are rejected here, before the backend is touched.

use std::process::ExitCode;

use clap::{error::ErrorKind, CommandFactory, Parser};
use nih_plug::prelude::*;
use simple_echo::config::{self, EchoConfig};
use simple_echo::SimpleEcho;

/// Host arguments used when none are given after `--`.
const DEFAULT_HOST_ARGS: &[&str] = &[
    "--backend",
    "jack",
    "--connect-jack-inputs",
    "all",
    "--connect-jack-outputs",
    "all",
];

#[derive(Debug, Parser)]
#[command(name = "simple-echo", version, about = "Block-based echo/feedback effect")]
struct Cli {
    /// How many audio blocks back the echo is read from (1 to 256).
    #[arg(long, default_value_t = config::DEFAULT_ECHO_DELAY_BLOCKS)]
    echo_delay_blocks: usize,

    /// Each trip through the feedback loop divides the echo by this (1 to 16).
    #[arg(long, default_value_t = config::DEFAULT_FEEDBACK_DIVISOR)]
    feedback_divisor: f32,

    /// Arguments for the audio backend, passed after `--`.
    #[arg(last = true)]
    host_args: Vec<String>,
}

impl Cli {
    /// Validate the echo flags, reporting failures the way clap reports
    /// its own parse errors.
    fn echo_config(&self) -> Result<EchoConfig, clap::Error> {
        EchoConfig::new(self.echo_delay_blocks, self.feedback_divisor)
            .map_err(|err| Self::command().error(ErrorKind::ValueValidation, err))
    }

    /// The full argument list for the standalone wrapper, starting with the
    /// program name.
    fn host_args(self, program: String) -> Vec<String> {
        let mut args = vec![program];
        if self.host_args.is_empty() {
            args.extend(DEFAULT_HOST_ARGS.iter().map(|arg| arg.to_string()));
        } else {
            args.extend(self.host_args);
        }
        args
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let echo = match cli.echo_config() {
        Ok(echo) => echo,
        Err(err) => err.exit(),
    };

    // Nothing has constructed the plugin yet, so this is the first and only
    // call.
    let seeded = config::set_startup_defaults(echo).is_ok();
    nih_debug_assert!(seeded, "startup configuration was already set");

    let program = std::env::args()
        .next()
        .unwrap_or_else(|| String::from("simple-echo"));

    if nih_export_standalone_with_args::<SimpleEcho, _>(cli.host_args(program)) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
