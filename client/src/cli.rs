use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(about, version, author)]
pub struct Cli {
    /// Minimum log level to print out
    #[clap(long, value_enum, default_value = "info")]
    pub log_level: LevelFilter,

    /// Location of the settings file, defaults to the user's config directory
    #[clap(long)]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: SubCommands,
}

#[derive(Subcommand, Debug)]
pub enum SubCommands {
    /// Capture power traces of the target encrypting random plaintexts
    Capture {
        #[clap(flatten)]
        capture: CaptureArgs,

        /// Capture .json.gz output file, the capture is only summarised if omitted
        #[clap(long, short)]
        output: Option<PathBuf>,
    },

    /// Show the capture board's firmware, FPGA and clock state
    Info,

    /// Load a bitstream into the FPGA, even if it's already configured
    ProgramFpga {
        /// Path to the FPGA bitstream, defaults to the bundled one
        #[clap(long)]
        bitstream: Option<PathBuf>,
    },

    /// Summarise a saved capture file
    Show {
        /// The .json.gz capture to read
        file: PathBuf,

        /// Print every trace, not just the totals
        #[clap(long)]
        traces: bool,
    },
}

#[derive(Args, Debug, Default)]
pub struct CaptureArgs {
    /// Number of samples per trace
    #[clap(long)]
    pub samples: Option<u32>,

    /// Number of traces to capture
    #[clap(long)]
    pub traces: Option<usize>,

    /// Offset of capture after trigger, in ADC clock cycles
    #[clap(long)]
    pub offset: Option<u32>,

    /// Encryption key in hex
    #[clap(long)]
    pub key: Option<String>,

    /// Path to the FPGA bitstream, used if the FPGA isn't configured yet
    #[clap(long)]
    pub bitstream: Option<PathBuf>,

    /// How long to wait for the target to trigger, in milliseconds
    #[clap(long)]
    pub trigger_timeout_ms: Option<u64>,

    /// How long to wait for the target to respond, in milliseconds
    #[clap(long)]
    pub serial_timeout_ms: Option<u64>,
}

#[repr(usize)]
#[derive(ValueEnum, Copy, Clone, Eq, PartialEq, Debug)]
pub enum LevelFilter {
    /// A level lower than all log levels.
    Off,
    /// Corresponds to the `Error` log level.
    Error,
    /// Corresponds to the `Warn` log level.
    Warn,
    /// Corresponds to the `Info` log level.
    Info,
    /// Corresponds to the `Debug` log level.
    Debug,
    /// Corresponds to the `Trace` log level.
    Trace,
}
