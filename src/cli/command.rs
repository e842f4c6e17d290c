use std::path::PathBuf;

use clap::{Args, Parser as ClapParser, Subcommand, ValueEnum};
use flvaac::structs::asc::RuntimeClass;
use serde::{Deserialize, Serialize};

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("VERGEN_GIT_DESCRIBE"),
    ", flvaac ",
    env!("FLVAAC_VERSION"),
    ", built ",
    env!("BUILD_TIMESTAMP"),
    ")"
);

#[derive(Debug, ClapParser)]
#[command(
    name         = env!("CARGO_PKG_NAME"),
    version      = env!("CARGO_PKG_VERSION"),
    long_version = LONG_VERSION,
    about        = "Demux, decode and play audio-only AAC streams in FLV containers",
    long_about   = None,
)]
pub struct Cli {
    /// Set the log level
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    pub loglevel: LogLevel,

    /// Treat warnings as fatal errors (fail on first warning).
    #[arg(long, global = true)]
    pub strict: bool,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,

    /// Show progress bars during operations.
    #[arg(long, global = true)]
    pub progress: bool,

    /// Choose an operation to perform.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Decode the stream and play it into a WAV file.
    Play(PlayArgs),

    /// Rewrap the AAC frames as an ADTS elementary stream.
    Extract(ExtractArgs),

    /// Print stream information
    Info(InfoArgs),
}

#[derive(Debug, Args)]
pub struct PlayArgs {
    /// Input FLV stream (use "-" for stdin).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// WAV file receiving the played audio. Audio is discarded when omitted.
    #[arg(long, short, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// YAML player configuration. Flags given on the command line win.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Decode profile announced to the decoder.
    #[arg(long, value_enum)]
    pub runtime_class: Option<DecodeProfile>,

    /// Data-available deliveries per decode batch.
    #[arg(long, value_name = "N")]
    pub throttle: Option<usize>,

    /// Output volume in [0, 1].
    #[arg(long, value_name = "LEVEL")]
    pub volume: Option<f32>,

    /// Bytes read from the input per chunk.
    #[arg(long, value_name = "BYTES")]
    pub chunk_size: Option<usize>,

    /// Milliseconds added to every timestamp.
    #[arg(long, value_name = "MS")]
    pub timestamp_base: Option<i64>,

    /// Pace playback in real time instead of writing as fast as possible.
    #[arg(long)]
    pub realtime: bool,

    /// Log every chunk as it is parsed.
    #[arg(long)]
    pub debug: bool,
}

#[derive(Debug, Args)]
pub struct ExtractArgs {
    /// Input FLV stream (use "-" for stdin).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Output ADTS file (use "-" for stdout).
    #[arg(long, short, value_name = "PATH")]
    pub output: PathBuf,

    /// Decode profile written into the ADTS headers.
    #[arg(long, value_enum, default_value_t = DecodeProfile::LcOnly)]
    pub runtime_class: DecodeProfile,
}

#[derive(Debug, Args)]
pub struct InfoArgs {
    /// Input FLV stream.
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Report format.
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    /// Disable logging output.
    Off,
    /// No output except errors.
    Error,
    /// Show warnings and errors.
    Warn,
    /// Show info, warnings and errors (default).
    Info,
    /// Show debug, info, warnings and errors.
    Debug,
    /// Show all log messages including trace.
    Trace,
}

impl LogLevel {
    /// Convert LogLevel to log::LevelFilter
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// Colorized human-readable text.
    Plain,
    /// Structured JSON per log record.
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum ReportFormat {
    /// Aligned human-readable text.
    Text,
    /// YAML document.
    Yaml,
}

/// Which AAC profile the rebuilt AudioSpecificConfig announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecodeProfile {
    /// HE-AAC below 24 kHz, LC otherwise.
    LowRateSbr,
    /// Always LC.
    LcOnly,
    /// HE-AAC except for mono streams at 24 kHz and above.
    PreferHe,
}

impl From<DecodeProfile> for RuntimeClass {
    fn from(profile: DecodeProfile) -> Self {
        match profile {
            DecodeProfile::LowRateSbr => RuntimeClass::LowRateSbr,
            DecodeProfile::LcOnly => RuntimeClass::LcOnly,
            DecodeProfile::PreferHe => RuntimeClass::PreferHe,
        }
    }
}
