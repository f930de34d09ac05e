use std::time::Duration;

use clap::{Args, Subcommand};
use serialframe_frame::DelimiterPolicy;
use serialframe_transport::{LineSettings, DEFAULT_BAUD_RATE};

use crate::exit::{CliError, CliResult, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod encode;
pub mod monitor;
pub mod ports;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List serial ports.
    Ports,
    /// Encode a text command and print the resulting bytes.
    Encode(EncodeArgs),
    /// Open a port, send one command, close.
    Send(SendArgs),
    /// Open a port and print framed messages until interrupted.
    Monitor(MonitorArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Ports => ports::run(format),
        Command::Encode(args) => encode::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Monitor(args) => monitor::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Electrical parameters shared by commands that open a port.
#[derive(Args, Debug, Clone)]
pub struct LineArgs {
    /// Baud rate.
    #[arg(long, env = "SERIALFRAME_BAUD", default_value_t = DEFAULT_BAUD_RATE)]
    pub baud: u32,
    /// Parity: N, O or E.
    #[arg(long, default_value = "N")]
    pub parity: String,
    /// Stop bits: 1 or 2.
    #[arg(long, default_value_t = 1)]
    pub stop_bits: u8,
    /// Data bits: 5 to 8.
    #[arg(long, default_value_t = 8)]
    pub data_bits: u8,
}

impl LineArgs {
    /// Out-of-range values fall back to safe defaults with a warning.
    pub fn settings(&self) -> LineSettings {
        LineSettings::from_raw(self.baud, &self.parity, self.stop_bits, self.data_bits)
    }
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Command text, e.g. `0x02 "RD" 0x03`.
    pub text: String,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Serial port, e.g. /dev/ttyUSB0 or COM3.
    pub port: String,
    /// Command text, e.g. `"AT" 0x0D 0x0A`.
    pub text: String,
    #[command(flatten)]
    pub line: LineArgs,
    /// Print replies received within this window after sending (e.g. 500ms, 2s).
    #[arg(long, value_name = "DURATION")]
    pub wait: Option<String>,
    /// Split replies after this byte instead of by time.
    #[arg(long, value_parser = parse_code)]
    pub code: Option<u16>,
}

#[derive(Args, Debug)]
pub struct MonitorArgs {
    /// Serial port, e.g. /dev/ttyUSB0 or COM3.
    pub port: String,
    #[command(flatten)]
    pub line: LineArgs,
    /// Emit whatever arrived in each window of this length (e.g. 150ms).
    #[arg(long, value_name = "DURATION", conflicts_with = "code")]
    pub interval: Option<String>,
    /// Split after every occurrence of this byte (e.g. 10 or 0x0A).
    #[arg(long, value_parser = parse_code)]
    pub code: Option<u16>,
    /// Exit after printing N messages.
    #[arg(long)]
    pub count: Option<usize>,
    /// How often to collect received messages.
    #[arg(long, value_name = "DURATION", default_value = "50ms")]
    pub poll: String,
}

impl MonitorArgs {
    pub fn policy(&self) -> CliResult<DelimiterPolicy> {
        delimiter_policy(self.interval.as_deref(), self.code)
    }
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn delimiter_policy(interval: Option<&str>, code: Option<u16>) -> CliResult<DelimiterPolicy> {
    match (interval, code) {
        (_, Some(code)) => Ok(DelimiterPolicy::code(code)),
        (Some(interval), None) => parse_duration(interval).map(DelimiterPolicy::timed),
        (None, None) => Ok(DelimiterPolicy::default()),
    }
}

/// Delimiter byte as decimal or `0x` hex, 0 to 255.
pub fn parse_code(input: &str) -> Result<u16, String> {
    let input = input.trim();
    let parsed = match input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => input.parse::<u8>(),
    };
    parsed
        .map(u16::from)
        .map_err(|_| format!("invalid delimiter code (expected 0-255 or 0x00-0xFF): {input}"))
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

pub fn runtime() -> CliResult<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::new(INTERNAL, format!("failed to start runtime: {err}")))
}
