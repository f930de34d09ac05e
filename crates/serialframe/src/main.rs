mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(
    name = "serialframe",
    version,
    about = "Framed serial port monitor and command sender"
)]
struct Cli {
    /// Output format. Default: pretty on a terminal, json otherwise.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "warn", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    match cmd::run(cli.command, format) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_monitor_with_code() {
        let cli = Cli::try_parse_from([
            "serialframe",
            "monitor",
            "/dev/ttyUSB0",
            "--baud",
            "115200",
            "--code",
            "0x0A",
            "--count",
            "3",
        ])
        .expect("monitor args should parse");

        let Command::Monitor(args) = cli.command else {
            panic!("expected monitor");
        };
        assert_eq!(args.line.baud, 115_200);
        assert_eq!(args.code, Some(10));
        assert_eq!(args.count, Some(3));
    }

    #[test]
    fn rejects_interval_with_code() {
        let err = Cli::try_parse_from([
            "serialframe",
            "monitor",
            "/dev/ttyUSB0",
            "--interval",
            "100ms",
            "--code",
            "13",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn parses_send_with_line_flags() {
        let cli = Cli::try_parse_from([
            "serialframe",
            "--format",
            "json",
            "send",
            "COM3",
            "\"AT\" 13 10",
            "--parity",
            "E",
            "--data-bits",
            "7",
        ])
        .expect("send args should parse");

        assert_eq!(cli.format, Some(OutputFormat::Json));
        let Command::Send(args) = cli.command else {
            panic!("expected send");
        };
        assert_eq!(args.text, "\"AT\" 13 10");
        let settings = args.line.settings();
        assert_eq!(settings.parity, serialframe_transport::Parity::Even);
        assert_eq!(settings.data_bits, serialframe_transport::DataBits::Seven);
    }

    #[test]
    fn verifies_command_tree() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
