use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use serialframe_frame::Message;
use serialframe_session::SendOutcome;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct MessageOutput<'a> {
    port: &'a str,
    append: bool,
    size: usize,
    data: Vec<u16>,
    text: String,
    timestamp: String,
}

pub fn print_message(msg: &Message, port: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&MessageOutput {
            port,
            append: msg.append,
            size: msg.len(),
            data: msg.widened(),
            text: escaped(&msg.data),
            timestamp: now_unix_millis(),
        }),
        OutputFormat::Table => {
            let mut table = table(vec!["APPEND", "SIZE", "HEX", "TEXT"]);
            table.add_row(vec![
                msg.append.to_string(),
                msg.len().to_string(),
                hex(&msg.data),
                escaped(&msg.data),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let marker = if msg.append { '+' } else { '>' };
            println!("{marker} {:>4}  {}", msg.len(), escaped(&msg.data));
        }
        OutputFormat::Raw => print_raw(&msg.data),
    }
}

#[derive(Serialize)]
struct EncodedOutput<'a> {
    input: &'a str,
    bytes: &'a [u8],
    hex: String,
}

pub fn print_encoded(input: &str, bytes: &[u8], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&EncodedOutput {
            input,
            bytes,
            hex: hex(bytes),
        }),
        OutputFormat::Table => {
            let mut table = table(vec!["INPUT", "SIZE", "HEX"]);
            table.add_row(vec![input.to_string(), bytes.len().to_string(), hex(bytes)]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{}", hex(bytes)),
        OutputFormat::Raw => print_raw(bytes),
    }
}

#[derive(Serialize)]
struct SendOutput<'a> {
    port: &'a str,
    #[serde(flatten)]
    outcome: &'a SendOutcome,
    hex: String,
}

pub fn print_send_outcome(outcome: &SendOutcome, port: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&SendOutput {
            port,
            outcome,
            hex: hex(&outcome.bytes_sent),
        }),
        OutputFormat::Table => {
            let mut table = table(vec!["PORT", "SENT", "HEX", "ERROR"]);
            table.add_row(vec![
                port.to_string(),
                outcome.bytes_sent.len().to_string(),
                hex(&outcome.bytes_sent),
                outcome.error.clone().unwrap_or_default(),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => match &outcome.error {
            None => println!("sent {} bytes to {port}", outcome.bytes_sent.len()),
            Some(err) => println!("send to {port} failed: {err}"),
        },
        OutputFormat::Raw => {}
    }
}

#[derive(Serialize)]
struct PortsOutput<'a> {
    ports: &'a [String],
}

pub fn print_ports(ports: &[String], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&PortsOutput { ports }),
        OutputFormat::Table => {
            let mut table = table(vec!["PORT"]);
            for port in ports {
                table.add_row(vec![port.clone()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            for port in ports {
                println!("{port}");
            }
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

/// Space-separated uppercase hex pairs.
pub fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn escaped(bytes: &[u8]) -> String {
    bytes.escape_ascii().to_string()
}

fn now_unix_millis() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
