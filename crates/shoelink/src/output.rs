use std::collections::BTreeMap;
use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use shoelink_frame::{ChannelName, Message};
use shoelink_peer::{ChannelOutcome, ChannelStatus, GroupReport};

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct MessageOutput<'a> {
    channel: &'a str,
    text: &'a str,
    timestamp: String,
}

pub fn print_message(message: &Message, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = MessageOutput {
                channel: message.channel().as_str(),
                text: message.text(),
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CHANNEL", "MESSAGE"])
                .add_row(vec![message.channel().to_string(), message.text().to_string()]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("[{}] {}", message.channel(), message.text());
        }
        OutputFormat::Raw => {
            println!("{}", message.text());
        }
    }
}

#[derive(Serialize)]
struct ReportOutput<'a> {
    operation: &'a str,
    ok: bool,
    channels: Vec<ChannelOutcome>,
}

pub fn print_report(operation: &str, report: &GroupReport, format: OutputFormat) {
    let rows = report.summary();
    match format {
        OutputFormat::Json => {
            let out = ReportOutput {
                operation,
                ok: report.all_succeeded(),
                channels: rows,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CHANNEL", "RESULT", "ERROR"]);
            for row in rows {
                table.add_row(vec![
                    row.channel.to_string(),
                    outcome_label(&row).to_string(),
                    row.error.unwrap_or_default(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for row in rows {
                match &row.error {
                    Some(error) => println!(
                        "{operation} {}: {} ({error})",
                        row.channel,
                        outcome_label(&row)
                    ),
                    None => println!("{operation} {}: ok", row.channel),
                }
            }
        }
        OutputFormat::Raw => {
            for row in rows {
                println!("{} {}", row.channel, outcome_label(&row));
            }
        }
    }
}

fn outcome_label(row: &ChannelOutcome) -> &'static str {
    match row.kind {
        None => "ok",
        Some(kind) => kind.as_str(),
    }
}

pub fn print_status(status: &BTreeMap<ChannelName, ChannelStatus>, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out: Vec<&ChannelStatus> = status.values().collect();
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "[]".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CHANNEL", "TRANSPORT", "STATE", "LINKED", "LAST ERROR"]);
            for entry in status.values() {
                table.add_row(vec![
                    entry.channel.to_string(),
                    entry.transport.clone(),
                    entry.state.to_string(),
                    entry.linked.to_string(),
                    entry
                        .last_error
                        .as_ref()
                        .map(|e| format!("{}: {}", e.kind, e.message))
                        .unwrap_or_default(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            for entry in status.values() {
                match &entry.last_error {
                    Some(error) => println!(
                        "{} {} {} ({}: {})",
                        entry.channel, entry.transport, entry.state, error.kind, error.message
                    ),
                    None => println!("{} {} {}", entry.channel, entry.transport, entry.state),
                }
            }
        }
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
