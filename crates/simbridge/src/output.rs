use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use simbridge_provider::{BlackboardState, DataPoint, ShmDataPoint};

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
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
    kind: &'static str,
    sequence: usize,
    size: usize,
    message: &'a str,
    timestamp: String,
}

pub fn print_message(message: &str, sequence: usize, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = MessageOutput {
                kind: "message-received",
                sequence,
                size: message.len(),
                message,
                timestamp: now_unix_seconds(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = table_with_header(vec!["SEQ", "SIZE", "MESSAGE"]);
            table.add_row(vec![
                sequence.to_string(),
                message.len().to_string(),
                message.to_string(),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("#{sequence} size={} message={message}", message.len());
        }
    }
}

#[derive(Serialize)]
struct DataPointOutput<'a> {
    kind: &'static str,
    sequence: usize,
    abs_time: Option<f64>,
    #[serde(flatten)]
    point: &'a DataPoint,
    timestamp: String,
}

pub fn print_data_point(point: &DataPoint, sequence: usize, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = DataPointOutput {
                kind: "data-point",
                sequence,
                abs_time: point.abs_time(),
                point,
                timestamp: now_unix_seconds(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = table_with_header(vec!["KEY", "VALUE"]);
            for (key, value) in point.values() {
                table.add_row(vec![key.clone(), value.clone()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("{point}");
        }
    }
}

#[derive(Serialize)]
#[serde(untagged)]
pub enum BlackboardView {
    Full(BlackboardState),
    Sensors(ShmDataPoint),
}

#[derive(Serialize)]
struct BlackboardOutput<'a> {
    kind: &'static str,
    name: &'a str,
    state: &'a BlackboardView,
    timestamp: String,
}

pub fn print_blackboard(name: &str, view: &BlackboardView, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = BlackboardOutput {
                kind: "blackboard-snapshot",
                name,
                state: view,
                timestamp: now_unix_seconds(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = table_with_header(vec!["FIELD", "VALUE"]);
            for (field, value) in flatten_fields(view) {
                table.add_row(vec![field, value]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("blackboard {name}");
            for (field, value) in flatten_fields(view) {
                println!("  {field} = {value}");
            }
        }
    }
}

/// Field name and rendered value pairs, sorted by field name.
fn flatten_fields(view: &BlackboardView) -> Vec<(String, String)> {
    let Ok(serde_json::Value::Object(map)) = serde_json::to_value(view) else {
        return Vec::new();
    };
    map.into_iter()
        .map(|(field, value)| (field, value.to_string()))
        .collect()
}

fn table_with_header(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
