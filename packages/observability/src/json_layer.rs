//! JSONL event layer.
//!
//! Each event becomes one line: `timestamp`, `level`, `service`, `target`,
//! `message` and, when present, a flat `fields` object. Fields that can carry
//! key material or user content are redacted before serialization.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::io::Write;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// Field names whose values never reach the log file.
const REDACTED_FIELDS: &[&str] = &["key", "secret", "password", "plaintext", "content"];

const REDACTED: &str = "[redacted]";

/// One serialized log line.
#[derive(Debug, Serialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub level: &'static str,
    pub service: String,
    pub target: String,
    pub message: String,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub fields: Map<String, Value>,
}

#[derive(Default)]
struct EventFields {
    message: String,
    fields: Map<String, Value>,
}

impl EventFields {
    fn record(&mut self, field: &Field, value: Value) {
        match field.name() {
            "message" => {
                self.message = match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                }
            }
            name if REDACTED_FIELDS.contains(&name) => {
                self.fields.insert(name.to_string(), REDACTED.into());
            }
            name => {
                self.fields.insert(name.to_string(), value);
            }
        }
    }
}

impl Visit for EventFields {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.record(field, format!("{value:?}").into());
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.record(field, value.into());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.record(field, value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.record(field, value.into());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.record(field, value.into());
    }
}

/// Writes every event it sees as a JSON line to `make_writer`.
pub struct JsonLayer<W> {
    service_name: String,
    make_writer: W,
}

impl<W> JsonLayer<W> {
    pub fn new(service_name: String, make_writer: W) -> Self {
        Self {
            service_name,
            make_writer,
        }
    }
}

impl<S, W> Layer<S> for JsonLayer<W>
where
    S: Subscriber,
    W: for<'writer> MakeWriter<'writer> + 'static,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut recorded = EventFields::default();
        event.record(&mut recorded);

        let metadata = event.metadata();
        let entry = LogEntry {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            level: metadata.level().as_str(),
            service: self.service_name.clone(),
            target: metadata.target().to_string(),
            message: recorded.message,
            fields: recorded.fields,
        };

        if let Ok(line) = serde_json::to_string(&entry) {
            let _ = writeln!(self.make_writer.make_writer(), "{line}");
        }
    }
}
