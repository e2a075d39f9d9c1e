//! `tracing` integration.
//!
//! [`BufferingLayer`] turns every tracing event into a [`LogEntry`] and
//! appends it to a buffering handler. Appending never blocks, so the layer
//! adds no sink latency to the instrumented call site.

use std::collections::HashMap;
use std::fmt::Debug;

use serde_json::Value;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use crate::entry::{LogEntry, LogLevel};
use crate::handler::EntryProducer;

/// Events from inside this library are not captured, otherwise every flush
/// would log itself into the next batch.
const INTERNAL_TARGET_PREFIX: &str = concat!(env!("CARGO_CRATE_NAME"), "::");

/// A `tracing` layer that feeds events into a buffering handler.
#[derive(Clone)]
pub struct BufferingLayer {
    producer: EntryProducer,
}

impl BufferingLayer {
    pub fn new(producer: EntryProducer) -> Self {
        Self { producer }
    }
}

impl<S> Layer<S> for BufferingLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if metadata.target().starts_with(INTERNAL_TARGET_PREFIX) {
            return;
        }

        let mut visitor = EntryVisitor::default();
        event.record(&mut visitor);

        let mut entry = LogEntry::new(
            metadata.target(),
            LogLevel::from(metadata.level()),
            visitor.message.unwrap_or_default(),
        )
        .with_location(metadata.module_path(), metadata.file(), metadata.line());

        if !visitor.fields.is_empty() {
            entry = entry.with_fields(visitor.fields);
        }

        self.producer.append(entry);
    }
}

/// Collects the `message` field and every other field as JSON.
#[derive(Default)]
struct EntryVisitor {
    message: Option<String>,
    fields: HashMap<String, Value>,
}

impl EntryVisitor {
    fn record_value(&mut self, field: &Field, value: Value) {
        if field.name() == "message" {
            self.message = Some(match value {
                Value::String(s) => s,
                other => other.to_string(),
            });
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for EntryVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.record_value(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.record_value(field, Value::from(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.record_value(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.record_value(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.record_value(field, Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn Debug) {
        self.record_value(field, Value::String(format!("{:?}", value)));
    }
}
