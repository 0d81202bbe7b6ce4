//! In-memory capture of log events.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::{Event, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;

/// Span fields copied onto every event recorded inside the span.
const CONTEXT_KEYS: [&str; 2] = ["run_id", "route"];

/// One captured event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapturedEvent {
    pub level: String,
    pub target: String,
    pub message: String,
    pub fields: HashMap<String, String>,
}

impl CapturedEvent {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Shared handle to the events seen by a [`CaptureLayer`].
#[derive(Debug, Clone, Default)]
pub struct CapturedEvents {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl CapturedEvents {
    pub fn all(&self) -> Vec<CapturedEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    /// Events whose message contains `needle`.
    pub fn matching(&self, needle: &str) -> Vec<CapturedEvent> {
        self.all().into_iter().filter(|e| e.message.contains(needle)).collect()
    }

    fn push(&self, event: CapturedEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

/// A layer that records events, with context fields of their enclosing spans.
#[derive(Debug, Clone)]
pub struct CaptureLayer {
    events: CapturedEvents,
}

/// Create a layer and the handle to read what it captures.
pub fn capture() -> (CaptureLayer, CapturedEvents) {
    let events = CapturedEvents::default();
    (CaptureLayer { events: events.clone() }, events)
}

#[derive(Default)]
struct FieldVisitor(HashMap<String, String>);

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.insert(field.name().to_string(), format!("{value:?}"));
    }
}

#[derive(Clone)]
struct SpanContext(HashMap<String, String>);

impl<S> Layer<S> for CaptureLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };
        let mut visitor = FieldVisitor::default();
        attrs.record(&mut visitor);
        let mut fields: HashMap<String, String> =
            visitor.0.into_iter().filter(|(k, _)| CONTEXT_KEYS.contains(&k.as_str())).collect();

        // Inherit context the span does not override.
        if let Some(parent) = span.parent() {
            if let Some(inherited) = parent.extensions().get::<SpanContext>() {
                for (key, value) in &inherited.0 {
                    fields.entry(key.clone()).or_insert_with(|| value.clone());
                }
            }
        }
        span.extensions_mut().insert(SpanContext(fields));
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };
        let mut visitor = FieldVisitor::default();
        values.record(&mut visitor);
        let mut extensions = span.extensions_mut();
        if let Some(context) = extensions.get_mut::<SpanContext>() {
            for (key, value) in visitor.0 {
                if CONTEXT_KEYS.contains(&key.as_str()) {
                    context.0.insert(key, value);
                }
            }
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        let mut fields = visitor.0;
        let message = fields.remove("message").unwrap_or_default();

        if let Some(scope) = ctx.event_scope(event) {
            for span in scope {
                if let Some(context) = span.extensions().get::<SpanContext>() {
                    for (key, value) in &context.0 {
                        fields.entry(key.clone()).or_insert_with(|| value.clone());
                    }
                }
            }
        }

        let metadata = event.metadata();
        self.events.push(CapturedEvent {
            level: metadata.level().to_string(),
            target: metadata.target().to_string(),
            message,
            fields,
        });
    }
}
