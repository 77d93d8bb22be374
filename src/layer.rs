use crate::dispatcher::{self, Dispatcher};
use crate::level::Level;
use crate::publisher::PUBLISHER_TARGET;
use crate::record::{EventRecord, Origin};
use serde_json::Value;
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// Field holding the formatted exception text.
pub const EXC_INFO_FIELD: &str = "exc_info";
/// Field holding a captured stack trace.
pub const STACK_INFO_FIELD: &str = "stack_info";
/// Field overriding the envelope subject.
pub const SUBJECT_FIELD: &str = "subject";
/// `error!(critical = true, ..)` is recorded as CRITICAL.
pub const CRITICAL_FIELD: &str = "critical";

/// `tracing_subscriber` layer that turns every event into an
/// [`EventRecord`] and hands it to a [`Dispatcher`] on the calling thread.
///
/// Fields named in [`EXTRA_FIELDS`](crate::record::EXTRA_FIELDS) become
/// extras; other fields are ignored. The enclosing span's name is used as
/// the function name of the event origin.
pub struct DispatchLayer {
    dispatcher: Option<Arc<Dispatcher>>,
}

impl DispatchLayer {
    /// Layer bound to a specific dispatcher.
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher: Some(dispatcher),
        }
    }

    /// Layer that looks up the process-wide dispatcher on every event, so
    /// [`set_dispatcher`](crate::dispatcher::set_dispatcher) takes effect
    /// immediately.
    pub fn global() -> Self {
        Self { dispatcher: None }
    }

    fn dispatcher(&self) -> Arc<Dispatcher> {
        match &self.dispatcher {
            Some(d) => Arc::clone(d),
            None => dispatcher::dispatcher(),
        }
    }
}

impl<S> Layer<S> for DispatchLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let dispatcher = self.dispatcher();

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let meta = event.metadata();
        let mut level = Level::from_tracing(meta.level());
        if visitor.critical && level == Level::Error {
            level = Level::Critical;
        }

        let logger = if meta.target() == PUBLISHER_TARGET {
            PUBLISHER_TARGET.to_string()
        } else {
            dispatcher.config().name.clone()
        };

        let function = ctx
            .event_span(event)
            .map(|span| span.name().to_string())
            .unwrap_or_else(|| Origin::default().function);

        let mut record = EventRecord::new(level, visitor.message.unwrap_or_default())
            .with_logger(logger)
            .with_origin(
                meta.module_path().unwrap_or(meta.target()),
                function,
                meta.line().unwrap_or(0),
            );
        for (name, value) in visitor.fields {
            record.extra.insert(&name, value);
        }
        record.subject = visitor.subject;
        record.exception_info = visitor.exc_info;
        record.stack_info = visitor.stack_info;

        dispatcher.emit(&record);
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: Vec<(String, Value)>,
    subject: Option<String>,
    exc_info: Option<String>,
    stack_info: Option<String>,
    critical: bool,
}

impl FieldVisitor {
    fn record_value(&mut self, field: &Field, value: Value) {
        match field.name() {
            "message" => self.message = Some(into_text(value)),
            SUBJECT_FIELD => self.subject = Some(into_text(value)),
            EXC_INFO_FIELD => self.exc_info = Some(into_text(value)),
            STACK_INFO_FIELD => self.stack_info = Some(into_text(value)),
            CRITICAL_FIELD => self.critical = value.as_bool().unwrap_or(false),
            name => self.fields.push((name.to_string(), value)),
        }
    }
}

fn into_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.record_value(field, Value::String(value.to_string()));
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

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.record_value(field, Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.record_value(field, Value::String(format!("{:?}", value)));
    }
}
