use crate::config::EnvelopeConfig;
use crate::level::RESET;
use crate::record::EventRecord;
use serde::Serialize;
use serde_json::{Map, Value};

/// Which serialization a sink receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatterKind {
    /// `<timestamp> - <LEVEL> - <message>` line.
    Text,
    /// Flat JSON object.
    Json,
    /// CloudEvents-style envelope with the JSON payload under `data`.
    Envelope,
}

impl FormatterKind {
    /// Envelope takes precedence over JSON, JSON over plain text.
    pub fn select(json: bool, structured_envelope: bool) -> Self {
        if structured_envelope {
            FormatterKind::Envelope
        } else if json {
            FormatterKind::Json
        } else {
            FormatterKind::Text
        }
    }
}

/// Per-sink formatting settings, fixed once the dispatcher is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatterAssignment {
    pub kind: FormatterKind,
    pub color: bool,
    pub pretty: bool,
    /// Adds module, function and line to every payload.
    pub debug_context: bool,
}

impl FormatterAssignment {
    pub fn plain() -> Self {
        Self {
            kind: FormatterKind::Text,
            color: false,
            pretty: false,
            debug_context: false,
        }
    }
}

impl Default for FormatterAssignment {
    fn default() -> Self {
        Self::plain()
    }
}

/// Turns [`EventRecord`]s into payload strings.
///
/// `format` is total: a missing optional field is skipped, never an
/// error.
#[derive(Debug, Clone)]
pub struct Formatter {
    assignment: FormatterAssignment,
    environment: String,
    envelope: EnvelopeConfig,
}

impl Formatter {
    pub fn new(
        assignment: FormatterAssignment,
        environment: impl Into<String>,
        envelope: EnvelopeConfig,
    ) -> Self {
        Self {
            assignment,
            environment: environment.into(),
            envelope,
        }
    }

    pub fn assignment(&self) -> &FormatterAssignment {
        &self.assignment
    }

    pub fn format(&self, event: &EventRecord) -> String {
        let body = match self.assignment.kind {
            FormatterKind::Text => self.format_text(event),
            FormatterKind::Json => self.format_json(event),
            FormatterKind::Envelope => self.format_envelope(event),
        };

        // Color brackets the finished payload, never parts of it.
        if self.assignment.color {
            format!("{}{}{}", event.level.color(), body, RESET)
        } else {
            body
        }
    }

    fn format_text(&self, event: &EventRecord) -> String {
        let mut line = format!(
            "{} - {} - {}",
            event.timestamp_rfc3339(),
            event.level,
            event.message
        );

        for (name, value) in event.extra.iter() {
            line.push_str(" - ");
            line.push_str(name);
            line.push('=');
            match value {
                Value::String(s) => line.push_str(s),
                other => line.push_str(&other.to_string()),
            }
        }

        if self.assignment.debug_context {
            let o = &event.origin;
            line.push_str(&format!(" ({}::{}:{})", o.module, o.function, o.line));
        }

        if let Some(exc) = &event.exception_info {
            line.push('\n');
            line.push_str(exc);
        }
        if let Some(stack) = &event.stack_info {
            line.push('\n');
            line.push_str(stack);
        }
        line
    }

    fn format_json(&self, event: &EventRecord) -> String {
        let mut object = Map::new();
        object.insert("name".into(), Value::from(event.logger.as_str()));
        object.insert("environment".into(), Value::from(self.environment.as_str()));
        object.insert("timestamp".into(), Value::from(event.timestamp_rfc3339()));
        object.insert("level".into(), Value::from(event.level.as_str()));
        object.insert("message".into(), Value::from(event.message.as_str()));
        self.fill_details(&mut object, event);

        self.render(&object, event)
    }

    fn format_envelope(&self, event: &EventRecord) -> String {
        let mut data = Map::new();
        data.insert("message".into(), Value::from(event.message.as_str()));
        self.fill_details(&mut data, event);

        let subject = match &event.subject {
            Some(subject) => subject.clone(),
            None => format!(
                "{}::{}:{}",
                event.origin.module, event.origin.function, event.origin.line
            ),
        };

        let envelope = Envelope {
            specversion: &self.envelope.spec_version,
            id: uuid::Uuid::new_v4().to_string(),
            source: format!("/{}/cloudevents", event.logger),
            event_type: &self.envelope.event_type,
            subject,
            time: event.timestamp_rfc3339(),
            datacontenttype: &self.envelope.data_content_type,
            environment: &self.environment,
            level: event.level.as_str(),
            data,
        };

        self.render(&envelope, event)
    }

    /// Exception and stack text, extras, then origin under debug context.
    fn fill_details(&self, object: &mut Map<String, Value>, event: &EventRecord) {
        if let Some(exc) = &event.exception_info {
            object.insert("exc_info".into(), Value::from(exc.as_str()));
        }
        if let Some(stack) = &event.stack_info {
            object.insert("stack_info".into(), Value::from(stack.as_str()));
        }
        for (name, value) in event.extra.iter() {
            object.insert(name.to_string(), value.clone());
        }
        if self.assignment.debug_context {
            object.insert("module".into(), Value::from(event.origin.module.as_str()));
            object.insert("function".into(), Value::from(event.origin.function.as_str()));
            object.insert("lineno".into(), Value::from(event.origin.line));
        }
    }

    fn render<T: Serialize>(&self, value: &T, event: &EventRecord) -> String {
        let rendered = if self.assignment.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        rendered.unwrap_or_else(|_| event.message.clone())
    }
}

#[derive(Serialize)]
struct Envelope<'a> {
    specversion: &'a str,
    id: String,
    source: String,
    #[serde(rename = "type")]
    event_type: &'a str,
    subject: String,
    time: String,
    datacontenttype: &'a str,
    environment: &'a str,
    level: &'a str,
    data: Map<String, Value>,
}
