use crate::level::Level;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::Serialize;
use serde_json::Value;

/// Names accepted as `extra` fields, in registration order.
///
/// Anything else recorded on an event is ignored by the pipeline.
pub const EXTRA_FIELDS: &[&str] = &["user_id", "table", "record", "wait", "host", "exchange"];

/// Logger name used when the emitter does not provide one.
pub const DEFAULT_LOGGER: &str = "app-name";

/// Where an event was emitted from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Origin {
    pub module: String,
    pub function: String,
    pub line: u32,
}

impl Default for Origin {
    fn default() -> Self {
        Self {
            module: "-".to_string(),
            function: "-".to_string(),
            line: 0,
        }
    }
}

/// Allow-listed optional fields attached to an event.
///
/// Only names from [`EXTRA_FIELDS`] are kept. Iteration follows the
/// allow-list order, not insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Extra {
    values: Vec<(&'static str, Value)>,
}

impl Extra {
    /// Store `value` under `name` if the name is allow-listed.
    ///
    /// Returns `false` (and stores nothing) for unknown names.
    pub fn insert(&mut self, name: &str, value: impl Into<Value>) -> bool {
        let Some(rank) = EXTRA_FIELDS.iter().position(|f| *f == name) else {
            return false;
        };
        let key = EXTRA_FIELDS[rank];
        let value = value.into();

        match self.values.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => {
                let at = self
                    .values
                    .iter()
                    .position(|(k, _)| rank_of(k) > rank)
                    .unwrap_or(self.values.len());
                self.values.insert(at, (key, value));
            }
        }
        true
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.iter().find(|(k, _)| *k == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Value)> {
        self.values.iter().map(|(k, v)| (*k, v))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }
}

fn rank_of(name: &str) -> usize {
    EXTRA_FIELDS
        .iter()
        .position(|f| *f == name)
        .unwrap_or(EXTRA_FIELDS.len())
}

/// One log call, fully rendered. Built once and only read afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct EventRecord {
    /// UTC, truncated to microseconds.
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    /// Name of the logger that produced the event.
    pub logger: String,
    pub message: String,
    pub origin: Origin,
    pub extra: Extra,
    /// Explicit envelope subject, overriding the origin-derived one.
    pub subject: Option<String>,
    pub exception_info: Option<String>,
    pub stack_info: Option<String>,
}

impl EventRecord {
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now().trunc_subsecs(6),
            level,
            logger: DEFAULT_LOGGER.to_string(),
            message: message.into(),
            origin: Origin::default(),
            extra: Extra::default(),
            subject: None,
            exception_info: None,
            stack_info: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp.trunc_subsecs(6);
        self
    }

    pub fn with_logger(mut self, logger: impl Into<String>) -> Self {
        self.logger = logger.into();
        self
    }

    pub fn with_origin(mut self, module: impl Into<String>, function: impl Into<String>, line: u32) -> Self {
        self.origin = Origin {
            module: module.into(),
            function: function.into(),
            line,
        };
        self
    }

    /// Attach an extra field; names outside [`EXTRA_FIELDS`] are dropped.
    pub fn with_extra(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.extra.insert(name, value);
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_exception(mut self, exception_info: impl Into<String>) -> Self {
        self.exception_info = Some(exception_info.into());
        self
    }

    pub fn with_stack(mut self, stack_info: impl Into<String>) -> Self {
        self.stack_info = Some(stack_info.into());
        self
    }

    /// RFC3339 with microseconds and a `Z` suffix.
    pub fn timestamp_rfc3339(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
    }
}
