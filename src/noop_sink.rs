use crate::record::EventRecord;
use crate::sink::{Sink, SinkError};

/// A sink that simply drops all payloads.
///
/// Useful for measuring the overhead of the dispatcher and formatters
/// without any I/O, and for tests that don't care about delivery.
#[derive(Clone, Default)]
pub struct NoopSink;

impl Sink for NoopSink {
    fn name(&self) -> &str {
        "noop"
    }

    fn emit(&self, _event: &EventRecord, _payload: &str) -> Result<(), SinkError> {
        Ok(())
    }
}
