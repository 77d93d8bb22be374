use crate::record::EventRecord;

/// Error returned by a [`Sink`]. The dispatcher reports it and moves on;
/// it never reaches the code that emitted the event.
#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("broker did not accept the payload")]
    Undelivered,

    #[error("sink is closed")]
    Closed,
}

/// Destination for formatted payloads owned by the
/// [`Dispatcher`](crate::dispatcher::Dispatcher).
///
/// Implementations are called concurrently from every emitting thread, so
/// they take `&self` and synchronize internally.
pub trait Sink: Send + Sync {
    /// Short name used in the dispatcher's diagnostics.
    fn name(&self) -> &str;

    /// Per-sink filter applied before formatting.
    ///
    /// Default implementation accepts everything.
    fn accepts(&self, _event: &EventRecord) -> bool {
        true
    }

    /// Deliver one formatted payload.
    ///
    /// **Parameters**
    /// - `event`: the record `payload` was produced from, for routing
    ///   decisions such as severity.
    /// - `payload`: output of the sink's assigned formatter.
    ///
    /// **Returns**
    /// - `Ok(())` if the payload was written, or intentionally skipped.
    /// - `Err(..)` if the underlying channel failed.
    fn emit(&self, event: &EventRecord, payload: &str) -> Result<(), SinkError>;

    /// Release the sink's resources.
    ///
    /// Must be idempotent: later calls are no-ops returning `Ok(())`.
    fn close(&self) -> Result<(), SinkError> {
        Ok(())
    }
}
