use crate::publisher::{BrokerPublisher, PUBLISHER_TARGET};
use crate::record::EventRecord;
use crate::sink::{Sink, SinkError};
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

thread_local! {
    /// Set while this thread is inside [`BrokerSink::emit`].
    static IN_BROKER_EMIT: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as publishing until dropped.
struct EmitGuard;

impl EmitGuard {
    fn enter() -> Self {
        IN_BROKER_EMIT.with(|flag| flag.set(true));
        EmitGuard
    }
}

impl Drop for EmitGuard {
    fn drop(&mut self) {
        IN_BROKER_EMIT.with(|flag| flag.set(false));
    }
}

fn in_broker_emit() -> bool {
    IN_BROKER_EMIT.with(Cell::get)
}

/// Sink publishing every payload through a [`BrokerPublisher`].
///
/// Carries a circuit breaker: after `max_failed` consecutive failed
/// publishes, further payloads are skipped without touching the network
/// until the counter is reset, either by a successful publish still in
/// flight or by [`BrokerSink::reset_circuit`].
///
/// Events logged by the publisher itself are refused, so a failing broker
/// cannot feed its own error messages back into the broker. The same goes
/// for any event raised on a thread that is already publishing, such as
/// the transport library's own logs.
pub struct BrokerSink {
    publisher: Arc<BrokerPublisher>,
    failed_messages: AtomicU32,
    max_failed: u32,
    closed: AtomicBool,
}

impl BrokerSink {
    /// Breaker threshold taken from the publisher's config.
    pub fn new(publisher: Arc<BrokerPublisher>) -> Self {
        let max_failed = publisher.config().max_failed_messages;
        Self::with_threshold(publisher, max_failed)
    }

    pub fn with_threshold(publisher: Arc<BrokerPublisher>, max_failed: u32) -> Self {
        Self {
            publisher,
            failed_messages: AtomicU32::new(0),
            max_failed,
            closed: AtomicBool::new(false),
        }
    }

    pub fn publisher(&self) -> &Arc<BrokerPublisher> {
        &self.publisher
    }

    /// Consecutive failed publishes since the last success.
    pub fn failed_messages(&self) -> u32 {
        self.failed_messages.load(Ordering::Acquire)
    }

    pub fn is_circuit_open(&self) -> bool {
        self.failed_messages() >= self.max_failed
    }

    /// Close the breaker so the next payload is attempted again.
    pub fn reset_circuit(&self) {
        self.failed_messages.store(0, Ordering::Release);
    }
}

impl Sink for BrokerSink {
    fn name(&self) -> &str {
        "broker"
    }

    fn accepts(&self, event: &EventRecord) -> bool {
        event.logger != PUBLISHER_TARGET && !in_broker_emit()
    }

    fn emit(&self, _event: &EventRecord, payload: &str) -> Result<(), SinkError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SinkError::Closed);
        }

        if in_broker_emit() || self.is_circuit_open() {
            return Ok(());
        }

        let delivered = {
            let _guard = EmitGuard::enter();
            self.publisher.publish(payload)
        };

        if delivered {
            self.failed_messages.store(0, Ordering::Release);
            Ok(())
        } else {
            self.failed_messages.fetch_add(1, Ordering::AcqRel);
            Err(SinkError::Undelivered)
        }
    }

    fn close(&self) -> Result<(), SinkError> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.publisher.close();
        }
        Ok(())
    }
}
