//! Broker publisher: owns the single connection/channel pair, reconnects
//! with bounded exponential backoff and never panics or errors towards
//! the emitting thread.

use crate::broker::{BrokerChannel, BrokerConnection, BrokerConnector, BrokerError};
use crate::config::BrokerConfig;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// `tracing` target of the publisher's own diagnostics. The broker sink
/// refuses events from this target so the publisher never logs into
/// itself.
pub const PUBLISHER_TARGET: &str = "broker_internal";

/// Upper bound of a single backoff delay.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Lifecycle of the broker connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// Terminal; reached through [`BrokerPublisher::close`].
    Closed,
}

/// Blocking wait used between reconnect attempts.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by `std::thread::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Bounded exponential backoff: `base * 2^(attempt - 1)`, capped at
/// [`MAX_BACKOFF`], for attempts `1..=max_attempts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max_attempts: u32,
}

impl Backoff {
    pub fn new(base: Duration, max_attempts: u32) -> Self {
        Self { base, max_attempts }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before `attempt` (1-based), or `None` past the budget.
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
        let delay = self.base.checked_mul(factor).unwrap_or(MAX_BACKOFF);
        Some(delay.min(MAX_BACKOFF))
    }
}

struct Inner {
    state: ConnectionState,
    connection: Option<Box<dyn BrokerConnection>>,
    channel: Option<Box<dyn BrokerChannel>>,
    reconnect_attempts: u32,
}

impl Inner {
    fn is_live(&self) -> bool {
        self.state == ConnectionState::Connected
            && self.connection.as_ref().is_some_and(|c| c.is_open())
            && self.channel.as_ref().is_some_and(|c| c.is_open())
    }
}

/// Thread-safe publisher of formatted payloads to one exchange.
///
/// Every state-changing operation runs under one mutex. Retries are an
/// iterative loop inside that critical section rather than re-entrant
/// calls, and the backoff sleep happens while holding it, which slows
/// concurrent emitters down instead of queueing their events.
pub struct BrokerPublisher {
    config: BrokerConfig,
    connector: Arc<dyn BrokerConnector>,
    sleeper: Arc<dyn Sleeper>,
    backoff: Backoff,
    inner: Mutex<Inner>,
}

impl BrokerPublisher {
    /// Create a disconnected publisher. Nothing is opened until the first
    /// [`connect`](Self::connect) or [`publish`](Self::publish).
    pub fn new(config: BrokerConfig, connector: Arc<dyn BrokerConnector>) -> Self {
        let backoff = Backoff::new(
            Duration::from_secs(config.reconnect_delay),
            config.max_reconnect_attempts,
        );
        Self {
            config,
            connector,
            sleeper: Arc::new(ThreadSleeper),
            backoff,
            inner: Mutex::new(Inner {
                state: ConnectionState::Disconnected,
                connection: None,
                channel: None,
                reconnect_attempts: 0,
            }),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    /// Connected with an open connection and an open channel.
    pub fn is_connected(&self) -> bool {
        self.lock().is_live()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.lock().reconnect_attempts
    }

    /// Re-arm the reconnect budget after it was exhausted.
    pub fn reset(&self) {
        self.lock().reconnect_attempts = 0;
    }

    /// Open connection and channel and declare the exchange.
    ///
    /// Returns `true` immediately when already connected. Failures are
    /// logged and reported as `false`.
    pub fn connect(&self) -> bool {
        let mut inner = self.lock();
        self.connect_locked(&mut inner)
    }

    /// One backoff step followed by a connect attempt.
    pub fn reconnect(&self) -> bool {
        let mut inner = self.lock();
        self.reconnect_locked(&mut inner)
    }

    /// Publish one payload, connecting first if needed.
    ///
    /// A connection or channel error during the send triggers exactly one
    /// reconnect and one more send. Other errors are not retried.
    pub fn publish(&self, payload: &str) -> bool {
        let mut inner = self.lock();
        if inner.state == ConnectionState::Closed {
            return false;
        }
        if !self.ensure_connected(&mut inner) {
            return false;
        }

        match self.send(&mut inner, payload) {
            Ok(()) => true,
            Err(e) if e.is_retryable() => {
                warn!(
                    target: PUBLISHER_TARGET,
                    host = %self.config.host,
                    exchange = %self.config.exchange,
                    error = %e,
                    "Broker connection error during publish, attempting reconnection"
                );
                inner.state = ConnectionState::Disconnected;
                if !self.reconnect_locked(&mut inner) {
                    return false;
                }
                match self.send(&mut inner, payload) {
                    Ok(()) => true,
                    Err(e) => {
                        error!(
                            target: PUBLISHER_TARGET,
                            host = %self.config.host,
                            exchange = %self.config.exchange,
                            error = %e,
                            "Publish failed after reconnection"
                        );
                        if e.is_retryable() {
                            inner.state = ConnectionState::Disconnected;
                        }
                        false
                    }
                }
            }
            Err(e) => {
                error!(
                    target: PUBLISHER_TARGET,
                    host = %self.config.host,
                    exchange = %self.config.exchange,
                    error = %e,
                    "Unexpected error during publish"
                );
                false
            }
        }
    }

    /// Close channel then connection. Errors are logged, never returned.
    /// Safe to call repeatedly or without ever having connected.
    pub fn close(&self) {
        let mut inner = self.lock();
        self.drop_handles(&mut inner);
        if inner.state != ConnectionState::Closed {
            debug!(target: PUBLISHER_TARGET, host = %self.config.host, "Broker publisher closed");
        }
        inner.state = ConnectionState::Closed;
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn connect_locked(&self, inner: &mut Inner) -> bool {
        if inner.state == ConnectionState::Closed {
            return false;
        }
        if inner.is_live() {
            return true;
        }

        inner.state = ConnectionState::Connecting;
        self.drop_handles(inner);
        debug!(
            target: PUBLISHER_TARGET,
            host = %self.config.host,
            exchange = %self.config.exchange,
            "Connecting to broker"
        );

        match self.open() {
            Ok((connection, channel)) => {
                inner.connection = Some(connection);
                inner.channel = Some(channel);
                inner.state = ConnectionState::Connected;
                inner.reconnect_attempts = 0;
                info!(
                    target: PUBLISHER_TARGET,
                    host = %self.config.host,
                    exchange = %self.config.exchange,
                    "Connected to broker"
                );
                true
            }
            Err(e) => {
                error!(
                    target: PUBLISHER_TARGET,
                    host = %self.config.host,
                    exchange = %self.config.exchange,
                    error = %e,
                    "Failed to connect to broker"
                );
                inner.state = ConnectionState::Disconnected;
                false
            }
        }
    }

    fn reconnect_locked(&self, inner: &mut Inner) -> bool {
        if inner.state == ConnectionState::Closed {
            return false;
        }

        let attempt = inner.reconnect_attempts + 1;
        let Some(delay) = self.backoff.delay(attempt) else {
            error!(
                target: PUBLISHER_TARGET,
                host = %self.config.host,
                exchange = %self.config.exchange,
                "Max reconnection attempts ({}) exceeded",
                self.backoff.max_attempts()
            );
            return false;
        };

        info!(
            target: PUBLISHER_TARGET,
            host = %self.config.host,
            exchange = %self.config.exchange,
            "Reconnecting to broker in {:?} ({}/{})",
            delay,
            attempt,
            self.backoff.max_attempts()
        );
        inner.state = ConnectionState::Reconnecting;
        self.sleeper.sleep(delay);
        inner.reconnect_attempts = attempt;
        self.connect_locked(inner)
    }

    /// Plain connect, then reconnect steps until success or the budget
    /// runs out.
    fn ensure_connected(&self, inner: &mut Inner) -> bool {
        if inner.is_live() || self.connect_locked(inner) {
            return true;
        }
        loop {
            if self.reconnect_locked(inner) {
                return true;
            }
            if inner.reconnect_attempts >= self.backoff.max_attempts()
                || inner.state == ConnectionState::Closed
            {
                return false;
            }
        }
    }

    fn open(&self) -> Result<(Box<dyn BrokerConnection>, Box<dyn BrokerChannel>), BrokerError> {
        let mut connection = self.connector.connect(&self.config)?;

        let mut channel = match connection.open_channel() {
            Ok(channel) => channel,
            Err(e) => {
                let _ = connection.close();
                return Err(e);
            }
        };

        if let Err(e) = channel.declare_exchange(
            &self.config.exchange,
            &self.config.exchange_type,
            self.config.exchange_durable,
        ) {
            let _ = channel.close();
            let _ = connection.close();
            return Err(e);
        }

        Ok((connection, channel))
    }

    fn send(&self, inner: &mut Inner, payload: &str) -> Result<(), BrokerError> {
        let channel = inner
            .channel
            .as_mut()
            .ok_or_else(|| BrokerError::Channel("no open channel".to_string()))?;
        channel.publish(
            &self.config.exchange,
            &self.config.routing_key,
            payload.as_bytes(),
            self.config.message_persistent,
        )
    }

    fn drop_handles(&self, inner: &mut Inner) {
        if let Some(mut channel) = inner.channel.take() {
            if channel.is_open() {
                if let Err(e) = channel.close() {
                    warn!(target: PUBLISHER_TARGET, host = %self.config.host, error = %e, "Error closing channel");
                }
            }
        }
        if let Some(mut connection) = inner.connection.take() {
            if connection.is_open() {
                if let Err(e) = connection.close() {
                    warn!(target: PUBLISHER_TARGET, host = %self.config.host, error = %e, "Error closing connection");
                }
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    fn setup(base: u64) -> (Arc<Script>, Arc<RecordingSleeper>, BrokerPublisher) {
        let script = Arc::new(Script::default());
        let sleeper = Arc::new(RecordingSleeper::default());
        let publisher = publisher(&script, &sleeper, base);
        (script, sleeper, publisher)
    }

    #[test]
    fn test_backoff_sequence() {
        let backoff = Backoff::new(Duration::from_secs(2), 5);
        let delays: Vec<_> = (1..=5).map(|a| backoff.delay(a).unwrap().as_secs()).collect();
        assert_eq!(delays, vec![2, 4, 8, 16, 32]);
        assert_eq!(backoff.delay(6), None);
        assert_eq!(backoff.delay(0), None);
    }

    #[test]
    fn test_backoff_is_capped() {
        let backoff = Backoff::new(Duration::from_secs(5), 10);
        assert_eq!(backoff.delay(4), Some(Duration::from_secs(40)));
        assert_eq!(backoff.delay(5), Some(MAX_BACKOFF));
        assert_eq!(backoff.delay(10), Some(MAX_BACKOFF));
    }

    #[test]
    fn test_connect_is_noop_when_connected() {
        let (script, _sleeper, publisher) = setup(2);
        assert!(publisher.connect());
        assert!(publisher.connect());
        assert_eq!(script.connects(), 1);
        assert_eq!(publisher.state(), ConnectionState::Connected);
        assert!(publisher.is_connected());
    }

    #[test]
    fn test_connect_failure_leaves_disconnected() {
        let (script, _sleeper, publisher) = setup(2);
        script.fail_connects(1);
        assert!(!publisher.connect());
        assert_eq!(publisher.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_declare_rejection_is_a_connect_failure() {
        let (script, _sleeper, publisher) = setup(2);
        script.declare_results.lock().unwrap().push_back(Err(BrokerError::ClosedByBroker {
            code: 406,
            text: "PRECONDITION_FAILED".into(),
        }));
        assert!(!publisher.connect());
        assert_eq!(publisher.state(), ConnectionState::Disconnected);
        assert!(publisher.connect());
    }

    #[test]
    fn test_reconnect_sleeps_then_gives_up() {
        let (script, sleeper, publisher) = setup(2);
        script.fail_connects(10);

        for _ in 0..5 {
            assert!(!publisher.reconnect());
        }
        assert_eq!(sleeper.slept(), vec![2, 4, 8, 16, 32]);

        // Sixth attempt fails without sleeping or dialing.
        let dials = script.connects();
        assert!(!publisher.reconnect());
        assert_eq!(sleeper.slept().len(), 5);
        assert_eq!(script.connects(), dials);

        publisher.reset();
        assert_eq!(publisher.reconnect_attempts(), 0);
    }

    #[test]
    fn test_publish_recovers_after_two_failed_connects() {
        let (script, sleeper, publisher) = setup(2);
        script.fail_connects(2);

        assert!(publisher.publish("hello"));
        assert_eq!(script.connects(), 3);
        assert_eq!(sleeper.slept(), vec![2, 4]);
        assert_eq!(publisher.reconnect_attempts(), 0);
        assert_eq!(*script.published.lock().unwrap(), vec!["hello".to_string()]);
    }

    #[test]
    fn test_publish_gives_up_when_broker_is_down() {
        let (script, sleeper, publisher) = setup(1);
        script.fail_connects(100);

        assert!(!publisher.publish("lost"));
        // One plain connect plus five backoff steps.
        assert_eq!(script.connects(), 6);
        assert_eq!(sleeper.slept(), vec![1, 2, 4, 8, 16]);
        assert_eq!(script.publishes(), 0);
    }

    #[test]
    fn test_publish_retries_once_on_connection_error() {
        let (script, sleeper, publisher) = setup(2);
        script.push_publish(Err(BrokerError::Connection("reset by peer".into())));

        assert!(publisher.publish("again"));
        assert_eq!(script.publishes(), 2);
        assert_eq!(script.connects(), 2);
        assert_eq!(sleeper.slept(), vec![2]);
    }

    #[test]
    fn test_publish_returns_false_when_retry_also_fails() {
        let (script, _sleeper, publisher) = setup(2);
        script.push_publish(Err(BrokerError::Channel("closed".into())));
        script.push_publish(Err(BrokerError::Channel("closed".into())));

        assert!(!publisher.publish("x"));
        assert_eq!(script.publishes(), 2);
        assert_eq!(publisher.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_publish_does_not_retry_other_errors() {
        let (script, sleeper, publisher) = setup(2);
        script.push_publish(Err(BrokerError::Other("encoding".into())));

        assert!(!publisher.publish("x"));
        assert_eq!(script.publishes(), 1);
        assert!(sleeper.slept().is_empty());
        assert!(publisher.is_connected());
    }

    #[test]
    fn test_close_is_idempotent_and_terminal() {
        let (script, _sleeper, publisher) = setup(2);
        publisher.close();
        assert_eq!(publisher.state(), ConnectionState::Closed);

        let (script2, _sleeper2, publisher2) = setup(2);
        assert!(publisher2.connect());
        publisher2.close();
        publisher2.close();
        assert_eq!(script2.channel_closes.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(script2.connection_closes.load(std::sync::atomic::Ordering::SeqCst), 1);

        assert!(!publisher2.publish("after close"));
        assert!(!publisher2.connect());
        assert_eq!(script.connects(), 0);
    }

    #[test]
    fn test_close_swallows_errors() {
        let (script, _sleeper, publisher) = setup(2);
        assert!(publisher.connect());
        *script.close_error.lock().unwrap() = Some(BrokerError::Connection("gone".into()));
        publisher.close();
        assert_eq!(publisher.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_concurrent_publishers_share_one_connection() {
        let (script, _sleeper, publisher) = setup(2);
        let publisher = Arc::new(publisher);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let p = Arc::clone(&publisher);
                std::thread::spawn(move || {
                    for j in 0..25 {
                        assert!(p.publish(&format!("{}-{}", i, j)));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(script.connects(), 1);
        assert_eq!(script.published.lock().unwrap().len(), 200);
    }
}
