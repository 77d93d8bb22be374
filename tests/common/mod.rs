#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing_log_relay::broker::{BrokerChannel, BrokerConnection, BrokerConnector, BrokerError};
use tracing_log_relay::config::BrokerConfig;
use tracing_log_relay::publisher::Sleeper;

/// In-memory broker: connect results are scripted, publishes recorded.
#[derive(Default)]
pub struct FakeBroker {
    pub connect_results: Mutex<VecDeque<Result<(), BrokerError>>>,
    pub connects: AtomicUsize,
    pub published: Mutex<Vec<String>>,
}

impl FakeBroker {
    pub fn fail_next_connects(&self, n: usize) {
        let mut queue = self.connect_results.lock().unwrap();
        for _ in 0..n {
            queue.push_back(Err(BrokerError::Connection("connection refused".into())));
        }
    }

    pub fn published(&self) -> Vec<String> {
        self.published.lock().unwrap().clone()
    }
}

pub struct FakeConnector(pub Arc<FakeBroker>);

impl BrokerConnector for FakeConnector {
    fn connect(&self, _config: &BrokerConfig) -> Result<Box<dyn BrokerConnection>, BrokerError> {
        self.0.connects.fetch_add(1, Ordering::SeqCst);
        let next = self.0.connect_results.lock().unwrap().pop_front();
        next.unwrap_or(Ok(()))?;
        Ok(Box::new(FakeConnection(Arc::clone(&self.0))))
    }
}

struct FakeConnection(Arc<FakeBroker>);

impl BrokerConnection for FakeConnection {
    fn open_channel(&mut self) -> Result<Box<dyn BrokerChannel>, BrokerError> {
        Ok(Box::new(FakeChannel(Arc::clone(&self.0))))
    }

    fn is_open(&self) -> bool {
        true
    }

    fn close(&mut self) -> Result<(), BrokerError> {
        Ok(())
    }
}

struct FakeChannel(Arc<FakeBroker>);

impl BrokerChannel for FakeChannel {
    fn declare_exchange(&mut self, _name: &str, _kind: &str, _durable: bool) -> Result<(), BrokerError> {
        Ok(())
    }

    fn publish(&mut self, _exchange: &str, _routing_key: &str, body: &[u8], _persistent: bool) -> Result<(), BrokerError> {
        self.0.published.lock().unwrap().push(String::from_utf8_lossy(body).into_owned());
        Ok(())
    }

    fn is_open(&self) -> bool {
        true
    }

    fn close(&mut self) -> Result<(), BrokerError> {
        Ok(())
    }
}

#[derive(Default)]
pub struct NoSleep(pub Mutex<Vec<Duration>>);

impl Sleeper for NoSleep {
    fn sleep(&self, duration: Duration) {
        self.0.lock().unwrap().push(duration);
    }
}

/// Cloneable in-memory writer standing in for stdout/stderr.
#[derive(Clone, Default)]
pub struct SharedBuffer(pub Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Connector that logs through `tracing` while connecting, the way a real
/// client library does.
pub struct ChattyConnector(pub Arc<FakeBroker>);

impl BrokerConnector for ChattyConnector {
    fn connect(&self, config: &BrokerConfig) -> Result<Box<dyn BrokerConnection>, BrokerError> {
        tracing::debug!(target: "lapin::connection", "opening connection");
        FakeConnector(Arc::clone(&self.0)).connect(config)
    }
}
