use crate::broker::{BrokerChannel, BrokerConnection, BrokerConnector, BrokerError};
use crate::config::BrokerConfig;
use lapin::options::{BasicPublishOptions, ExchangeDeclareOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use std::future::Future;
use std::sync::{mpsc, Arc};
use std::time::Duration;
use tokio::runtime::{Handle, Runtime};

/// AMQP 0-9-1 transport built on `lapin`.
///
/// The publisher API is blocking, so the connector owns a small Tokio
/// runtime. Every `lapin` future is spawned onto it and the calling thread
/// waits on a channel for the result, which works from plain threads and
/// from inside other Tokio runtimes alike.
#[derive(Clone)]
pub struct AmqpConnector {
    runtime: Arc<OwnedRuntime>,
}

impl AmqpConnector {
    pub fn new() -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("amqp-publisher")
            .enable_time()
            .build()?;
        Ok(Self {
            runtime: Arc::new(OwnedRuntime(Some(runtime))),
        })
    }
}

/// Runtime that may be dropped from async code: it shuts down in the
/// background instead of blocking.
struct OwnedRuntime(Option<Runtime>);

impl OwnedRuntime {
    fn handle(&self) -> Option<&Handle> {
        self.0.as_ref().map(Runtime::handle)
    }
}

impl Drop for OwnedRuntime {
    fn drop(&mut self) {
        if let Some(runtime) = self.0.take() {
            runtime.shutdown_background();
        }
    }
}

/// Run `fut` on `runtime` and wait for it, failing with `on_timeout` after
/// `limit`.
fn run<T, F>(runtime: &OwnedRuntime, limit: Duration, fut: F, on_timeout: BrokerError) -> Result<T, BrokerError>
where
    F: Future<Output = Result<T, lapin::Error>> + Send + 'static,
    T: Send + 'static,
{
    let Some(handle) = runtime.handle() else {
        return Err(BrokerError::Connection("amqp runtime is gone".to_string()));
    };

    let (tx, rx) = mpsc::sync_channel(1);
    handle.spawn(async move {
        let _ = tx.send(tokio::time::timeout(limit, fut).await);
    });

    match rx.recv() {
        Ok(Ok(result)) => result.map_err(map_error),
        Ok(Err(_elapsed)) => Err(on_timeout),
        Err(_) => Err(BrokerError::Connection("amqp runtime stopped".to_string())),
    }
}

fn map_error(error: lapin::Error) -> BrokerError {
    match error {
        lapin::Error::ProtocolError(e) => BrokerError::ClosedByBroker {
            code: e.get_id(),
            text: e.to_string(),
        },
        lapin::Error::InvalidChannelState(state) => {
            BrokerError::Channel(format!("invalid channel state: {:?}", state))
        }
        lapin::Error::ChannelsLimitReached => BrokerError::Channel("channels limit reached".to_string()),
        lapin::Error::SerialisationError(e) => BrokerError::Other(e.to_string()),
        other => BrokerError::Connection(other.to_string()),
    }
}

fn exchange_kind(kind: &str) -> ExchangeKind {
    match kind.to_ascii_lowercase().as_str() {
        "direct" => ExchangeKind::Direct,
        "fanout" => ExchangeKind::Fanout,
        "headers" => ExchangeKind::Headers,
        "topic" => ExchangeKind::Topic,
        _ => ExchangeKind::Custom(kind.to_string()),
    }
}

impl BrokerConnector for AmqpConnector {
    fn connect(&self, config: &BrokerConfig) -> Result<Box<dyn BrokerConnection>, BrokerError> {
        let uri = config.uri();
        let limit = config.socket_timeout();
        let attempts = config.connection_attempts.max(1);

        let mut last_error = BrokerError::Connection("no connection attempt made".to_string());
        for attempt in 1..=attempts {
            let uri = uri.clone();
            let result = run(
                &self.runtime,
                limit,
                async move { Connection::connect(&uri, ConnectionProperties::default()).await },
                BrokerError::Connection(format!("connect timed out after {:?}", limit)),
            );
            match result {
                Ok(connection) => {
                    return Ok(Box::new(AmqpConnection {
                        runtime: Arc::clone(&self.runtime),
                        connection: Arc::new(connection),
                        timeout: limit,
                        blocked_timeout: config.blocked_connection_timeout(),
                    }))
                }
                Err(e) => last_error = e,
            }
            if attempt < attempts {
                std::thread::sleep(config.retry_delay());
            }
        }
        Err(last_error)
    }
}

struct AmqpConnection {
    runtime: Arc<OwnedRuntime>,
    connection: Arc<Connection>,
    timeout: Duration,
    blocked_timeout: Duration,
}

impl BrokerConnection for AmqpConnection {
    fn open_channel(&mut self) -> Result<Box<dyn BrokerChannel>, BrokerError> {
        let connection = Arc::clone(&self.connection);
        let channel = run(
            &self.runtime,
            self.timeout,
            async move { connection.create_channel().await },
            BrokerError::Channel("channel open timed out".to_string()),
        )?;
        Ok(Box::new(AmqpChannel {
            runtime: Arc::clone(&self.runtime),
            channel,
            timeout: self.timeout,
            blocked_timeout: self.blocked_timeout,
        }))
    }

    fn is_open(&self) -> bool {
        self.connection.status().connected()
    }

    fn close(&mut self) -> Result<(), BrokerError> {
        let connection = Arc::clone(&self.connection);
        run(
            &self.runtime,
            self.timeout,
            async move { connection.close(200, "closing").await },
            BrokerError::Connection("connection close timed out".to_string()),
        )
    }
}

struct AmqpChannel {
    runtime: Arc<OwnedRuntime>,
    channel: Channel,
    timeout: Duration,
    blocked_timeout: Duration,
}

impl BrokerChannel for AmqpChannel {
    fn declare_exchange(&mut self, name: &str, kind: &str, durable: bool) -> Result<(), BrokerError> {
        // The default exchange always exists and cannot be redeclared.
        if name.is_empty() {
            return Ok(());
        }
        let options = ExchangeDeclareOptions {
            durable,
            ..ExchangeDeclareOptions::default()
        };
        let channel = self.channel.clone();
        let name = name.to_string();
        let kind = exchange_kind(kind);
        run(
            &self.runtime,
            self.timeout,
            async move {
                channel
                    .exchange_declare(&name, kind, options, FieldTable::default())
                    .await
            },
            BrokerError::Channel("exchange declare timed out".to_string()),
        )
    }

    fn publish(
        &mut self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
        persistent: bool,
    ) -> Result<(), BrokerError> {
        let properties = BasicProperties::default().with_delivery_mode(if persistent { 2 } else { 1 });
        let channel = self.channel.clone();
        let (exchange, routing_key, body) = (exchange.to_string(), routing_key.to_string(), body.to_vec());
        // Only the send is awaited; no publisher confirm.
        run(
            &self.runtime,
            self.blocked_timeout,
            async move {
                channel
                    .basic_publish(&exchange, &routing_key, BasicPublishOptions::default(), &body, properties)
                    .await
            },
            BrokerError::Connection("publish blocked by broker".to_string()),
        )
        .map(|_confirm| ())
    }

    fn is_open(&self) -> bool {
        self.channel.status().connected()
    }

    fn close(&mut self) -> Result<(), BrokerError> {
        let channel = self.channel.clone();
        run(
            &self.runtime,
            self.timeout,
            async move { channel.close(200, "closing").await },
            BrokerError::Channel("channel close timed out".to_string()),
        )
    }
}
