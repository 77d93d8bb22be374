pub mod level;
pub mod record;
pub mod env;
pub mod config;
pub mod formatter;
pub mod sink;
pub mod console;
pub mod file;
pub mod broker;
pub mod publisher;
pub mod broker_sink;

#[cfg(feature = "amqp")]
pub mod amqp;

pub mod dispatcher;
pub mod layer;
pub mod init;
pub mod noop_sink;

pub use config::{BrokerConfig, EnvelopeConfig, LogConfig};
pub use dispatcher::{dispatcher, set_dispatcher, Dispatcher, DispatcherBuilder};
pub use init::{init_logging, init_logging_with, init_logging_with_config, shutdown_logging};
pub use level::Level;
pub use record::EventRecord;
pub use sink::{Sink, SinkError};
