use crate::config::{ConfigError, LogConfig};
use crate::dispatcher::{self, Dispatcher, DispatcherError};
use crate::layer::DispatchLayer;
use std::sync::Arc;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Failure while wiring logging into the process.
#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error("invalid logging configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Dispatcher(#[from] DispatcherError),

    #[error("a global tracing subscriber is already installed: {0}")]
    Subscriber(#[from] SetGlobalDefaultError),
}

/// Initialize logging from the process environment.
///
/// Reads the variables listed in [`env`](crate::env), opens the selected
/// sinks and installs a [`Registry`] with a [`DispatchLayer`] as the
/// global `tracing` subscriber.
pub fn init_logging() -> Result<Arc<Dispatcher>, InitError> {
    init_logging_with_config(LogConfig::from_env()?)
}

/// Initialize logging from an explicit [`LogConfig`].
pub fn init_logging_with_config(config: LogConfig) -> Result<Arc<Dispatcher>, InitError> {
    let dispatcher = Arc::new(Dispatcher::builder(config).build()?);
    init_logging_with(Arc::clone(&dispatcher))?;
    Ok(dispatcher)
}

/// Install `dispatcher` as the process-wide dispatcher and route all
/// `tracing` events to it.
///
/// A dispatcher installed earlier is shut down first. Only the first call
/// in a process can install the subscriber; later calls still swap the
/// dispatcher and then report [`InitError::Subscriber`].
pub fn init_logging_with(dispatcher: Arc<Dispatcher>) -> Result<(), InitError> {
    if let Some(previous) = dispatcher::set_dispatcher(dispatcher) {
        previous.shutdown();
    }

    let subscriber = Registry::default().with(DispatchLayer::global());
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Flush and close every sink of the process-wide dispatcher.
///
/// Safe to call more than once; later calls do nothing. Does nothing when
/// no dispatcher was ever installed or built.
pub fn shutdown_logging() {
    if let Some(current) = dispatcher::current_dispatcher() {
        current.shutdown();
    }
}
