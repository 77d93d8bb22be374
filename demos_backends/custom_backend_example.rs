use std::sync::Arc;

use tracing::{error, info};
use tracing_log_relay::{
    formatter::{FormatterAssignment, FormatterKind},
    init::{init_logging_with_config, shutdown_logging},
    config::LogConfig,
    level::Level,
    record::EventRecord,
    sink::{Sink, SinkError},
};

/// Example of integrating a completely custom backend by implementing
/// the `Sink` trait directly. Imagine this talks to some proprietary
/// store for which this crate does not provide a built-in sink.
struct MyCustomDbSink;

impl Sink for MyCustomDbSink {
    fn name(&self) -> &str {
        "my-custom-db"
    }

    fn emit(&self, event: &EventRecord, payload: &str) -> Result<(), SinkError> {
        // Here you would call your own client library for the target store.
        println!("[my-custom-db] {} {}", event.level, payload);
        Ok(())
    }
}

fn main() {
    let dispatcher = init_logging_with_config(LogConfig::default())
        .expect("failed to initialize logging");

    let assignment = FormatterAssignment {
        kind: FormatterKind::Envelope,
        ..FormatterAssignment::plain()
    };
    dispatcher
        .register("my-custom-db", Arc::new(MyCustomDbSink), Level::Error, assignment)
        .expect("register custom sink");

    info!("custom backend example started");
    error!(table = "orders", "simulated error sent via custom backend");

    shutdown_logging();
}
