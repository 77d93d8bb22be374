use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info_span};

use tracing_log_relay::config::LogConfig;
use tracing_log_relay::dispatcher::Dispatcher;
use tracing_log_relay::formatter::FormatterAssignment;
use tracing_log_relay::init::{init_logging_with, shutdown_logging};
use tracing_log_relay::level::Level;
use tracing_log_relay::noop_sink::NoopSink;

fn main() {
    let log_dir = std::env::temp_dir().join("tracing-log-relay-load");

    // JSON to the discarded console, plain text to a file, plus a noop
    // sink that still pays for formatting.
    let config = LogConfig {
        name: "load-test".to_string(),
        json: true,
        to_file: true,
        log_dir,
        ..LogConfig::default()
    };
    std::fs::create_dir_all(&config.log_dir).expect("create log dir");

    let dispatcher = Dispatcher::builder(config)
        .console_writers(Box::new(std::io::sink()), Box::new(std::io::sink()))
        .build()
        .expect("build dispatcher");
    dispatcher
        .register("noop", Arc::new(NoopSink), Level::Error, FormatterAssignment::default())
        .expect("register noop sink");
    let path = dispatcher.config().file_path();
    init_logging_with(Arc::new(dispatcher)).expect("install subscriber");

    let n: u64 = 100_000;
    let start = Instant::now();

    let span = info_span!("load_loop");
    let _guard = span.enter();
    for i in 0..n {
        error!(record = i, table = "events", "custom load test error");
    }

    let elapsed = start.elapsed();
    println!("custom config: sent {} events in {:?} (~{:.0} ev/s), file: {}",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64(),
        path.display()
    );

    shutdown_logging();
}
