use std::sync::Arc;
use std::time::Instant;
use tracing::error;

use tracing_log_relay::config::LogConfig;
use tracing_log_relay::dispatcher::Dispatcher;
use tracing_log_relay::init::{init_logging_with, shutdown_logging};

fn main() {
    // Default text formatting, console output discarded so only the
    // pipeline itself is measured.
    let dispatcher = Dispatcher::builder(LogConfig::default())
        .console_writers(Box::new(std::io::sink()), Box::new(std::io::sink()))
        .build()
        .expect("build dispatcher");
    init_logging_with(Arc::new(dispatcher)).expect("install subscriber");

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        error!(record = i, "default load test error");
    }

    let elapsed = start.elapsed();
    println!("default config: sent {} events in {:?} (~{:.0} ev/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    shutdown_logging();
}
