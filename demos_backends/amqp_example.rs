use tracing::{error, info, warn};
use tracing_log_relay::env::LOG_TO_AMQP_ENV;
use tracing_log_relay::init::{init_logging, shutdown_logging};

fn main() {
    // Broker settings come from AMQP_HOSTNAME, AMQP_EXCHANGE and friends.
    // Without LOG_TO_AMQP=true only the console sink is opened.
    if std::env::var(LOG_TO_AMQP_ENV).is_err() {
        eprintln!("set {}=true and the AMQP_* variables to publish to a broker", LOG_TO_AMQP_ENV);
    }

    init_logging().expect("failed to initialize logging");

    info!("amqp backend example started");
    warn!(host = "db-1", wait = 3, "replica lagging");
    error!(user_id = 42, exchange = "logs", "simulated error sent via AMQP backend");
    error!(critical = true, exc_info = "TimeoutError: upstream did not answer", "payment gateway down");

    shutdown_logging();
}
