/// Environment variable names read by [`LogConfig::from_env`] and
/// friends.
///
/// These are purely helpers; the sinks and the dispatcher only ever see
/// the resulting config structs.
///
/// [`LogConfig::from_env`]: crate::config::LogConfig::from_env

/// Logical application name, used as the logger name.
pub const APP_NAME_ENV: &str = "APP_NAME";
/// Deployment environment, e.g. `production`.
pub const APP_ENV_ENV: &str = "APP_ENV";
/// Fixed run date (`YYYY-MM-DD`) used to name the log file.
pub const RUN_DATE_ENV: &str = "RUN_DATE";

pub const LOG_LEVEL_ENV: &str = "LOG_LEVEL";
pub const LOG_PATH_ENV: &str = "LOG_PATH";
pub const LOG_TO_FILE_ENV: &str = "LOG_TO_FILE";
pub const LOG_TO_AMQP_ENV: &str = "LOG_TO_AMQP";
pub const LOG_PRINT_ENV: &str = "LOG_PRINT";
pub const LOG_CLOUDEVENTS_ENV: &str = "LOG_CLOUDEVENTS";
pub const LOG_JSON_ENV: &str = "LOG_JSON";
pub const LOG_COLOR_ENV: &str = "LOG_COLOR";
pub const LOG_JSON_PRETTY_ENV: &str = "LOG_JSON_PRETTY";

pub const AMQP_HOSTNAME_ENV: &str = "AMQP_HOSTNAME";
pub const AMQP_PORT_ENV: &str = "AMQP_PORT";
pub const AMQP_USERNAME_ENV: &str = "AMQP_USERNAME";
pub const AMQP_PASSWORD_ENV: &str = "AMQP_PASSWORD";
pub const AMQP_VIRTUAL_HOST_ENV: &str = "AMQP_VIRTUAL_HOST";
pub const AMQP_EXCHANGE_ENV: &str = "AMQP_EXCHANGE";
pub const AMQP_EXCHANGE_TYPE_ENV: &str = "AMQP_EXCHANGE_TYPE";
pub const AMQP_EXCHANGE_DURABLE_ENV: &str = "AMQP_EXCHANGE_DURABLE";
pub const AMQP_ROUTING_KEY_ENV: &str = "AMQP_ROUTING_KEY";
pub const AMQP_HEARTBEAT_ENV: &str = "AMQP_HEARTBEAT";
pub const AMQP_CONNECTION_ATTEMPTS_ENV: &str = "AMQP_CONNECTION_ATTEMPTS";
pub const AMQP_RETRY_DELAY_ENV: &str = "AMQP_RETRY_DELAY";
pub const AMQP_SOCKET_TIMEOUT_ENV: &str = "AMQP_SOCKET_TIMEOUT";
pub const AMQP_BLOCKED_CONNECTION_TIMEOUT_ENV: &str = "AMQP_BLOCKED_CONNECTION_TIMEOUT";
pub const AMQP_MESSAGE_PERSISTENT_ENV: &str = "AMQP_MESSAGE_PERSISTENT";
pub const AMQP_MAX_FAILED_MESSAGES_ENV: &str = "AMQP_MAX_FAILED_MESSAGES";
pub const AMQP_RECONNECT_DELAY_ENV: &str = "AMQP_RECONNECT_DELAY";

pub const CLOUDEVENTS_SPEC_VERSION_ENV: &str = "CLOUDEVENTS_SPEC_VERSION";
pub const CLOUDEVENTS_TYPE_ENV: &str = "CLOUDEVENTS_TYPE";
pub const CLOUDEVENTS_DATA_CONTENT_TYPE_ENV: &str = "CLOUDEVENTS_DATA_CONTENT_TYPE";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// `true`, `t` and `1` (any case) are true; everything else is false.
pub fn to_bool(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "t" | "1")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_bool() {
        assert!(to_bool("TRUE"));
        assert!(to_bool("t"));
        assert!(to_bool(" 1 "));
        assert!(!to_bool("yes"));
        assert!(!to_bool(""));
    }

    #[test]
    fn test_env_or_falls_back() {
        assert_eq!(env_or("TRACING_LOG_RELAY_SURELY_UNSET", "dflt"), "dflt");
    }
}
