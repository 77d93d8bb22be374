use crate::env::*;
use crate::level::{Level, ParseLevelError};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Error raised while building configuration from the environment.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("{key}: '{value}' is not a valid integer")]
    InvalidInt { key: String, value: String },

    #[error("{key}: '{value}' is not a date in YYYY-MM-DD form")]
    InvalidDate { key: String, value: String },

    #[error(transparent)]
    InvalidLevel(#[from] ParseLevelError),

    #[error("cannot prepare log directory: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration of the whole logging pipeline.
///
/// **Fields**
/// - `name` / `environment`: stamped on every JSON and envelope payload.
/// - `level`: active level; events below it are dropped by every sink and
///   `DEBUG` turns on the origin fields in all formatters.
/// - `to_file`, `to_broker`, `print`: sink selection. `print` replaces the
///   stdout/stderr console pair.
/// - `json`, `structured_envelope`: formatter selection, the envelope wins
///   when both are set.
/// - `color`, `pretty`: console presentation only.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub name: String,
    pub environment: String,
    pub level: Level,
    pub log_dir: PathBuf,
    pub run_date: DateTime<Utc>,
    pub to_file: bool,
    pub to_broker: bool,
    pub print: bool,
    pub json: bool,
    pub structured_envelope: bool,
    pub color: bool,
    pub pretty: bool,
    pub broker: BrokerConfig,
    pub envelope: EnvelopeConfig,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            name: "app-name".to_string(),
            environment: "production".to_string(),
            level: Level::Info,
            log_dir: PathBuf::from("log"),
            run_date: Utc::now(),
            to_file: false,
            to_broker: false,
            print: false,
            json: false,
            structured_envelope: false,
            color: false,
            pretty: false,
            broker: BrokerConfig::default(),
            envelope: EnvelopeConfig::default(),
        }
    }
}

impl LogConfig {
    /// Build the configuration from process environment variables.
    ///
    /// Creates the log directory when file logging is enabled.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`LogConfig::from_env`] but reading values through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let flag = |key: &str, default: bool| lookup(key).map(|v| to_bool(&v)).unwrap_or(default);

        let run_date = match lookup(RUN_DATE_ENV).filter(|v| !v.is_empty()) {
            Some(value) => NaiveDate::parse_from_str(&value, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc())
                .ok_or(ConfigError::InvalidDate {
                    key: RUN_DATE_ENV.to_string(),
                    value,
                })?,
            None => Utc::now(),
        };

        let config = Self {
            name: get(APP_NAME_ENV, "app-name"),
            environment: get(APP_ENV_ENV, "production"),
            level: get(LOG_LEVEL_ENV, "INFO").parse()?,
            log_dir: PathBuf::from(get(LOG_PATH_ENV, "log")),
            run_date,
            to_file: flag(LOG_TO_FILE_ENV, false),
            to_broker: flag(LOG_TO_AMQP_ENV, false),
            print: flag(LOG_PRINT_ENV, false),
            json: flag(LOG_JSON_ENV, false),
            structured_envelope: flag(LOG_CLOUDEVENTS_ENV, true),
            color: flag(LOG_COLOR_ENV, true),
            pretty: flag(LOG_JSON_PRETTY_ENV, false),
            broker: BrokerConfig::from_lookup(&lookup)?,
            envelope: EnvelopeConfig::from_lookup(&lookup),
        };

        if config.to_file {
            std::fs::create_dir_all(&config.log_dir)?;
        }
        Ok(config)
    }

    /// Log file for this run: `<log_dir>/<run date>.log`.
    pub fn file_path(&self) -> PathBuf {
        self.log_dir
            .join(format!("{}.log", self.run_date.format("%Y-%m-%dT%H%M%S")))
    }
}

/// Connection and publishing parameters of the broker sink.
///
/// Durations are whole seconds.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub virtual_host: String,
    pub exchange: String,
    pub exchange_type: String,
    pub exchange_durable: bool,
    pub routing_key: String,
    pub heartbeat: u16,
    /// Connection attempts made by the transport inside one `connect`.
    pub connection_attempts: u32,
    /// Pause between those transport-level attempts.
    pub retry_delay: u64,
    pub socket_timeout: u64,
    pub blocked_connection_timeout: u64,
    /// Persistent delivery mode for every published message.
    pub message_persistent: bool,
    /// Circuit-breaker threshold of the broker sink.
    pub max_failed_messages: u32,
    /// Base delay of the publisher's reconnect backoff.
    pub reconnect_delay: u64,
    pub max_reconnect_attempts: u32,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5672,
            username: "guest".to_string(),
            password: "guest".to_string(),
            virtual_host: "/".to_string(),
            exchange: String::new(),
            exchange_type: "topic".to_string(),
            exchange_durable: true,
            routing_key: "#".to_string(),
            heartbeat: 600,
            connection_attempts: 3,
            retry_delay: 2,
            socket_timeout: 10,
            blocked_connection_timeout: 300,
            message_persistent: true,
            max_failed_messages: 10,
            reconnect_delay: 5,
            max_reconnect_attempts: 5,
        }
    }
}

impl BrokerConfig {
    pub fn from_lookup<F>(lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let flag = |key: &str, default: bool| lookup(key).map(|v| to_bool(&v)).unwrap_or(default);

        Ok(Self {
            host: get(AMQP_HOSTNAME_ENV, &d.host),
            port: int(lookup, AMQP_PORT_ENV, d.port)?,
            username: get(AMQP_USERNAME_ENV, &d.username),
            password: get(AMQP_PASSWORD_ENV, &d.password),
            virtual_host: get(AMQP_VIRTUAL_HOST_ENV, &d.virtual_host),
            exchange: get(AMQP_EXCHANGE_ENV, &d.exchange),
            exchange_type: get(AMQP_EXCHANGE_TYPE_ENV, &d.exchange_type),
            exchange_durable: flag(AMQP_EXCHANGE_DURABLE_ENV, d.exchange_durable),
            routing_key: get(AMQP_ROUTING_KEY_ENV, &d.routing_key),
            heartbeat: int(lookup, AMQP_HEARTBEAT_ENV, d.heartbeat)?,
            connection_attempts: int(lookup, AMQP_CONNECTION_ATTEMPTS_ENV, d.connection_attempts)?,
            retry_delay: int(lookup, AMQP_RETRY_DELAY_ENV, d.retry_delay)?,
            socket_timeout: int(lookup, AMQP_SOCKET_TIMEOUT_ENV, d.socket_timeout)?,
            blocked_connection_timeout: int(
                lookup,
                AMQP_BLOCKED_CONNECTION_TIMEOUT_ENV,
                d.blocked_connection_timeout,
            )?,
            message_persistent: flag(AMQP_MESSAGE_PERSISTENT_ENV, d.message_persistent),
            max_failed_messages: int(lookup, AMQP_MAX_FAILED_MESSAGES_ENV, d.max_failed_messages)?,
            reconnect_delay: int(lookup, AMQP_RECONNECT_DELAY_ENV, d.reconnect_delay)?,
            max_reconnect_attempts: d.max_reconnect_attempts,
        })
    }

    /// `amqp://` URI understood by AMQP clients, with credentials and
    /// vhost percent-encoded.
    pub fn uri(&self) -> String {
        format!(
            "amqp://{}:{}@{}:{}/{}?heartbeat={}&connection_timeout={}",
            urlencoding::encode(&self.username),
            urlencoding::encode(&self.password),
            self.host,
            self.port,
            urlencoding::encode(&self.virtual_host),
            self.heartbeat,
            self.socket_timeout * 1000,
        )
    }

    pub fn socket_timeout(&self) -> Duration {
        Duration::from_secs(self.socket_timeout)
    }

    pub fn blocked_connection_timeout(&self) -> Duration {
        Duration::from_secs(self.blocked_connection_timeout)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay)
    }
}

/// Fixed attributes of the structured (CloudEvents-style) envelope.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct EnvelopeConfig {
    pub spec_version: String,
    pub event_type: String,
    pub data_content_type: String,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            spec_version: "1.0".to_string(),
            event_type: "com.customer.app_name.v1".to_string(),
            data_content_type: "application/json".to_string(),
        }
    }
}

impl EnvelopeConfig {
    pub fn from_lookup<F>(lookup: &F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        Self {
            spec_version: lookup(CLOUDEVENTS_SPEC_VERSION_ENV).unwrap_or(d.spec_version),
            event_type: lookup(CLOUDEVENTS_TYPE_ENV).unwrap_or(d.event_type),
            data_content_type: lookup(CLOUDEVENTS_DATA_CONTENT_TYPE_ENV).unwrap_or(d.data_content_type),
        }
    }
}

fn int<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::InvalidInt {
            key: key.to_string(),
            value,
        }),
    }
}
