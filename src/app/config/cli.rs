use super::serde_helpers::{non_empty, parse_duration, trimmed_string};
use super::{ConfigError, LogFormat, LogLevel, SinkType};
use crate::app::dispatcher::DispatcherOptions;
use crate::buffer::{BufferConfig, DEFAULT_MAX_AGE, DEFAULT_MAX_ENTRIES};
use crate::sender::{HttpSinkConfig, ObjectStoreConfig, SinkSettings};
use clap::parser::ValueSource;
use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_LISTEN: &str = "0.0.0.0:5014";
const DEFAULT_REGION: &str = "auto";
const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_QUEUE_CAPACITY: usize = 10_000;
const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser, Debug, Clone, Deserialize)]
#[command(
    name = "logfwrd",
    author,
    version,
    about = "Receives syslog messages and ships them in gzip batches to S3 or an HTTP collector",
    long_about = None
)]
#[serde(default)]
pub struct Config {
    /// Delivery target for finished batches
    #[arg(long, env = "LOGFWRD_SINK", value_enum, default_value = "s3")]
    pub sink: SinkType,

    /// Address for the syslog daemon to listen on (UDP)
    #[arg(long, env = "LOGFWRD_LISTEN", default_value = DEFAULT_LISTEN)]
    pub listen: String,

    /// Object store endpoint or collector URL
    #[arg(long, env = "LOGFWRD_ENDPOINT", default_value = "")]
    #[serde(deserialize_with = "trimmed_string")]
    pub endpoint: String,

    /// Name of the bucket where syslog messages are stored
    #[arg(long, env = "LOGFWRD_BUCKET", default_value = "")]
    #[serde(deserialize_with = "trimmed_string")]
    pub bucket: String,

    /// Region where the bucket is located
    #[arg(long, env = "LOGFWRD_REGION", default_value = DEFAULT_REGION)]
    pub region: String,

    /// Access key for the bucket
    #[arg(long, env = "LOGFWRD_KEY", default_value = "", hide_env_values = true)]
    #[serde(deserialize_with = "trimmed_string")]
    pub key: String,

    /// Secret key for the bucket
    #[arg(long, env = "LOGFWRD_SECRET", default_value = "", hide_env_values = true)]
    #[serde(deserialize_with = "trimmed_string")]
    pub secret: String,

    /// Authorization header value for the HTTP collector
    #[arg(long, env = "LOGFWRD_AUTH", default_value = "", hide_env_values = true)]
    #[serde(deserialize_with = "trimmed_string")]
    pub auth: String,

    /// Tag attached to every delivered batch
    #[arg(long, env = "LOGFWRD_TAG", default_value = "")]
    #[serde(deserialize_with = "trimmed_string")]
    pub tag: String,

    /// Maximum number of records per batch
    #[arg(long, env = "LOGFWRD_MAX_RECORDS", default_value = "5000")]
    pub max_records: usize,

    /// Maximum age of a batch before it is delivered (e.g. 300ms, 5m, 1m30s)
    #[arg(long, env = "LOGFWRD_MAX_INTERVAL", default_value = "60s", value_parser = parse_duration)]
    #[serde(with = "humantime_serde")]
    pub max_interval: Duration,

    /// Upper bound for a single delivery attempt
    #[arg(
        long,
        env = "LOGFWRD_DELIVERY_TIMEOUT",
        default_value = "10s",
        value_parser = parse_duration
    )]
    #[serde(with = "humantime_serde")]
    pub delivery_timeout: Duration,

    /// Records waiting between the listener and the buffer
    #[arg(long, env = "LOGFWRD_QUEUE_CAPACITY", default_value = "10000")]
    pub queue_capacity: usize,

    /// Also check the batch age on this interval, not only when a record arrives
    #[arg(long, env = "LOGFWRD_IDLE_CHECK_INTERVAL", value_parser = parse_duration)]
    #[serde(with = "humantime_serde")]
    pub idle_check_interval: Option<Duration>,

    /// Deliver the open batch on shutdown instead of discarding it
    #[arg(long, env = "LOGFWRD_FLUSH_ON_SHUTDOWN")]
    pub flush_on_shutdown: bool,

    /// Log level
    #[arg(long, env = "LOGFWRD_LOG_LEVEL", value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Log output format
    #[arg(long, env = "LOGFWRD_LOG_FORMAT", value_enum, default_value = "text")]
    pub log_format: LogFormat,

    /// Show per-batch diagnostics (same as --log-level debug)
    #[arg(short, long)]
    pub verbose: bool,

    /// Serve Prometheus metrics on this port
    #[arg(long, env = "LOGFWRD_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Configuration file path (TOML); flags and environment take precedence
    #[arg(long, env = "LOGFWRD_CONFIG_FILE")]
    #[serde(skip)]
    pub config_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sink: SinkType::S3,
            listen: DEFAULT_LISTEN.to_string(),
            endpoint: String::new(),
            bucket: String::new(),
            region: DEFAULT_REGION.to_string(),
            key: String::new(),
            secret: String::new(),
            auth: String::new(),
            tag: String::new(),
            max_records: DEFAULT_MAX_ENTRIES,
            max_interval: DEFAULT_MAX_AGE,
            delivery_timeout: DEFAULT_DELIVERY_TIMEOUT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            idle_check_interval: None,
            flush_on_shutdown: false,
            log_level: LogLevel::Info,
            log_format: LogFormat::Text,
            verbose: false,
            metrics_port: None,
            config_file: None,
        }
    }
}

impl Config {
    /// Parses flags and environment, layers the optional config file under
    /// them, and validates the result.
    pub fn from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let matches = Config::command().try_get_matches_from(args)?;
        let mut config = Config::from_arg_matches(&matches)?;

        if let Some(path) = config.config_file.clone() {
            let file = Self::read_file(&path)?;
            config.fill_unset_from(file, &matches);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::read_file(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.config_file = Some(path.to_path_buf());
        Ok(config)
    }

    /// Takes every value that was not given on the command line or through
    /// the environment from `file`.
    fn fill_unset_from(&mut self, file: Config, matches: &ArgMatches) {
        let explicit = |id: &str| {
            matches!(
                matches.value_source(id),
                Some(ValueSource::CommandLine | ValueSource::EnvVariable)
            )
        };

        macro_rules! fill {
            ($($field:ident),* $(,)?) => {
                $(
                    if !explicit(stringify!($field)) {
                        self.$field = file.$field;
                    }
                )*
            };
        }

        fill!(
            sink,
            listen,
            endpoint,
            bucket,
            region,
            key,
            secret,
            auth,
            tag,
            max_records,
            max_interval,
            delivery_timeout,
            queue_capacity,
            idle_check_interval,
            flush_on_shutdown,
            log_level,
            log_format,
            verbose,
            metrics_port,
        );
    }

    /// `--verbose` wins over `--log-level`.
    pub fn effective_log_level(&self) -> LogLevel {
        if self.verbose {
            LogLevel::Debug
        } else {
            self.log_level
        }
    }

    pub fn buffer_config(&self) -> BufferConfig {
        BufferConfig {
            max_entries: self.max_records,
            max_age: self.max_interval,
            label: non_empty(&self.tag),
        }
    }

    pub fn sink_settings(&self) -> SinkSettings {
        match self.sink {
            SinkType::S3 => SinkSettings::ObjectStore(ObjectStoreConfig {
                endpoint: self.endpoint.clone(),
                bucket: self.bucket.clone(),
                region: non_empty(&self.region).unwrap_or_else(|| DEFAULT_REGION.to_string()),
                access_key: self.key.clone(),
                secret_key: self.secret.clone(),
                timeout: self.delivery_timeout,
                ..Default::default()
            }),
            SinkType::Http => SinkSettings::Http(HttpSinkConfig {
                endpoint: self.endpoint.clone(),
                authorization: non_empty(&self.auth),
                timeout: self.delivery_timeout,
                connection_timeout: HTTP_CONNECT_TIMEOUT.min(self.delivery_timeout),
                ..Default::default()
            }),
        }
    }

    pub fn dispatcher_options(&self) -> DispatcherOptions {
        DispatcherOptions {
            idle_check_interval: self.idle_check_interval,
            flush_on_shutdown: self.flush_on_shutdown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s3_args() -> Vec<&'static str> {
        vec![
            "logfwrd",
            "--endpoint",
            "https://s3.example.com",
            "--bucket",
            "logs",
            "--key",
            "AKIA",
            "--secret",
            "shh",
        ]
    }

    #[test]
    fn test_verbose_forces_debug() {
        let config = Config {
            verbose: true,
            log_level: LogLevel::Warn,
            ..Default::default()
        };
        assert_eq!(config.effective_log_level(), LogLevel::Debug);
    }

    #[test]
    fn test_buffer_config_drops_blank_tag() {
        let config = Config {
            tag: "  ".to_string(),
            ..Default::default()
        };
        assert_eq!(config.buffer_config().label, None);
        assert_eq!(config.buffer_config().max_entries, 5000);
    }

    #[test]
    fn test_http_settings_carry_auth_and_timeout() {
        let config = Config {
            sink: SinkType::Http,
            endpoint: "https://collector.example.com/ingest".to_string(),
            auth: "Bearer t".to_string(),
            delivery_timeout: Duration::from_secs(3),
            ..Default::default()
        };

        let SinkSettings::Http(http) = config.sink_settings() else {
            panic!("expected http settings");
        };
        assert_eq!(http.authorization.as_deref(), Some("Bearer t"));
        assert_eq!(http.timeout, Duration::from_secs(3));
        assert_eq!(http.connection_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_object_store_settings() {
        let config = Config::from_args(s3_args()).unwrap();
        let SinkSettings::ObjectStore(s3) = config.sink_settings() else {
            panic!("expected object store settings");
        };
        assert_eq!(s3.bucket, "logs");
        assert_eq!(s3.region, "auto");
        assert_eq!(s3.timeout, Duration::from_secs(10));
    }
}
