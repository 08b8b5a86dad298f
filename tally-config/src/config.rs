use std::collections::BTreeMap;
use std::env;
use std::error::Error;
use std::fmt;
use std::fs;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tally_bus::{ExportConfig, FlowConfig, KafkaConfigParam, ListenerConfig};
use tally_log::{Level, LogConfig};
use tally_metrics::{AggregateConfig, KeyPattern};
use tally_statsd::MetricsClientConfig;
use thiserror::Error;

/// Name of the Kafka parameter replaced by the `kafka_url` override.
const KAFKA_BOOTSTRAP_SERVERS: &str = "bootstrap.servers";

/// Where a faulty configuration value came from.
#[derive(Debug)]
enum Origin {
    Unknown,
    File(PathBuf),
    Override(&'static str),
}

/// Failure to load, validate or override the configuration.
#[derive(Debug)]
pub struct ConfigError {
    origin: Origin,
    kind: ConfigErrorKind,
    inner: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl ConfigError {
    fn new(kind: ConfigErrorKind) -> Self {
        Self {
            origin: Origin::Unknown,
            kind,
            inner: None,
        }
    }

    fn wrap(inner: impl Into<Box<dyn Error + Send + Sync>>, kind: ConfigErrorKind) -> Self {
        Self {
            inner: Some(inner.into()),
            ..Self::new(kind)
        }
    }

    fn invalid_override(
        inner: impl Into<Box<dyn Error + Send + Sync>>,
        field: &'static str,
    ) -> Self {
        Self::wrap(inner, ConfigErrorKind::InvalidValue).field(field)
    }

    fn file(self, path: impl Into<PathBuf>) -> Self {
        Self {
            origin: Origin::File(path.into()),
            ..self
        }
    }

    fn field(self, name: &'static str) -> Self {
        Self {
            origin: Origin::Override(name),
            ..self
        }
    }

    /// Returns what went wrong, without the origin.
    pub fn kind(&self) -> ConfigErrorKind {
        self.kind
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.kind, f)?;
        match &self.origin {
            Origin::Unknown => Ok(()),
            Origin::File(path) => write!(f, " (file {})", path.display()),
            Origin::Override(name) => write!(f, " (field {name})"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.inner
            .as_deref()
            .map(|error| error as &(dyn Error + 'static))
    }
}

/// The category of a [`ConfigError`].
#[derive(Clone, Copy, Debug, Eq, Error, Hash, PartialEq)]
pub enum ConfigErrorKind {
    /// The config file is missing or unreadable.
    #[error("could not open config file")]
    CouldNotOpenFile,
    /// The configuration could not be serialized.
    #[error("could not write config file")]
    CouldNotWriteFile,
    /// The config file is not valid YAML or does not match the expected structure.
    #[error("could not parse yaml config file")]
    BadYaml,
    /// A JSON configuration does not match the expected structure.
    #[error("could not parse json config file")]
    BadJson,
    /// A value is out of range or malformed.
    #[error("invalid config value")]
    InvalidValue,
}

/// A section of configuration stored as `<dir>/<name>.yml`.
trait ConfigFile: DeserializeOwned + Serialize {
    const NAME: &'static str;

    fn path(dir: &Path) -> PathBuf {
        dir.join(Self::NAME).with_extension("yml")
    }

    fn load(dir: &Path) -> Result<Self, ConfigError> {
        let path = Self::path(dir);
        let file = fs::File::open(&path).map_err(|err| {
            ConfigError::wrap(err, ConfigErrorKind::CouldNotOpenFile).file(&path)
        })?;

        serde_yaml::from_reader(io::BufReader::new(file))
            .map_err(|err| ConfigError::wrap(err, ConfigErrorKind::BadYaml).file(&path))
    }
}

/// Values that take precedence over the config file, typically from the command line or
/// environment variables.
#[derive(Debug, Default)]
pub struct OverridableConfig {
    /// The routing key prefix of published metrics.
    pub prefix: Option<String>,
    /// The exchange or topic metrics are published to.
    pub exchange: Option<String>,
    /// "true" if metadata headers are attached to published metrics, "false" otherwise.
    pub add_headers: Option<String>,
    /// The prefix for received metrics without a prefix header.
    pub listener_prefix: Option<String>,
    /// Replaces the `bootstrap.servers` Kafka parameter.
    pub kafka_url: Option<String>,
    /// Hostname and port of the statsd server for internal metrics.
    pub statsd: Option<String>,
    /// The log level of all workspace crates.
    pub log_level: Option<String>,
}

/// Reporting of Tally's own health to statsd.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
struct InternalMetrics {
    /// `host:port` of the statsd server. Internal metrics are off without it.
    statsd: Option<String>,
    /// Prepended to every internal metric name, `"tally"` unless set.
    prefix: String,
    /// Tags attached to every internal metric.
    default_tags: BTreeMap<String, String>,
    /// Fraction of internal metrics that is sent, `1.0` unless set.
    sample_rate: f64,
}

impl Default for InternalMetrics {
    fn default() -> Self {
        Self {
            statsd: None,
            prefix: "tally".to_owned(),
            default_tags: BTreeMap::new(),
            sample_rate: 1.0,
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
struct ConfigValues {
    logging: LogConfig,
    metrics: InternalMetrics,
    export: ExportConfig,
    listener: ListenerConfig,
    flow: FlowConfig,
    aggregate: AggregateConfig,
    kafka_config: Vec<KafkaConfigParam>,
}

impl ConfigValues {
    fn validate(&self) -> Result<(), ConfigError> {
        self.aggregate
            .key_pattern
            .parse::<KeyPattern>()
            .map_err(|err| ConfigError::wrap(err, ConfigErrorKind::InvalidValue))?;
        Ok(())
    }
}

impl ConfigFile for ConfigValues {
    const NAME: &'static str = "config";
}

/// The complete Tally configuration, loaded from `config.yml` in a config directory.
#[derive(Debug, Default)]
pub struct Config {
    path: PathBuf,
    values: ConfigValues,
}

impl Config {
    /// Loads and validates `config.yml` from the directory at `path`.
    ///
    /// Relative paths are resolved against the working directory.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = match env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.as_ref().to_owned(),
        };

        let values = ConfigValues::load(&path)?;
        values
            .validate()
            .map_err(|err| err.file(ConfigValues::path(&path)))?;

        Ok(Self { path, values })
    }

    /// Builds a configuration from JSON, mainly for tests.
    pub fn from_json_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        let values: ConfigValues = serde_json::from_value(value)
            .map_err(|err| ConfigError::wrap(err, ConfigErrorKind::BadJson))?;
        values.validate()?;

        Ok(Self {
            path: PathBuf::new(),
            values,
        })
    }

    /// Applies command line or environment overrides on top of the loaded values.
    pub fn apply_override(
        &mut self,
        overrides: OverridableConfig,
    ) -> Result<&mut Self, ConfigError> {
        let export = &mut self.values.export;

        if let Some(prefix) = overrides.prefix {
            export.prefix = Some(prefix);
        }

        if let Some(exchange) = overrides.exchange {
            export.exchange = exchange;
        }

        if let Some(enabled) = overrides.add_headers {
            match enabled.to_lowercase().as_str() {
                "true" | "1" => export.add_headers = true,
                "false" | "0" | "" => export.add_headers = false,
                _ => {
                    return Err(
                        ConfigError::new(ConfigErrorKind::InvalidValue).field("add_headers")
                    );
                }
            }
        }

        if let Some(listener_prefix) = overrides.listener_prefix {
            self.values.listener.default_prefix = listener_prefix;
        }

        if let Some(kafka_url) = overrides.kafka_url {
            let params = &mut self.values.kafka_config;
            match params.iter_mut().find(|p| p.name == KAFKA_BOOTSTRAP_SERVERS) {
                Some(param) => param.value = kafka_url,
                None => params.push(KafkaConfigParam {
                    name: KAFKA_BOOTSTRAP_SERVERS.to_owned(),
                    value: kafka_url,
                }),
            }
        }

        if let Some(statsd) = overrides.statsd {
            self.values.metrics.statsd = Some(statsd);
        }

        if let Some(log_level) = overrides.log_level {
            self.values.logging.level = log_level
                .parse::<Level>()
                .map_err(|err| ConfigError::invalid_override(err, "log_level"))?;
        }

        Ok(self)
    }

    /// Returns `true` if the directory at `path` contains a `config.yml`.
    pub fn config_exists(path: impl AsRef<Path>) -> bool {
        ConfigValues::path(path.as_ref()).is_file()
    }

    /// Returns the config directory, empty for configurations not loaded from disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serializes the effective configuration, including defaults and overrides.
    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(&self.values)
            .map_err(|err| ConfigError::wrap(err, ConfigErrorKind::CouldNotWriteFile))
    }

    /// Returns the logging section.
    pub fn logging(&self) -> &LogConfig {
        &self.values.logging
    }

    /// Resolves the statsd server for internal metrics.
    ///
    /// Empty when internal metrics are off.
    pub fn statsd_addrs(&self) -> Result<Vec<SocketAddr>, ConfigError> {
        let Some(addr) = self.values.metrics.statsd.as_deref() else {
            return Ok(Vec::new());
        };

        let addrs = addr.to_socket_addrs().map_err(|err| {
            ConfigError::wrap(err, ConfigErrorKind::InvalidValue).file(&self.path)
        })?;
        Ok(addrs.collect())
    }

    /// Returns the name prefix of internal metrics.
    pub fn metrics_prefix(&self) -> &str {
        &self.values.metrics.prefix
    }

    /// Returns the tags attached to every internal metric.
    pub fn metrics_default_tags(&self) -> &BTreeMap<String, String> {
        &self.values.metrics.default_tags
    }

    /// Returns the global sample rate for internal metrics.
    pub fn metrics_sample_rate(&self) -> f64 {
        self.values.metrics.sample_rate
    }

    /// Returns the configuration to initialize internal metrics, if a statsd server is set.
    pub fn metrics_client_config(&self) -> Option<MetricsClientConfig<'_, &str>> {
        let host = self.values.metrics.statsd.as_deref()?;

        Some(MetricsClientConfig {
            prefix: self.metrics_prefix(),
            host,
            default_tags: self.metrics_default_tags().clone(),
            default_sample_rate: self.metrics_sample_rate().into(),
        })
    }

    /// Returns the configuration of the broker sink.
    pub fn export(&self) -> &ExportConfig {
        &self.values.export
    }

    /// Returns the configuration of the broker listener.
    pub fn listener(&self) -> &ListenerConfig {
        &self.values.listener
    }

    /// Returns the configuration of the outbound aggregation flow.
    pub fn flow(&self) -> &FlowConfig {
        &self.values.flow
    }

    /// Returns the configuration of the aggregate reader.
    pub fn aggregate(&self) -> &AggregateConfig {
        &self.values.aggregate
    }

    /// Returns the raw parameters of the Kafka producer.
    pub fn kafka_config(&self) -> &[KafkaConfigParam] {
        &self.values.kafka_config
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;
    use tally_log::LogError;

    use super::*;

    fn write_config(yaml: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("config.yml"), yaml).unwrap();
        dir
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();

        assert_eq!(config.export().exchange, "metrics");
        assert_eq!(config.export().prefix, None);
        assert!(config.export().add_headers);
        assert_eq!(config.listener().default_prefix, "");
        assert_eq!(config.aggregate().key_pattern, "d.d.d");
        assert_eq!(config.metrics_prefix(), "tally");
        assert!(config.statsd_addrs().unwrap().is_empty());
        assert!(config.metrics_client_config().is_none());
        assert!(config.kafka_config().is_empty());
    }

    #[test]
    fn test_from_path() {
        let dir = write_config(
            r#"
logging:
  level: debug
metrics:
  statsd: 127.0.0.1:8125
  prefix: tally.test
export:
  exchange: telemetry
  prefix: app.node1.
  headers:
    region: eu
listener:
  default_prefix: unknown
aggregate:
  key_pattern: d.k.d
  prefix: agg.
kafka_config:
  - name: bootstrap.servers
    value: 127.0.0.1:9092
"#,
        );

        assert!(Config::config_exists(dir.path()));
        let config = Config::from_path(dir.path()).unwrap();

        assert_eq!(config.logging().level, Level::Debug);
        assert_eq!(config.export().exchange, "telemetry");
        assert_eq!(config.export().prefix.as_deref(), Some("app.node1."));
        assert_eq!(config.export().headers["region"], "eu");
        assert_eq!(config.listener().default_prefix, "unknown");
        assert_eq!(config.aggregate().prefix, "agg.");
        assert_eq!(config.kafka_config()[0].value, "127.0.0.1:9092");
        assert_eq!(config.statsd_addrs().unwrap().len(), 1);

        let client_config = config.metrics_client_config().unwrap();
        assert_eq!(client_config.prefix, "tally.test");
        assert_eq!(client_config.host, "127.0.0.1:8125");
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let error = Config::from_path(dir.path()).unwrap_err();

        assert_eq!(error.kind(), ConfigErrorKind::CouldNotOpenFile);
        assert!(error.to_string().starts_with("could not open config file (file "));
        assert!(error.source().is_some());
        assert!(!Config::config_exists(dir.path()));
    }

    #[test]
    fn test_bad_yaml() {
        let dir = write_config("export: [unclosed");
        let error = Config::from_path(dir.path()).unwrap_err();
        assert_eq!(error.kind(), ConfigErrorKind::BadYaml);
    }

    #[test]
    fn test_invalid_key_pattern() {
        let dir = write_config("aggregate:\n  key_pattern: d.x");
        let error = Config::from_path(dir.path()).unwrap_err();

        assert_eq!(error.kind(), ConfigErrorKind::InvalidValue);
        assert!(
            LogError(&error)
                .to_string()
                .ends_with("caused by: invalid key pattern token `x`, expected `k` or `d`")
        );
    }

    #[test]
    fn test_from_json_value() {
        let config = Config::from_json_value(serde_json::json!({
            "export": {"prefix": "node1", "add_headers": false},
            "logging": {"level": "warn", "format": "json"},
        }))
        .unwrap();

        assert_eq!(config.export().prefix.as_deref(), Some("node1"));
        assert!(!config.export().add_headers);
        assert_eq!(config.logging().level, Level::Warn);

        let error = Config::from_json_value(serde_json::json!({"export": 1})).unwrap_err();
        assert_eq!(error.kind(), ConfigErrorKind::BadJson);
    }

    #[test]
    fn test_apply_override() {
        let mut config = Config::from_json_value(serde_json::json!({
            "kafka_config": [{"name": "bootstrap.servers", "value": "kafka:9092"}],
        }))
        .unwrap();

        config
            .apply_override(OverridableConfig {
                prefix: Some("app.node2".to_owned()),
                exchange: Some("telemetry".to_owned()),
                add_headers: Some("0".to_owned()),
                listener_prefix: Some("fallback".to_owned()),
                kafka_url: Some("localhost:9092".to_owned()),
                statsd: Some("127.0.0.1:8125".to_owned()),
                log_level: Some("TRACE".to_owned()),
            })
            .unwrap();

        assert_eq!(config.export().prefix.as_deref(), Some("app.node2"));
        assert_eq!(config.export().exchange, "telemetry");
        assert!(!config.export().add_headers);
        assert_eq!(config.listener().default_prefix, "fallback");
        assert_eq!(
            config.kafka_config(),
            [KafkaConfigParam {
                name: "bootstrap.servers".to_owned(),
                value: "localhost:9092".to_owned(),
            }]
        );
        assert!(config.metrics_client_config().is_some());
        assert_eq!(config.logging().level, Level::Trace);
    }

    #[test]
    fn test_override_adds_kafka_url() {
        let mut config = Config::default();
        config
            .apply_override(OverridableConfig {
                kafka_url: Some("localhost:9092".to_owned()),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(config.kafka_config().len(), 1);
        assert_eq!(config.kafka_config()[0].name, "bootstrap.servers");
    }

    #[test]
    fn test_invalid_overrides() {
        let mut config = Config::default();
        let error = config
            .apply_override(OverridableConfig {
                add_headers: Some("maybe".to_owned()),
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(error.to_string(), "invalid config value (field add_headers)");

        let error = config
            .apply_override(OverridableConfig {
                log_level: Some("loud".to_owned()),
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(error.to_string(), "invalid config value (field log_level)");
        assert_eq!(
            LogError(&error).to_string(),
            "invalid config value (field log_level)\n  caused by: invalid log level"
        );
    }

    #[test]
    fn test_to_yaml_string() {
        let config = Config::default();
        let yaml = config.to_yaml_string().unwrap();
        let reparsed = Config::from_json_value(
            serde_yaml::from_str::<serde_json::Value>(&yaml).unwrap(),
        )
        .unwrap();

        assert_eq!(reparsed.export(), config.export());
    }
}
