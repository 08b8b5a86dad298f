use std::env;

use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

// Import CRATE_NAMES, which lists all crates in the workspace.
include!(concat!(env!("OUT_DIR"), "/constants.gen.rs"));

/// The verbosity of log output.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Logging is disabled for workspace crates.
    Off,
    /// Only errors.
    Error,
    /// Errors and warnings.
    Warn,
    /// Informational messages, the default.
    #[default]
    Info,
    /// Messages useful for debugging.
    Debug,
    /// Everything.
    Trace,
}

impl Level {
    /// Returns the [`LevelFilter`] for this level.
    pub const fn level_filter(self) -> LevelFilter {
        match self {
            Self::Off => LevelFilter::OFF,
            Self::Error => LevelFilter::ERROR,
            Self::Warn => LevelFilter::WARN,
            Self::Info => LevelFilter::INFO,
            Self::Debug => LevelFilter::DEBUG,
            Self::Trace => LevelFilter::TRACE,
        }
    }
}

impl std::str::FromStr for Level {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "off" => Self::Off,
            "error" => Self::Error,
            "warn" | "warning" => Self::Warn,
            "info" => Self::Info,
            "debug" => Self::Debug,
            "trace" => Self::Trace,
            _ => return Err(ParseLevelError),
        })
    }
}

/// Error returned when parsing a [`Level`] from an unknown string.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ParseLevelError;

impl std::fmt::Display for ParseLevelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("invalid log level")
    }
}

impl std::error::Error for ParseLevelError {}

/// How log lines are rendered.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// [`LogFormat::Pretty`] on a terminal, [`LogFormat::Simplified`] otherwise.
    #[default]
    Auto,

    /// Compact colored output for interactive use.
    ///
    /// ```text
    ///  INFO  tally_bus::sink > published metric
    /// ```
    Pretty,

    /// Plain text with timestamps, for log files.
    ///
    /// ```text
    /// 2024-03-04T12:10:32Z  INFO tally_bus::sink: published metric
    /// ```
    Simplified,

    /// One JSON object per line, for log collectors.
    ///
    /// ```text
    /// {"timestamp":"2024-03-04T12:11:08.729716Z","level":"INFO","message":"published metric","target":"tally_bus::sink"}
    /// ```
    Json,
}

/// The `logging` section of the configuration.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// Verbosity of the workspace crates. Dependencies always log at `info`.
    pub level: Level,

    /// Rendering of log lines.
    pub format: LogFormat,

    /// Sets `RUST_BACKTRACE=full` on startup.
    pub enable_backtraces: bool,
}

/// Builds the default filter: INFO for third-party crates, the configured level for our own.
fn default_filter(level: Level) -> EnvFilter {
    let mut directives = String::from("info");
    for name in CRATE_NAMES {
        directives.push(',');
        directives.push_str(name);
        directives.push('=');
        directives.push_str(&level.level_filter().to_string().to_lowercase());
    }
    EnvFilter::new(directives)
}

/// Installs the global subscriber. Later calls have no effect.
///
/// A set `RUST_LOG` variable replaces the configured level entirely.
///
/// ```
/// let config = tally_log::LogConfig {
///     level: tally_log::Level::Debug,
///     ..Default::default()
/// };
///
/// tally_log::init(&config);
/// ```
pub fn init(config: &LogConfig) {
    if config.enable_backtraces {
        env::set_var("RUST_BACKTRACE", "full");
    }

    let filter = match env::var(EnvFilter::DEFAULT_ENV) {
        Ok(_) => EnvFilter::from_default_env(),
        Err(_) => default_filter(config.level),
    };

    let format: Box<dyn Layer<Registry> + Send + Sync> =
        match (config.format, console::user_attended()) {
            (LogFormat::Auto, true) | (LogFormat::Pretty, _) => {
                fmt::layer().compact().with_target(true).boxed()
            }
            (LogFormat::Auto, false) | (LogFormat::Simplified, _) => {
                fmt::layer().with_ansi(false).with_target(true).boxed()
            }
            (LogFormat::Json, _) => fmt::layer()
                .json()
                .flatten_event(true)
                .with_current_span(false)
                .with_span_list(false)
                .boxed(),
        };

    tracing_subscriber::registry()
        .with(format.with_filter(filter))
        .try_init()
        .ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_config() {
        let yaml = r#"
level: debug
format: json
"#;
        let config: LogConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.level, Level::Debug);
        assert_eq!(config.format, LogFormat::Json);
        assert!(!config.enable_backtraces);
    }

    #[test]
    fn test_level_from_str() {
        assert_eq!("WARNING".parse::<Level>(), Ok(Level::Warn));
        assert_eq!("trace".parse::<Level>(), Ok(Level::Trace));
        assert_eq!("loud".parse::<Level>(), Err(ParseLevelError));
    }

    #[test]
    fn test_default_filter_lists_workspace_crates() {
        let filter = default_filter(Level::Debug).to_string().to_lowercase();
        assert!(filter.contains("tally_log=debug"));
    }
}
