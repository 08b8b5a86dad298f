use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Name prefix of the counter family.
///
/// Counters carry monotonic counts. Sinks that only understand increments derive deltas for
/// metrics in this family, and resets only have an effect on them.
pub const COUNTER_PREFIX: &str = "counter.";

/// Type used for metric readings and increments.
pub type ValueType = f64;

/// An error returned when constructing a metric with an empty name.
#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
#[error("metric name must not be empty")]
pub struct InvalidMetricName;

/// The family of a metric, determined by the first segment of its name.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum MetricFamily {
    /// Monotonic counts, `counter.*`.
    Counter,
    /// Instantaneous readings, `gauge.*`.
    Gauge,
    /// Durations, `timer.*`.
    Timer,
}

impl MetricFamily {
    /// Returns the family of the given metric name, if it has a known discriminator.
    pub fn of(name: &str) -> Option<Self> {
        let (family, _) = name.split_once('.')?;
        match family {
            "counter" => Some(Self::Counter),
            "gauge" => Some(Self::Gauge),
            "timer" => Some(Self::Timer),
            _ => None,
        }
    }

    /// Returns the name segment of this family.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
            Self::Timer => "timer",
        }
    }
}

impl fmt::Display for MetricFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn deserialize_name<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let name = String::deserialize(deserializer)?;
    if name.is_empty() {
        return Err(D::Error::custom(InvalidMetricName));
    }
    Ok(name)
}

/// A named numeric observation with a timestamp.
///
/// The name is a dot-separated hierarchical identifier and never empty. Values are immutable once
/// constructed; renaming produces a new value.
///
/// On the wire, a metric is a JSON object with the timestamp in milliseconds since the UNIX epoch:
///
/// ```json
/// {"name": "counter.requests", "value": 42.0, "timestamp": 1436286483174}
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricValue {
    #[serde(deserialize_with = "deserialize_name")]
    pub(crate) name: String,
    pub(crate) value: ValueType,
    /// Missing timestamps default to the time of deserialization.
    #[serde(with = "chrono::serde::ts_milliseconds", default = "Utc::now")]
    pub(crate) timestamp: DateTime<Utc>,
}

impl MetricValue {
    /// Creates a metric observed now.
    pub fn new(name: impl Into<String>, value: ValueType) -> Result<Self, InvalidMetricName> {
        Self::with_timestamp(name, value, Utc::now())
    }

    /// Creates a metric observed at the given time.
    pub fn with_timestamp(
        name: impl Into<String>,
        value: ValueType,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, InvalidMetricName> {
        let name = name.into();
        if name.is_empty() {
            return Err(InvalidMetricName);
        }

        Ok(Self {
            name,
            value,
            timestamp,
        })
    }

    /// Returns the fully qualified name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the reading.
    pub fn value(&self) -> ValueType {
        self.value
    }

    /// Returns the time of observation.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Returns `true` if the name starts with [`COUNTER_PREFIX`].
    pub fn is_counter(&self) -> bool {
        self.name.starts_with(COUNTER_PREFIX)
    }

    /// Creates the absolute zero that resets the counter `name`, observed now.
    ///
    /// Returns `None` unless [`COUNTER_PREFIX`] occurs somewhere in `name`, which also covers
    /// counters behind a producer namespace such as `app.node1.counter.requests`.
    pub fn counter_reset(name: &str) -> Option<Self> {
        name.contains(COUNTER_PREFIX).then(|| Self {
            name: name.to_owned(),
            value: 0.0,
            timestamp: Utc::now(),
        })
    }

    /// Returns a copy of this metric with `prefix` prepended to the name.
    ///
    /// The prefix is prepended verbatim, so it must already end with a separator if one is
    /// desired. Value and timestamp are preserved.
    pub fn prefixed(&self, prefix: &str) -> Self {
        Self {
            name: format!("{prefix}{}", self.name),
            value: self.value,
            timestamp: self.timestamp,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

/// A signed change of a metric since a prior observation.
///
/// Deltas have the same shape and wire format as [`MetricValue`], but the value is an increment
/// rather than an absolute reading.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Delta(MetricValue);

impl Delta {
    /// Creates a delta observed now.
    pub fn new(name: impl Into<String>, value: ValueType) -> Result<Self, InvalidMetricName> {
        MetricValue::new(name, value).map(Self)
    }

    /// Creates a delta observed at the given time.
    pub fn with_timestamp(
        name: impl Into<String>,
        value: ValueType,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, InvalidMetricName> {
        MetricValue::with_timestamp(name, value, timestamp).map(Self)
    }

    pub(crate) fn from_metric(metric: MetricValue) -> Self {
        Self(metric)
    }

    /// Returns the fully qualified name.
    pub fn name(&self) -> &str {
        self.0.name()
    }

    /// Returns the signed increment.
    pub fn value(&self) -> ValueType {
        self.0.value()
    }

    /// Returns the time of observation.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.0.timestamp()
    }

    /// Returns the underlying metric with the increment as its value.
    pub fn as_metric(&self) -> &MetricValue {
        &self.0
    }
}

impl fmt::Display for Delta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:+}", self.name(), self.value())
    }
}
