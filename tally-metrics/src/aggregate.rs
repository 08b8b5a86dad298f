//! Re-aggregation of namespaced metrics from many producers.
//!
//! Producers publish under prefixes that identify them, for example
//! `metrics.<app>.<instance>.counter.requests`. On the consuming side these end up side by side
//! in one repository. The [`AggregateReader`] strips the identifying segments according to a
//! [`KeyPattern`] and combines all metrics that share the remaining key.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tally_statsd::metric;
use thiserror::Error;

use crate::statsd::MetricCounters;
use crate::{MetricFamily, MetricReader, MetricValue};

/// The default key pattern, discarding three leading segments.
pub const DEFAULT_KEY_PATTERN: &str = "d.d.d";

/// The default prefix of aggregated metric names.
pub const DEFAULT_AGGREGATE_PREFIX: &str = "aggregate.";

/// An error returned when parsing a [`KeyPattern`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("invalid key pattern token `{token}`, expected `k` or `d`")]
pub struct InvalidKeyPattern {
    token: String,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Segment {
    Keep,
    Discard,
}

/// Selects which leading name segments make up the aggregation key.
///
/// A pattern is a dot-separated list of `k` (keep) and `d` (discard) tokens, applied to the first
/// segments of a metric name. All segments beyond the pattern are always kept.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KeyPattern(Vec<Segment>);

impl KeyPattern {
    /// Returns the aggregation key for a metric name.
    ///
    /// Returns `None` if the name has fewer segments than the pattern, or if nothing remains after
    /// discarding.
    pub fn key_for(&self, name: &str) -> Option<String> {
        let segments: Vec<&str> = name.split('.').collect();
        if segments.len() < self.0.len() {
            return None;
        }

        let kept = segments
            .iter()
            .zip(&self.0)
            .filter(|(_, rule)| **rule == Segment::Keep)
            .map(|(segment, _)| *segment);

        let key = kept
            .chain(segments[self.0.len()..].iter().copied())
            .collect::<Vec<_>>()
            .join(".");

        (!key.is_empty()).then_some(key)
    }
}

impl Default for KeyPattern {
    fn default() -> Self {
        Self(vec![Segment::Discard; 3])
    }
}

impl FromStr for KeyPattern {
    type Err = InvalidKeyPattern;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split('.')
            .map(|token| match token {
                "k" => Ok(Segment::Keep),
                "d" => Ok(Segment::Discard),
                _ => Err(InvalidKeyPattern {
                    token: token.to_owned(),
                }),
            })
            .collect::<Result<_, _>>()
            .map(Self)
    }
}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, segment) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(".")?;
            }
            f.write_str(match segment {
                Segment::Keep => "k",
                Segment::Discard => "d",
            })?;
        }
        Ok(())
    }
}

/// Configuration for the [`AggregateReader`].
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct AggregateConfig {
    /// Prefix of aggregated metric names.
    pub prefix: String,
    /// The [`KeyPattern`] applied to source metric names.
    pub key_pattern: String,
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_AGGREGATE_PREFIX.to_owned(),
            key_pattern: DEFAULT_KEY_PATTERN.to_owned(),
        }
    }
}

/// Presents cross-producer aggregates of the metrics in a source reader.
///
/// Metrics whose key starts with `counter.` are summed. For all other metrics, the value with the
/// latest timestamp wins. Aggregates are computed on every read.
#[derive(Debug)]
pub struct AggregateReader<R> {
    source: R,
    pattern: KeyPattern,
    prefix: String,
}

impl<R> AggregateReader<R>
where
    R: MetricReader,
{
    /// Creates an aggregate reader with the default pattern and prefix.
    pub fn new(source: R) -> Self {
        Self {
            source,
            pattern: KeyPattern::default(),
            prefix: DEFAULT_AGGREGATE_PREFIX.to_owned(),
        }
    }

    /// Creates an aggregate reader from configuration.
    pub fn from_config(source: R, config: &AggregateConfig) -> Result<Self, InvalidKeyPattern> {
        Ok(Self {
            source,
            pattern: config.key_pattern.parse()?,
            prefix: config.prefix.clone(),
        })
    }

    /// Replaces the key pattern.
    pub fn with_key_pattern(mut self, pattern: KeyPattern) -> Self {
        self.pattern = pattern;
        self
    }

    /// Replaces the output prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    fn aggregate(&self) -> BTreeMap<String, MetricValue> {
        let mut aggregates = BTreeMap::new();

        for metric in self.source.find_all() {
            let Some(key) = self.pattern.key_for(metric.name()) else {
                metric!(counter(MetricCounters::AggregateSkipped) += 1);
                continue;
            };

            let is_counter = MetricFamily::of(&key) == Some(MetricFamily::Counter);
            match aggregates.entry(key) {
                Entry::Vacant(entry) => {
                    let name = format!("{}{}", self.prefix, entry.key());
                    entry.insert(MetricValue {
                        name,
                        value: metric.value(),
                        timestamp: metric.timestamp(),
                    });
                }
                Entry::Occupied(mut entry) => {
                    let aggregate: &mut MetricValue = entry.get_mut();
                    if is_counter {
                        aggregate.value += metric.value();
                        aggregate.timestamp = aggregate.timestamp.max(metric.timestamp());
                    } else if metric.timestamp() > aggregate.timestamp {
                        aggregate.value = metric.value();
                        aggregate.timestamp = metric.timestamp();
                    }
                }
            }
        }

        aggregates
    }
}

impl<R> MetricReader for AggregateReader<R>
where
    R: MetricReader,
{
    fn find_one(&self, name: &str) -> Option<MetricValue> {
        let key = name.strip_prefix(self.prefix.as_str())?;
        self.aggregate().remove(key)
    }

    fn find_all(&self) -> Vec<MetricValue> {
        self.aggregate().into_values().collect()
    }

    fn count(&self) -> usize {
        self.aggregate().len()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use similar_asserts::assert_eq;

    use super::*;
    use crate::{InMemoryRepository, MetricSink};

    fn record(repository: &InMemoryRepository, name: &str, value: f64, millis: i64) {
        let timestamp = Utc.timestamp_millis_opt(millis).unwrap();
        repository
            .record(&MetricValue::with_timestamp(name, value, timestamp).unwrap())
            .unwrap();
    }

    #[test]
    fn test_parse_key_pattern() {
        let pattern: KeyPattern = "k.d.k".parse().unwrap();
        assert_eq!(pattern.to_string(), "k.d.k");
        assert_eq!(KeyPattern::default().to_string(), DEFAULT_KEY_PATTERN);

        let error = "k.x".parse::<KeyPattern>().unwrap_err();
        assert_eq!(
            error.to_string(),
            "invalid key pattern token `x`, expected `k` or `d`"
        );
        assert!("".parse::<KeyPattern>().is_err());
    }

    #[test]
    fn test_key_for() {
        let pattern: KeyPattern = "d.k.d".parse().unwrap();
        assert_eq!(
            pattern.key_for("metrics.app.host1.counter.foo").as_deref(),
            Some("app.counter.foo")
        );
        assert_eq!(pattern.key_for("metrics.app"), None);
        assert_eq!(pattern.key_for("metrics.app.host1").as_deref(), Some("app"));

        let discard_all: KeyPattern = "d.d".parse().unwrap();
        assert_eq!(discard_all.key_for("a.b"), None);
    }

    #[test]
    fn test_counters_are_summed() {
        let repository = InMemoryRepository::new();
        record(&repository, "metrics.app.one.counter.requests", 3.0, 1000);
        record(&repository, "metrics.app.two.counter.requests", 4.0, 2000);

        let reader = AggregateReader::new(&repository);
        let aggregate = reader.find_one("aggregate.counter.requests").unwrap();

        assert_eq!(aggregate.name(), "aggregate.counter.requests");
        assert_eq!(aggregate.value(), 7.0);
        assert_eq!(aggregate.timestamp().timestamp_millis(), 2000);
    }

    #[test]
    fn test_gauges_take_latest() {
        let repository = InMemoryRepository::new();
        record(&repository, "metrics.app.one.gauge.heap", 10.0, 3000);
        record(&repository, "metrics.app.two.gauge.heap", 20.0, 1000);

        let reader = AggregateReader::new(&repository);
        assert_eq!(reader.find_one("aggregate.gauge.heap").unwrap().value(), 10.0);
    }

    #[test]
    fn test_custom_prefix_and_family() {
        let repository = InMemoryRepository::new();
        record(&repository, "metrics.app.one.gauge.counter.depth", 5.0, 1000);
        record(&repository, "metrics.app.two.gauge.counter.depth", 6.0, 2000);

        let reader = AggregateReader::new(&repository).with_prefix("cluster.");
        let aggregate = reader.find_one("cluster.gauge.counter.depth").unwrap();

        // Only the leading segment of the key decides the family.
        assert_eq!(aggregate.value(), 6.0);
        assert!(reader.find_one("aggregate.gauge.counter.depth").is_none());
    }

    #[test]
    fn test_short_names_are_skipped() {
        let repository = InMemoryRepository::new();
        record(&repository, "gauge.heap", 1.0, 0);
        record(&repository, "metrics.app.one.gauge.heap", 2.0, 0);

        let reader = AggregateReader::new(&repository);
        assert_eq!(reader.count(), 1);
    }

    #[test]
    fn test_from_config() {
        let repository = InMemoryRepository::new();
        record(&repository, "metrics.app.one.counter.x", 1.0, 0);
        record(&repository, "metrics.web.one.counter.x", 1.0, 0);

        let config: AggregateConfig =
            serde_yaml::from_str("key_pattern: d.k.d\nprefix: agg.").unwrap();
        let reader = AggregateReader::from_config(&repository, &config).unwrap();

        let names: Vec<_> = reader
            .find_all()
            .into_iter()
            .map(|m| m.name().to_owned())
            .collect();
        assert_eq!(names, ["agg.app.counter.x", "agg.web.counter.x"]);
        assert!(reader.find_one("aggregate.app.counter.x").is_none());
    }

    #[test]
    fn test_default_config() {
        let config = AggregateConfig::default();
        assert_eq!(config.prefix, "aggregate.");
        assert_eq!(config.key_pattern, "d.d.d");
    }
}
