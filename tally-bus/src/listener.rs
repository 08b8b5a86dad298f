use tally_log::LogError;
use tally_metrics::{MetricSink, MetricValue};
use tally_statsd::metric;
use thiserror::Error;

use crate::config::ListenerConfig;
use crate::envelope::{HEADER_METRIC_PREFIX, Headers};
use crate::routing::SEPARATOR;
use crate::statsd::BusCounters;

/// Errors returned by [`BrokerListener::on_message`].
#[derive(Debug, Error)]
pub enum ListenerError<E> {
    /// The payload is not a valid metric.
    #[error("failed to decode metric payload")]
    InvalidPayload(#[source] serde_json::Error),

    /// The local sink rejected the metric.
    #[error("failed to forward metric to the local sink")]
    Forward(#[source] E),
}

/// Receives published metrics and writes them to a local sink under their namespaced name.
///
/// The namespace is taken from the `metric.prefix` header set by the
/// [`BrokerSink`](crate::BrokerSink). Messages without the header use the configured default
/// prefix.
#[derive(Debug)]
pub struct BrokerListener<S> {
    sink: S,
    default_prefix: String,
}

impl<S> BrokerListener<S>
where
    S: MetricSink,
{
    /// Creates a listener that forwards names of messages without a prefix header unchanged.
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            default_prefix: String::new(),
        }
    }

    /// Creates a listener from configuration.
    pub fn from_config(sink: S, config: &ListenerConfig) -> Self {
        Self::new(sink).default_prefix(&config.default_prefix)
    }

    /// Sets the prefix for messages without a prefix header.
    ///
    /// A separator is appended unless the prefix is empty or already ends with one.
    pub fn default_prefix(mut self, prefix: &str) -> Self {
        self.default_prefix = if prefix.is_empty() || prefix.ends_with(SEPARATOR) {
            prefix.to_owned()
        } else {
            format!("{prefix}{SEPARATOR}")
        };
        self
    }

    /// Returns the local sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Records `metric` in the local sink under its namespaced name.
    ///
    /// The namespace is `prefix_header` followed by a separator, or the default prefix if the
    /// header is absent. Value and timestamp are preserved.
    pub fn process(
        &self,
        metric: &MetricValue,
        prefix_header: Option<&str>,
    ) -> Result<(), S::Error> {
        let namespaced = match prefix_header {
            Some(prefix) => {
                metric!(counter(BusCounters::MessageReceived) += 1, prefix = "header");
                metric.prefixed(&format!("{prefix}{SEPARATOR}"))
            }
            None => {
                metric!(counter(BusCounters::MessageReceived) += 1, prefix = "default");
                metric.prefixed(&self.default_prefix)
            }
        };

        tally_log::trace!(metric = %namespaced, "received metric");
        self.sink.record(&namespaced)
    }

    /// Decodes a raw message and passes it to [`process`](Self::process).
    pub fn on_message(
        &self,
        payload: &[u8],
        headers: &Headers,
    ) -> Result<(), ListenerError<S::Error>> {
        let metric: MetricValue = serde_json::from_slice(payload).map_err(|error| {
            metric!(counter(BusCounters::InvalidPayload) += 1);
            tally_log::warn!("dropping undecodable metric: {}", LogError(&error));
            ListenerError::InvalidPayload(error)
        })?;

        let prefix = headers.get(HEADER_METRIC_PREFIX).map(String::as_str);
        self.process(&metric, prefix).map_err(ListenerError::Forward)
    }
}

#[cfg(test)]
mod tests {
    use std::fmt;

    use chrono::{TimeZone, Utc};
    use similar_asserts::assert_eq;
    use tally_metrics::{Delta, InMemoryRepository, MetricReader};

    use super::*;

    fn metric(name: &str, value: f64) -> MetricValue {
        let timestamp = Utc.timestamp_millis_opt(1436286483174).unwrap();
        MetricValue::with_timestamp(name, value, timestamp).unwrap()
    }

    #[test]
    fn test_process_with_header() {
        let listener = BrokerListener::new(InMemoryRepository::new());
        listener.process(&metric("x", 1.0), Some("a")).unwrap();

        let stored = listener.sink().find_one("a.x").unwrap();
        assert_eq!(stored, metric("a.x", 1.0));
    }

    #[test]
    fn test_process_default_prefix() {
        let listener = BrokerListener::new(InMemoryRepository::new()).default_prefix("local");
        listener.process(&metric("gauge.cpu", 0.5), None).unwrap();

        assert_eq!(listener.sink().names(), ["local.gauge.cpu"]);
    }

    #[test]
    fn test_default_prefix_normalization() {
        let listener = BrokerListener::new(InMemoryRepository::new()).default_prefix("local.");
        listener.process(&metric("x", 1.0), None).unwrap();
        assert_eq!(listener.sink().names(), ["local.x"]);

        let listener = BrokerListener::new(InMemoryRepository::new()).default_prefix("");
        listener.process(&metric("x", 1.0), None).unwrap();
        assert_eq!(listener.sink().names(), ["x"]);
    }

    #[test]
    fn test_on_message() {
        let listener = BrokerListener::new(InMemoryRepository::new());
        let mut headers = Headers::new();
        headers.insert("metric.prefix".to_owned(), "app.node1".to_owned());

        listener
            .on_message(
                br#"{"name":"counter.requests","value":3,"timestamp":1000}"#,
                &headers,
            )
            .unwrap();

        let stored = listener.sink().find_one("app.node1.counter.requests").unwrap();
        assert_eq!(stored.value(), 3.0);
        assert_eq!(stored.timestamp().timestamp_millis(), 1000);
    }

    #[test]
    fn test_delta_is_recorded_as_absolute() {
        let listener = BrokerListener::new(InMemoryRepository::new());
        listener
            .process(&metric("counter.requests", 10.0), Some("app.node1"))
            .unwrap();

        let mut headers = Headers::new();
        headers.insert("metric.prefix".to_owned(), "app.node1".to_owned());
        let delta = Delta::new("counter.requests", 2.0).unwrap();
        listener
            .on_message(&serde_json::to_vec(&delta).unwrap(), &headers)
            .unwrap();

        let stored = listener.sink().find_one("app.node1.counter.requests").unwrap();
        assert_eq!(stored.value(), 2.0);
        assert_eq!(listener.sink().count(), 1);
    }

    #[test]
    fn test_on_message_invalid_payload() {
        let listener = BrokerListener::new(InMemoryRepository::new());
        let error = listener.on_message(b"not json", &Headers::new()).unwrap_err();

        assert!(matches!(error, ListenerError::InvalidPayload(_)));
        assert_eq!(listener.sink().count(), 0);
    }

    #[derive(Debug)]
    struct Rejected;

    impl fmt::Display for Rejected {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("rejected")
        }
    }

    impl std::error::Error for Rejected {}

    struct RejectingSink;

    impl MetricSink for RejectingSink {
        type Error = Rejected;

        fn record(&self, _value: &MetricValue) -> Result<(), Self::Error> {
            Err(Rejected)
        }

        fn increment(&self, _delta: &Delta) -> Result<(), Self::Error> {
            Err(Rejected)
        }

        fn reset(&self, _name: &str) -> Result<(), Self::Error> {
            Err(Rejected)
        }
    }

    #[test]
    fn test_forward_failure() {
        let listener = BrokerListener::new(RejectingSink);
        let error = listener
            .on_message(br#"{"name":"x","value":1}"#, &Headers::new())
            .unwrap_err();

        assert_eq!(
            LogError(&error).to_string(),
            "failed to forward metric to the local sink\n  caused by: rejected"
        );
    }
}
