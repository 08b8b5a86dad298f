use tally_log::LogError;
use tally_metrics::{Delta, MetricSink, MetricValue};
use tally_statsd::metric;

use crate::client::{BusClient, ProducerError};
use crate::config::ExportConfig;
use crate::envelope::{Headers, Message};
use crate::routing::RoutingContext;
use crate::statsd::{BusCounters, BusDistributions};

/// A [`MetricSink`] publishing every write to a message bus.
///
/// Each message is published to the configured exchange under the routing key
/// `<prefix>.<metric name>`. Unless disabled, the headers `metric.name` and `metric.prefix` plus
/// all fixed headers of the [`RoutingContext`] are attached.
///
/// Publishing is synchronous. Failures are returned to the caller without retry.
#[derive(Debug)]
pub struct BrokerSink<C> {
    client: C,
    routing: RoutingContext,
    add_headers: bool,
}

impl<C> BrokerSink<C>
where
    C: BusClient,
{
    /// Creates a sink publishing through `client` with headers enabled.
    pub fn new(client: C, routing: RoutingContext) -> Self {
        Self {
            client,
            routing,
            add_headers: true,
        }
    }

    /// Creates a sink from the export configuration.
    pub fn from_config(client: C, config: &ExportConfig) -> Self {
        Self::new(client, RoutingContext::from_config(config)).add_headers(config.add_headers)
    }

    /// Enables or disables all message headers.
    pub fn add_headers(mut self, enabled: bool) -> Self {
        self.add_headers = enabled;
        self
    }

    /// Returns the routing context of this sink.
    pub fn routing(&self) -> &RoutingContext {
        &self.routing
    }

    /// Returns the underlying bus client.
    pub fn client(&self) -> &C {
        &self.client
    }

    fn publish(&self, message: &impl Message) -> Result<(), ProducerError> {
        let payload = message.serialize().inspect_err(|error| {
            tally_log::error!("failed to encode {}: {}", message.variant(), LogError(error));
        })?;
        metric!(
            distribution(BusDistributions::MessageSize) = payload.len() as u64,
            variant = message.variant()
        );

        let routing_key = self.routing.routing_key(message.name());
        let headers = if self.add_headers {
            self.routing.headers_for(message.name())
        } else {
            Headers::new()
        };

        let result = self
            .client
            .publish(self.routing.exchange(), &routing_key, &payload, &headers);

        if let Err(ref error) = result {
            tally_log::error!(
                routing_key = routing_key.as_str(),
                "failed to publish {}: {}",
                message.variant(),
                LogError(error)
            );
            metric!(
                counter(BusCounters::PublishError) += 1,
                variant = message.variant()
            );
        } else {
            metric!(
                counter(BusCounters::MessagePublished) += 1,
                variant = message.variant(),
                channel = "sink"
            );
        }

        Ok(result?)
    }
}

impl<C> MetricSink for BrokerSink<C>
where
    C: BusClient,
{
    type Error = ProducerError;

    fn record(&self, value: &MetricValue) -> Result<(), Self::Error> {
        self.publish(value)
    }

    fn increment(&self, delta: &Delta) -> Result<(), Self::Error> {
        self.publish(delta)
    }

    /// Publishes an absolute zero for counters. Other metrics cannot be reset.
    fn reset(&self, name: &str) -> Result<(), Self::Error> {
        match MetricValue::counter_reset(name) {
            Some(zero) => self.publish(&zero),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use similar_asserts::assert_eq;
    use tally_statsd::with_capturing_test_client;

    use super::*;
    use crate::client::CapturingClient;

    fn sink(prefix: Option<&str>) -> BrokerSink<CapturingClient> {
        let mut fixed = Headers::new();
        fixed.insert("region".to_owned(), "eu".to_owned());
        BrokerSink::new(
            CapturingClient::new(),
            RoutingContext::new("metrics", prefix, fixed),
        )
    }

    #[test]
    fn test_record_publishes_with_headers() {
        let sink = sink(Some("app.node1."));
        let timestamp = Utc.timestamp_millis_opt(1436286483174).unwrap();
        let metric = MetricValue::with_timestamp("gauge.cpu", 0.5, timestamp).unwrap();
        sink.record(&metric).unwrap();

        let envelopes = sink.client().envelopes();
        assert_eq!(envelopes.len(), 1);

        let envelope = &envelopes[0];
        assert_eq!(envelope.destination, "metrics");
        assert_eq!(envelope.routing_key, "app.node1.gauge.cpu");
        assert_eq!(envelope.metric().unwrap(), metric);

        let headers: Vec<_> = envelope
            .headers
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        assert_eq!(
            headers,
            [
                ("metric.name", "gauge.cpu"),
                ("metric.prefix", "app.node1"),
                ("region", "eu"),
            ]
        );
    }

    #[test]
    fn test_headers_disabled() {
        let sink = sink(Some("app")).add_headers(false);
        sink.increment(&Delta::new("counter.foo", 1.0).unwrap()).unwrap();

        let envelopes = sink.client().envelopes();
        assert_eq!(envelopes[0].routing_key, "app.counter.foo");
        assert!(envelopes[0].headers.is_empty());
    }

    #[test]
    fn test_default_prefix() {
        let sink = sink(None);
        sink.record(&MetricValue::new("gauge.cpu", 1.0).unwrap()).unwrap();

        let envelope = &sink.client().envelopes()[0];
        assert_eq!(envelope.routing_key, "metrics.gauge.cpu");
        assert_eq!(envelope.headers["metric.prefix"], "metrics");
    }

    #[test]
    fn test_reset_counter_publishes_zero() {
        let sink = sink(Some("app"));
        sink.reset("counter.foo").unwrap();

        let envelopes = sink.client().envelopes();
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0].routing_key, "app.counter.foo");

        let metric = envelopes[0].metric().unwrap();
        assert_eq!(metric.name(), "counter.foo");
        assert_eq!(metric.value(), 0.0);
    }

    #[test]
    fn test_reset_matches_anywhere_in_name() {
        let sink = sink(Some("app"));
        sink.reset("service.counter.foo").unwrap();
        assert_eq!(sink.client().envelopes().len(), 1);
    }

    #[test]
    fn test_reset_gauge_is_noop() {
        let sink = sink(Some("app"));
        sink.reset("gauge.foo").unwrap();
        sink.reset("").unwrap();
        assert!(sink.client().envelopes().is_empty());
    }

    #[test]
    fn test_non_finite_value_fails_on_publish() {
        let sink = sink(Some("app"));
        let error = sink
            .record(&MetricValue::new("gauge.ratio", f64::NAN).unwrap())
            .unwrap_err();

        assert!(matches!(error, ProducerError::NonFiniteValue(_)));
        assert!(sink.client().envelopes().is_empty());
    }

    #[test]
    fn test_publish_failure_propagates() {
        let sink = BrokerSink::new(
            CapturingClient::failing("broker unavailable"),
            RoutingContext::new("metrics", Some("app"), Headers::new()),
        );

        let captures = with_capturing_test_client(|| {
            let error = sink
                .record(&MetricValue::new("gauge.cpu", 1.0).unwrap())
                .unwrap_err();
            assert!(matches!(error, ProducerError::SendFailed(_)));
        });

        assert!(captures.contains(&"bus.publish.error:1|c|#variant:metric".to_owned()));
    }

    #[test]
    fn test_publish_metrics() {
        let sink = sink(Some("app"));
        let captures = with_capturing_test_client(|| {
            sink.increment(&Delta::new("counter.foo", 2.0).unwrap()).unwrap();
        });

        assert_eq!(captures.len(), 2);
        assert!(captures[0].starts_with("bus.message.size:"));
        assert!(captures[0].ends_with("|d|#variant:delta"));
        assert_eq!(
            captures[1],
            "bus.message.published:1|c|#variant:delta,channel:sink"
        );
    }

    #[test]
    fn test_from_config() {
        let config: ExportConfig = serde_yaml::from_str(
            "exchange: telemetry\nprefix: node1\nadd_headers: false",
        )
        .unwrap();
        let sink = BrokerSink::from_config(CapturingClient::new(), &config);
        sink.record(&MetricValue::new("gauge.cpu", 1.0).unwrap()).unwrap();

        let envelope = &sink.client().envelopes()[0];
        assert_eq!(envelope.destination, "telemetry");
        assert_eq!(envelope.routing_key, "node1.gauge.cpu");
        assert!(envelope.headers.is_empty());
    }
}
