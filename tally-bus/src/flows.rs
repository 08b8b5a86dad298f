//! Channel-style aggregation flows.
//!
//! A lighter alternative to the [`BrokerSink`](crate::BrokerSink) and
//! [`BrokerListener`](crate::BrokerListener) pair. The outbound side publishes every metric with an
//! empty routing key and a single `metricPrefix` header identifying the producer. The inbound side
//! prepends that header to the metric name before handing it to a local sink, typically an
//! [`InMemoryRepository`](tally_metrics::InMemoryRepository) read through an
//! [`AggregateReader`](tally_metrics::AggregateReader).

use tally_log::LogError;
use tally_metrics::{Delta, MetricSink, MetricValue};
use tally_statsd::metric;

use crate::client::{BusClient, ProducerError};
use crate::config::FlowConfig;
use crate::envelope::{Headers, Message};
use crate::listener::ListenerError;
use crate::routing::SEPARATOR;
use crate::statsd::{BusCounters, BusDistributions};

/// Header carrying the producer prefix in aggregation flows.
pub const HEADER_FLOW_PREFIX: &str = "metricPrefix";

/// Publishes metrics tagged with the producer prefix.
///
/// Resets are not supported and silently ignored.
#[derive(Debug)]
pub struct OutboundFlow<C> {
    client: C,
    exchange: String,
    headers: Headers,
}

impl<C> OutboundFlow<C>
where
    C: BusClient,
{
    /// Creates a flow publishing to `exchange` with the given producer prefix.
    pub fn new(client: C, exchange: impl Into<String>, metric_prefix: impl Into<String>) -> Self {
        let mut headers = Headers::new();
        headers.insert(HEADER_FLOW_PREFIX.to_owned(), metric_prefix.into());

        Self {
            client,
            exchange: exchange.into(),
            headers,
        }
    }

    /// Creates a flow from configuration.
    pub fn from_config(client: C, config: &FlowConfig) -> Self {
        Self::new(client, config.exchange.as_str(), config.metric_prefix.as_str())
    }

    /// Returns the underlying bus client.
    pub fn client(&self) -> &C {
        &self.client
    }

    fn send(&self, message: &impl Message) -> Result<(), ProducerError> {
        let payload = message.serialize()?;
        metric!(
            distribution(BusDistributions::MessageSize) = payload.len() as u64,
            variant = message.variant()
        );

        self.client
            .publish(&self.exchange, "", &payload, &self.headers)
            .map_err(|error| {
                tally_log::error!("failed to publish {}: {}", message.variant(), LogError(&error));
                metric!(
                    counter(BusCounters::PublishError) += 1,
                    variant = message.variant()
                );
                error
            })?;

        metric!(
            counter(BusCounters::MessagePublished) += 1,
            variant = message.variant(),
            channel = "flow"
        );
        Ok(())
    }
}

impl<C> MetricSink for OutboundFlow<C>
where
    C: BusClient,
{
    type Error = ProducerError;

    fn record(&self, value: &MetricValue) -> Result<(), Self::Error> {
        self.send(value)
    }

    fn increment(&self, delta: &Delta) -> Result<(), Self::Error> {
        self.send(delta)
    }

    fn reset(&self, name: &str) -> Result<(), Self::Error> {
        tally_log::trace!(metric = name, "ignoring reset, not supported by aggregation flows");
        Ok(())
    }
}

/// Receives metrics from an [`OutboundFlow`] and records them under the producer prefix.
#[derive(Debug)]
pub struct InboundFlow<S> {
    sink: S,
}

impl<S> InboundFlow<S>
where
    S: MetricSink,
{
    /// Creates a flow forwarding to `sink`.
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    /// Returns the local sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Renames `metric` to `<metricPrefix>.<name>`.
    ///
    /// Without a `metricPrefix` header, the metric is returned unchanged.
    pub fn enrich(&self, metric: MetricValue, headers: &Headers) -> MetricValue {
        match headers.get(HEADER_FLOW_PREFIX) {
            Some(prefix) => {
                metric!(counter(BusCounters::MessageReceived) += 1, prefix = "header");
                metric.prefixed(&format!("{prefix}{SEPARATOR}"))
            }
            None => {
                metric!(counter(BusCounters::MessageReceived) += 1, prefix = "default");
                metric
            }
        }
    }

    /// Decodes a raw message, enriches it and records it in the local sink.
    pub fn on_message(
        &self,
        payload: &[u8],
        headers: &Headers,
    ) -> Result<(), ListenerError<S::Error>> {
        let metric: MetricValue = serde_json::from_slice(payload).map_err(|error| {
            metric!(counter(BusCounters::InvalidPayload) += 1);
            ListenerError::InvalidPayload(error)
        })?;

        self.sink
            .record(&self.enrich(metric, headers))
            .map_err(ListenerError::Forward)
    }
}
