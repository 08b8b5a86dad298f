use std::collections::BTreeMap;

use tally_metrics::{Delta, MetricValue};

use crate::client::ProducerError;

/// Message headers, ordered by key.
pub type Headers = BTreeMap<String, String>;

/// Header carrying the name of the published metric.
pub const HEADER_METRIC_NAME: &str = "metric.name";

/// Header carrying the publisher's normalized prefix, without a trailing separator.
pub const HEADER_METRIC_PREFIX: &str = "metric.prefix";

/// Describes the type which can be published to the bus.
pub trait Message {
    /// Returns the name of the metric carried by this message.
    fn name(&self) -> &str;

    /// Returns the type of the message.
    fn variant(&self) -> &'static str;

    /// Serializes the message into its wire format.
    ///
    /// # Errors
    /// Returns [`ProducerError::NonFiniteValue`] for NaN or infinite values, which consumers
    /// could not decode, and [`ProducerError::InvalidJson`] if the serialization failed.
    fn serialize(&self) -> Result<Vec<u8>, ProducerError>;
}

fn encode(metric: &MetricValue) -> Result<Vec<u8>, ProducerError> {
    if !metric.value().is_finite() {
        return Err(ProducerError::NonFiniteValue(metric.name().to_owned()));
    }
    serde_json::to_vec(metric).map_err(ProducerError::InvalidJson)
}

impl Message for MetricValue {
    fn name(&self) -> &str {
        MetricValue::name(self)
    }

    fn variant(&self) -> &'static str {
        "metric"
    }

    fn serialize(&self) -> Result<Vec<u8>, ProducerError> {
        encode(self)
    }
}

impl Message for Delta {
    fn name(&self) -> &str {
        Delta::name(self)
    }

    fn variant(&self) -> &'static str {
        "delta"
    }

    fn serialize(&self) -> Result<Vec<u8>, ProducerError> {
        encode(self.as_metric())
    }
}

/// A message as handed to a [`BusClient`](crate::BusClient).
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    /// The exchange or topic.
    pub destination: String,
    /// Broker-level key directing the message to consumers. May be empty.
    pub routing_key: String,
    /// The serialized message.
    pub payload: Vec<u8>,
    /// Message headers.
    pub headers: Headers,
}

impl Envelope {
    /// Decodes the payload as a [`MetricValue`].
    ///
    /// Deltas share the wire format of metrics and decode the same way.
    pub fn metric(&self) -> Result<MetricValue, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }
}
