//! Configuration primitives for publishing and consuming metrics.
//!
//! - [`ExportConfig`] configures the [`BrokerSink`](crate::BrokerSink) on the producing side.
//! - [`ListenerConfig`] configures the [`BrokerListener`](crate::BrokerListener) on the consuming
//!   side.
//! - [`FlowConfig`] configures the [`OutboundFlow`](crate::OutboundFlow).
//! - [`KafkaConfigParam`] lists raw producer settings for the Kafka client.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The exchange metrics are published to unless configured otherwise.
pub const DEFAULT_EXCHANGE: &str = "metrics";

fn default_exchange() -> String {
    DEFAULT_EXCHANGE.to_owned()
}

/// Configuration of the broker-backed sink.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ExportConfig {
    /// The exchange or topic all metrics are published to.
    pub exchange: String,
    /// Prefix of routing keys.
    ///
    /// Trailing dots are ignored. If missing or empty, [`DEFAULT_PREFIX`](crate::DEFAULT_PREFIX)
    /// is used.
    pub prefix: Option<String>,
    /// Attach `metric.name`, `metric.prefix` and the fixed [`headers`](Self::headers) to every
    /// message.
    pub add_headers: bool,
    /// Fixed headers added to every message if [`add_headers`](Self::add_headers) is enabled.
    pub headers: BTreeMap<String, String>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            exchange: default_exchange(),
            prefix: None,
            add_headers: true,
            headers: BTreeMap::new(),
        }
    }
}

/// Configuration of the broker listener.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Prefix applied to metrics that arrive without a `metric.prefix` header.
    ///
    /// An empty prefix forwards names unchanged.
    pub default_prefix: String,
}

/// Configuration of the outbound aggregation flow.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FlowConfig {
    /// The exchange or topic all metrics are published to.
    pub exchange: String,
    /// Producer prefix sent in the `metricPrefix` header.
    pub metric_prefix: String,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            exchange: default_exchange(),
            metric_prefix: String::new(),
        }
    }
}

/// A name value pair of Kafka config parameter.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct KafkaConfigParam {
    /// Name of the Kafka config parameter.
    pub name: String,
    /// Value of the Kafka config parameter.
    pub value: String,
}
