//! Publishing and consuming metrics over a message bus.
//!
//! The producing side wraps a [`BusClient`] in a [`BrokerSink`], which implements
//! [`MetricSink`](tally_metrics::MetricSink) and publishes every write as a JSON message. The
//! consuming side hands raw messages to a [`BrokerListener`], which restores the producer's
//! namespace from the message headers and records the metric in a local sink.
//!
//! # Routing
//!
//! Messages are published to a single exchange under the routing key `<prefix>.<metric name>`.
//! The prefix identifies the producer and is normalized by [`normalize_prefix`]. With headers
//! enabled, every message also carries:
//!
//!  - `metric.name`: the metric name without prefix.
//!  - `metric.prefix`: the normalized prefix without trailing separator.
//!  - all fixed headers from the [`ExportConfig`].
//!
//! # Usage
//!
//! ```
//! use tally_bus::{BrokerListener, BrokerSink, CapturingClient, RoutingContext};
//! use tally_metrics::{InMemoryRepository, MetricReader, MetricSink, MetricValue};
//!
//! let client = CapturingClient::new();
//! let sink = BrokerSink::new(&client, RoutingContext::new("metrics", Some("app.node1"), Default::default()));
//! sink.record(&MetricValue::new("gauge.heap", 42.0).unwrap()).unwrap();
//!
//! let listener = BrokerListener::new(InMemoryRepository::new());
//! for envelope in client.drain() {
//!     listener.on_message(&envelope.payload, &envelope.headers).unwrap();
//! }
//!
//! assert_eq!(listener.sink().find_one("app.node1.gauge.heap").unwrap().value(), 42.0);
//! ```
//!
//! With the `producer` feature enabled, [`KafkaClient`] delivers messages to Kafka.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

mod client;
mod config;
mod envelope;
mod flows;
mod listener;
#[cfg(feature = "producer")]
mod producer;
mod routing;
mod sink;
mod statsd;

pub use client::*;
pub use config::*;
pub use envelope::*;
pub use flows::*;
pub use listener::*;
#[cfg(feature = "producer")]
pub use producer::*;
pub use routing::*;
pub use sink::*;
