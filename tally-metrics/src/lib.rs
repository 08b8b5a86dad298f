//! Metric values, sinks and local aggregation.
//!
//! Metrics are named numeric observations with a timestamp. Names are dot-separated and the first
//! segment selects the family of the metric: `counter.*` for monotonic counts, `gauge.*` for
//! instantaneous readings and `timer.*` for durations. Only the counter family is treated
//! specially, see [`COUNTER_PREFIX`].
//!
//! # Sinks
//!
//! Everything that accepts metric writes implements [`MetricSink`]:
//!
//!  - [`InMemoryRepository`] keeps the latest value per name and applies increments in place.
//!  - [`CounterDeltaTracker`] turns absolute counter readings into deltas for sinks that only
//!    understand increments.
//!  - [`StatsdAgentSink`] forwards to a local statsd agent.
//!
//! Sinks compose by wrapping each other, and are implemented for shared references and [`Arc`]
//! so one sink can be fed from many places:
//!
//! ```
//! use std::sync::Arc;
//! use tally_metrics::{CounterDeltaTracker, InMemoryRepository, MetricReader, MetricSink, MetricValue};
//!
//! let repository = Arc::new(InMemoryRepository::new());
//! let tracker = CounterDeltaTracker::new(Arc::clone(&repository));
//!
//! tracker.record(&MetricValue::new("counter.requests", 5.0).unwrap()).unwrap();
//! tracker.record(&MetricValue::new("counter.requests", 8.0).unwrap()).unwrap();
//!
//! assert_eq!(repository.find_one("counter.requests").unwrap().value(), 8.0);
//! ```
//!
//! # Aggregation
//!
//! [`AggregateReader`] combines metrics from many producers that were published under
//! identifying prefixes into one view, summing counters and keeping the latest gauge reading.
//!
//! [`Arc`]: std::sync::Arc
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

mod agent;
mod aggregate;
mod delta;
mod protocol;
mod repository;
mod sink;
mod statsd;

pub use agent::*;
pub use aggregate::*;
pub use delta::*;
pub use protocol::*;
pub use repository::*;
pub use sink::*;
