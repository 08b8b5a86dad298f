use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::convert::Infallible;

use parking_lot::RwLock;
use tally_statsd::metric;

use crate::statsd::MetricCounters;
use crate::{Delta, MetricReader, MetricSink, MetricValue};

/// A thread-safe, in-memory store of the latest value per metric name.
///
/// This is the local aggregation store on the consuming side of the bus. Increments are applied
/// to the stored value; a missing metric is created from the delta itself.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    metrics: RwLock<BTreeMap<String, MetricValue>>,
}

impl InMemoryRepository {
    /// Creates an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the names of all stored metrics in order.
    pub fn names(&self) -> Vec<String> {
        self.metrics.read().keys().cloned().collect()
    }
}

impl MetricSink for InMemoryRepository {
    type Error = Infallible;

    fn record(&self, value: &MetricValue) -> Result<(), Self::Error> {
        metric!(counter(MetricCounters::RepositoryWrite) += 1, op = "record");
        self.metrics
            .write()
            .insert(value.name().to_owned(), value.clone());
        Ok(())
    }

    fn increment(&self, delta: &Delta) -> Result<(), Self::Error> {
        metric!(counter(MetricCounters::RepositoryWrite) += 1, op = "increment");
        match self.metrics.write().entry(delta.name().to_owned()) {
            Entry::Occupied(mut entry) => {
                let current = entry.get_mut();
                current.value += delta.value();
                current.timestamp = delta.timestamp();
            }
            Entry::Vacant(entry) => {
                entry.insert(delta.as_metric().clone());
            }
        }
        Ok(())
    }

    fn reset(&self, name: &str) -> Result<(), Self::Error> {
        metric!(counter(MetricCounters::RepositoryWrite) += 1, op = "reset");
        self.metrics.write().remove(name);
        Ok(())
    }
}

impl MetricReader for InMemoryRepository {
    fn find_one(&self, name: &str) -> Option<MetricValue> {
        self.metrics.read().get(name).cloned()
    }

    fn find_all(&self) -> Vec<MetricValue> {
        self.metrics.read().values().cloned().collect()
    }

    fn count(&self) -> usize {
        self.metrics.read().len()
    }
}
