use hashbrown::HashMap;
use parking_lot::Mutex;
use tally_statsd::metric;

use crate::statsd::{MetricCounters, MetricGauges};
use crate::{Delta, MetricSink, MetricValue};

/// Converts absolute counter readings into deltas for sinks that only understand increments.
///
/// Every metric whose name starts with `counter.` is compared against the last reading seen for
/// that name. The first reading is forwarded as a delta of its full value; later readings are
/// forwarded as the difference to the previous one, computed on the integer-truncated values.
/// All other metrics pass through to [`MetricSink::record`] unchanged.
///
/// Resets are not supported and silently ignored.
#[derive(Debug)]
pub struct CounterDeltaTracker<S> {
    downstream: S,
    last_values: Mutex<HashMap<String, MetricValue>>,
}

impl<S> CounterDeltaTracker<S> {
    /// Creates a tracker forwarding to `downstream`.
    pub fn new(downstream: S) -> Self {
        Self {
            downstream,
            last_values: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the sink receiving deltas and pass-through values.
    pub fn downstream(&self) -> &S {
        &self.downstream
    }

    /// Derives the delta for a counter reading and remembers the reading as the new baseline.
    ///
    /// Returns `None` for metrics outside the counter family, which leaves the cache untouched.
    pub fn derive_delta(&self, value: &MetricValue) -> Option<Delta> {
        if !value.is_counter() {
            return None;
        }

        let current = value.value() as i64;

        // Lookup and update happen under one lock, so concurrent readings of the same counter
        // never compute against the same baseline.
        let mut last_values = self.last_values.lock();
        let (delta, first) = match last_values.get_mut(value.name()) {
            Some(last) => {
                let delta = current.wrapping_sub(last.value() as i64);
                *last = value.clone();
                (delta, false)
            }
            None => {
                last_values.insert(value.name().to_owned(), value.clone());
                (current, true)
            }
        };
        let tracked = last_values.len();
        drop(last_values);

        metric!(
            counter(MetricCounters::DeltaDerived) += 1,
            first = if first { "true" } else { "false" }
        );
        metric!(gauge(MetricGauges::TrackedCounters) = tracked as u64);

        Some(Delta::from_metric(MetricValue {
            name: value.name().to_owned(),
            value: delta as f64,
            timestamp: value.timestamp(),
        }))
    }
}

impl<S> MetricSink for CounterDeltaTracker<S>
where
    S: MetricSink,
{
    type Error = S::Error;

    fn record(&self, value: &MetricValue) -> Result<(), Self::Error> {
        match self.derive_delta(value) {
            Some(delta) => self.downstream.increment(&delta),
            None => self.downstream.record(value),
        }
    }

    fn increment(&self, delta: &Delta) -> Result<(), Self::Error> {
        self.downstream.increment(delta)
    }

    fn reset(&self, name: &str) -> Result<(), Self::Error> {
        tally_log::trace!(metric = name, "ignoring reset, not supported by delta tracking");
        Ok(())
    }
}
