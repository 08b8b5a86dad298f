use tally_statsd::{CounterMetric, GaugeMetric};

/// Counter metrics for Tally Metrics.
pub enum MetricCounters {
    /// Incremented for every write into the in-memory repository.
    ///
    /// This metric is tagged with:
    /// - `op`: `record`, `increment` or `reset`.
    RepositoryWrite,

    /// Incremented every time the counter-delta tracker derives a delta.
    ///
    /// This metric is tagged with:
    /// - `first`: `true` if this was the first observation of the counter.
    DeltaDerived,

    /// Incremented for source metrics the aggregate reader cannot map to a key because their name
    /// has fewer segments than the key pattern.
    AggregateSkipped,
}

impl CounterMetric for MetricCounters {
    fn name(&self) -> &'static str {
        match *self {
            Self::RepositoryWrite => "metrics.repository.write",
            Self::DeltaDerived => "metrics.delta.derived",
            Self::AggregateSkipped => "metrics.aggregate.skipped",
        }
    }
}

/// Gauge metrics for Tally Metrics.
pub enum MetricGauges {
    /// The number of counters with a cached last value in the counter-delta tracker.
    TrackedCounters,
}

impl GaugeMetric for MetricGauges {
    fn name(&self) -> &'static str {
        match *self {
            Self::TrackedCounters => "metrics.delta.tracked",
        }
    }
}
