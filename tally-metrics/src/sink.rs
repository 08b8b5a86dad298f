use std::sync::Arc;

use crate::{Delta, MetricValue};

/// A consumer of metric writes.
///
/// Sinks receive absolute readings through [`record`](Self::record) and signed changes through
/// [`increment`](Self::increment). [`reset`](Self::reset) is advisory: several sinks cannot express
/// it and treat it as a no-op, so callers must not assume it has an observable effect.
///
/// Implementations are expected to be shared across threads and therefore take `&self`.
pub trait MetricSink {
    /// The error returned when a write cannot be completed.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Writes an absolute reading.
    fn record(&self, value: &MetricValue) -> Result<(), Self::Error>;

    /// Applies a signed change.
    fn increment(&self, delta: &Delta) -> Result<(), Self::Error>;

    /// Resets the metric with the given name.
    fn reset(&self, name: &str) -> Result<(), Self::Error>;
}

impl<S> MetricSink for &S
where
    S: MetricSink + ?Sized,
{
    type Error = S::Error;

    fn record(&self, value: &MetricValue) -> Result<(), Self::Error> {
        (**self).record(value)
    }

    fn increment(&self, delta: &Delta) -> Result<(), Self::Error> {
        (**self).increment(delta)
    }

    fn reset(&self, name: &str) -> Result<(), Self::Error> {
        (**self).reset(name)
    }
}

impl<S> MetricSink for Arc<S>
where
    S: MetricSink + ?Sized,
{
    type Error = S::Error;

    fn record(&self, value: &MetricValue) -> Result<(), Self::Error> {
        (**self).record(value)
    }

    fn increment(&self, delta: &Delta) -> Result<(), Self::Error> {
        (**self).increment(delta)
    }

    fn reset(&self, name: &str) -> Result<(), Self::Error> {
        (**self).reset(name)
    }
}

/// Read access to stored metrics.
pub trait MetricReader {
    /// Returns the metric with the given name.
    fn find_one(&self, name: &str) -> Option<MetricValue>;

    /// Returns all metrics ordered by name.
    fn find_all(&self) -> Vec<MetricValue>;

    /// Returns the number of stored metrics.
    fn count(&self) -> usize;
}

impl<R> MetricReader for &R
where
    R: MetricReader + ?Sized,
{
    fn find_one(&self, name: &str) -> Option<MetricValue> {
        (**self).find_one(name)
    }

    fn find_all(&self) -> Vec<MetricValue> {
        (**self).find_all()
    }

    fn count(&self) -> usize {
        (**self).count()
    }
}

impl<R> MetricReader for Arc<R>
where
    R: MetricReader + ?Sized,
{
    fn find_one(&self, name: &str) -> Option<MetricValue> {
        (**self).find_one(name)
    }

    fn find_all(&self) -> Vec<MetricValue> {
        (**self).find_all()
    }

    fn count(&self) -> usize {
        (**self).count()
    }
}
