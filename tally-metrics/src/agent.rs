use cadence::StatsdClient;
use cadence::prelude::*;
use thiserror::Error;

use crate::{Delta, MetricSink, MetricValue};

/// An error returned when the statsd agent rejects a metric.
#[derive(Debug, Error)]
#[error("failed to send metric to statsd agent")]
pub struct AgentError(#[from] cadence::MetricError);

/// Forwards metrics to a local statsd agent.
///
/// Increments are sent as statsd counts, truncated to whole numbers. Absolute readings are sent
/// as gauges. Statsd cannot express a reset, so resets are ignored.
#[derive(Debug)]
pub struct StatsdAgentSink {
    client: StatsdClient,
}

impl StatsdAgentSink {
    /// Creates a sink sending through the given client.
    pub fn new(client: StatsdClient) -> Self {
        Self { client }
    }
}

impl MetricSink for StatsdAgentSink {
    type Error = AgentError;

    fn record(&self, value: &MetricValue) -> Result<(), Self::Error> {
        self.client.gauge(value.name(), value.value())?;
        Ok(())
    }

    fn increment(&self, delta: &Delta) -> Result<(), Self::Error> {
        self.client.count(delta.name(), delta.value() as i64)?;
        Ok(())
    }

    fn reset(&self, name: &str) -> Result<(), Self::Error> {
        tally_log::trace!(metric = name, "ignoring reset, not supported by statsd");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use cadence::SpyMetricSink;
    use similar_asserts::assert_eq;

    use super::*;
    use crate::CounterDeltaTracker;

    fn sent(rx: &crossbeam_channel::Receiver<Vec<u8>>) -> Vec<String> {
        rx.try_iter()
            .map(|bytes| String::from_utf8(bytes).unwrap())
            .collect()
    }

    #[test]
    fn test_gauge_and_count() {
        let (rx, sink) = SpyMetricSink::new();
        let agent = StatsdAgentSink::new(StatsdClient::from_sink("agent", sink));

        agent
            .record(&MetricValue::new("gauge.cpu", 10.5).unwrap())
            .unwrap();
        agent
            .increment(&Delta::new("counter.requests", 3.0).unwrap())
            .unwrap();
        agent.reset("counter.requests").unwrap();

        assert_eq!(
            sent(&rx),
            ["agent.gauge.cpu:10.5|g", "agent.counter.requests:3|c"]
        );
    }

    #[test]
    fn test_behind_delta_tracker() {
        let (rx, sink) = SpyMetricSink::new();
        let agent = StatsdAgentSink::new(StatsdClient::from_sink("agent", sink));
        let tracker = CounterDeltaTracker::new(agent);

        tracker
            .record(&MetricValue::new("counter.requests", 5.0).unwrap())
            .unwrap();
        tracker
            .record(&MetricValue::new("counter.requests", 7.0).unwrap())
            .unwrap();

        assert_eq!(
            sent(&rx),
            ["agent.counter.requests:5|c", "agent.counter.requests:2|c"]
        );
    }
}
