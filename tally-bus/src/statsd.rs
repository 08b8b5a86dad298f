use tally_statsd::{CounterMetric, DistributionMetric};

pub enum BusCounters {
    /// Number of messages handed to the bus client.
    ///
    /// This metric is tagged with:
    /// - `variant`: `metric` or `delta`.
    /// - `channel`: `sink` for the broker sink, `flow` for the outbound aggregation flow.
    MessagePublished,

    /// Number of messages the bus client rejected.
    ///
    /// This metric is tagged with:
    /// - `variant`: `metric` or `delta`.
    PublishError,

    /// Number of messages received by a listener or inbound flow.
    ///
    /// This metric is tagged with:
    /// - `prefix`: `header` if the prefix came from a message header, `default` otherwise.
    MessageReceived,

    /// Number of received messages whose payload could not be decoded.
    InvalidPayload,

    /// Number of messages dropped by the Kafka producer after they were enqueued.
    #[cfg(feature = "producer")]
    ProduceError,
}

impl CounterMetric for BusCounters {
    fn name(&self) -> &'static str {
        match self {
            Self::MessagePublished => "bus.message.published",
            Self::PublishError => "bus.publish.error",
            Self::MessageReceived => "bus.message.received",
            Self::InvalidPayload => "bus.message.invalid",
            #[cfg(feature = "producer")]
            Self::ProduceError => "bus.kafka.produce_error",
        }
    }
}

pub enum BusDistributions {
    /// Size of a published payload in bytes.
    ///
    /// This metric is tagged with:
    /// - `variant`: `metric` or `delta`.
    MessageSize,
}

impl DistributionMetric for BusDistributions {
    fn name(&self) -> &'static str {
        match self {
            Self::MessageSize => "bus.message.size",
        }
    }
}
