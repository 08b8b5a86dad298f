use rdkafka::ClientContext;
use rdkafka::message::Message as _;
use rdkafka::producer::{DeliveryResult, ProducerContext};
use tally_log::LogError;
use tally_statsd::metric;

use crate::statsd::BusCounters;

/// Reports messages the broker rejected after [`KafkaClient`](super::KafkaClient) enqueued them.
#[derive(Debug)]
pub struct DeliveryContext;

impl ClientContext for DeliveryContext {}

impl ProducerContext for DeliveryContext {
    type DeliveryOpaque = ();

    fn delivery(&self, result: &DeliveryResult<'_>, _: Self::DeliveryOpaque) {
        let Err((error, message)) = result else {
            return;
        };

        tally_log::error!(
            topic = message.topic(),
            "kafka rejected metric message: {}",
            LogError(error)
        );
        metric!(counter(BusCounters::ProduceError) += 1);
    }
}

pub type ThreadedProducer = rdkafka::producer::ThreadedProducer<DeliveryContext>;
