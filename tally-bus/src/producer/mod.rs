use std::fmt;
use std::time::Duration;

use rdkafka::ClientConfig;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{BaseRecord, Producer};

use crate::client::{BusClient, ProducerError, SendError};
use crate::config::KafkaConfigParam;
use crate::envelope::Headers;

mod utils;
use utils::{DeliveryContext, ThreadedProducer};

/// A [`BusClient`] producing to Kafka.
///
/// The destination is used as topic and the routing key as message key. Messages with an empty
/// routing key are produced without a key. Every header becomes a Kafka header.
///
/// Sending only enqueues the message. Delivery failures reported by the broker later are logged
/// and counted, but not returned to the caller.
pub struct KafkaClient {
    producer: ThreadedProducer,
}

impl KafkaClient {
    /// Creates a client from raw producer parameters.
    ///
    /// # Errors
    /// Returns [`ProducerError::InvalidConfig`] error if the provided configuration is wrong and
    /// the producer could not be created.
    pub fn new(params: &[KafkaConfigParam]) -> Result<Self, ProducerError> {
        let mut client_config = ClientConfig::new();
        for param in params {
            client_config.set(param.name.as_str(), param.value.as_str());
        }

        let producer = client_config
            .create_with_context(DeliveryContext)
            .map_err(ProducerError::InvalidConfig)?;

        Ok(Self { producer })
    }

    /// Waits until all enqueued messages have been delivered or `timeout` elapses.
    pub fn flush(&self, timeout: Duration) -> Result<(), SendError> {
        self.producer.flush(timeout).map_err(SendError::new)
    }
}

impl BusClient for KafkaClient {
    fn publish(
        &self,
        destination: &str,
        routing_key: &str,
        payload: &[u8],
        headers: &Headers,
    ) -> Result<(), SendError> {
        let mut kafka_headers = OwnedHeaders::new_with_capacity(headers.len());
        for (key, value) in headers {
            kafka_headers = kafka_headers.insert(Header {
                key,
                value: Some(value),
            });
        }

        let mut record = BaseRecord::to(destination)
            .payload(payload)
            .headers(kafka_headers);
        if !routing_key.is_empty() {
            record = record.key(routing_key);
        }

        self.producer.send(record).map_err(|(error, _record)| {
            tally_log::error!(
                topic = destination,
                "error sending kafka message: {}",
                error
            );
            SendError::new(error)
        })
    }
}

impl fmt::Debug for KafkaClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KafkaClient")
            .field("producer", &"<ThreadedProducer>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config() {
        let params = [KafkaConfigParam {
            name: "no.such.setting".to_owned(),
            value: "1".to_owned(),
        }];

        let error = KafkaClient::new(&params).unwrap_err();
        assert!(matches!(error, ProducerError::InvalidConfig(_)));
    }

    #[test]
    fn test_create_without_broker() {
        let params = [KafkaConfigParam {
            name: "bootstrap.servers".to_owned(),
            value: "127.0.0.1:9092".to_owned(),
        }];

        assert!(KafkaClient::new(&params).is_ok());
    }
}
