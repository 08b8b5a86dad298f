use std::error::Error;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use crate::envelope::{Envelope, Headers};

/// An error reported by a [`BusClient`] when a message could not be handed to the broker.
#[derive(Debug, Error)]
#[error("failed to deliver message to the bus")]
pub struct SendError(#[source] Box<dyn Error + Send + Sync + 'static>);

impl SendError {
    /// Wraps the transport error of a bus client.
    pub fn new<E>(error: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync + 'static>>,
    {
        Self(error.into())
    }
}

/// Publishing errors.
#[derive(Debug, Error)]
pub enum ProducerError {
    /// Failed to send a message.
    #[error("failed to send message")]
    SendFailed(#[from] SendError),

    /// Failed to serialize the json message using serde.
    #[error("failed to serialize json message")]
    InvalidJson(#[source] serde_json::Error),

    /// The value is NaN or infinite and has no JSON representation.
    #[error("metric {0} has a non-finite value")]
    NonFiniteValue(String),

    /// Failed to create a kafka producer because of the invalid configuration.
    #[cfg(feature = "producer")]
    #[error("failed to create kafka producer: invalid kafka config")]
    InvalidConfig(#[source] rdkafka::error::KafkaError),
}

/// A client delivering messages to a broker.
///
/// Connection management, acknowledgement and retries are the responsibility of the client.
pub trait BusClient {
    /// Publishes a message to `destination` under `routing_key`.
    fn publish(
        &self,
        destination: &str,
        routing_key: &str,
        payload: &[u8],
        headers: &Headers,
    ) -> Result<(), SendError>;
}

impl<C> BusClient for &C
where
    C: BusClient + ?Sized,
{
    fn publish(
        &self,
        destination: &str,
        routing_key: &str,
        payload: &[u8],
        headers: &Headers,
    ) -> Result<(), SendError> {
        (**self).publish(destination, routing_key, payload, headers)
    }
}

impl<C> BusClient for Arc<C>
where
    C: BusClient + ?Sized,
{
    fn publish(
        &self,
        destination: &str,
        routing_key: &str,
        payload: &[u8],
        headers: &Headers,
    ) -> Result<(), SendError> {
        (**self).publish(destination, routing_key, payload, headers)
    }
}

/// A bus client that keeps published messages in memory.
///
/// Useful for wiring producers and listeners within one process, and in tests.
#[derive(Debug, Default)]
pub struct CapturingClient {
    envelopes: Mutex<Vec<Envelope>>,
    failure: Option<String>,
}

impl CapturingClient {
    /// Creates an empty client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a client that rejects every message with the given reason.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            envelopes: Mutex::default(),
            failure: Some(reason.into()),
        }
    }

    /// Returns a copy of all captured messages in publish order.
    pub fn envelopes(&self) -> Vec<Envelope> {
        self.envelopes.lock().clone()
    }

    /// Removes and returns all captured messages.
    pub fn drain(&self) -> Vec<Envelope> {
        std::mem::take(&mut *self.envelopes.lock())
    }
}

impl BusClient for CapturingClient {
    fn publish(
        &self,
        destination: &str,
        routing_key: &str,
        payload: &[u8],
        headers: &Headers,
    ) -> Result<(), SendError> {
        if let Some(ref reason) = self.failure {
            return Err(SendError::new(reason.as_str()));
        }

        self.envelopes.lock().push(Envelope {
            destination: destination.to_owned(),
            routing_key: routing_key.to_owned(),
            payload: payload.to_vec(),
            headers: headers.clone(),
        });
        Ok(())
    }
}
