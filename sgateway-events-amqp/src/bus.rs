//! `lapin`-backed `MessageBus`: publishes to a topic exchange, declared
//! durable so restarts of the broker do not lose the logging topology.

use std::future::Future;
use std::pin::Pin;

use lapin::options::{BasicPublishOptions, ExchangeDeclareOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, ExchangeKind};
use serde_json::Value;
use sgateway_events::{BusError, MessageBus};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub struct AmqpBus {
    channel: Channel,
}

impl AmqpBus {
    pub fn new(channel: Channel) -> Self {
        Self { channel }
    }

    /// Declares `topic` as a durable topic exchange. Idempotent; safe to
    /// call once per topic at startup before any `publish`.
    pub async fn declare_topic(&self, topic: &str) -> Result<(), BusError> {
        self.channel
            .exchange_declare(topic, ExchangeKind::Topic, ExchangeDeclareOptions { durable: true, ..Default::default() }, FieldTable::default())
            .await
            .map_err(|err| BusError(err.to_string()))
    }
}

impl MessageBus for AmqpBus {
    fn publish<'a>(&'a self, topic: &'a str, routing_key: &'a str, payload: Value) -> BoxFuture<'a, Result<(), BusError>> {
        Box::pin(async move {
            let body = serde_json::to_vec(&payload).map_err(|err| BusError(err.to_string()))?;
            self.channel
                .basic_publish(topic, routing_key, BasicPublishOptions::default(), &body, BasicProperties::default().with_delivery_mode(2))
                .await
                .map_err(|err| BusError(err.to_string()))?
                .await
                .map_err(|err| BusError(err.to_string()))?;
            Ok(())
        })
    }
}
