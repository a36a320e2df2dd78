//! Consumer for the inbound `sgateway_calls` queue.
//!
//! Message payload is `{service, version, method, payload}`. A handler
//! error with `client_retry = true` requeues the message; any other error
//! abandons it; success acknowledges it.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::StreamExt;
use lapin::options::{BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{Channel, Consumer};
use serde::Deserialize;
use serde_json::Value;

pub const QUEUE_NAME: &str = "sgateway_calls";

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Deserialize)]
pub struct CallMessage {
    pub service: String,
    pub version: u32,
    pub method: String,
    pub payload: Value,
}

/// What the MQ adapter asks of the rest of the gateway: dispatch one call,
/// and report whether a failure should be requeued.
pub trait CallHandler: Send + Sync {
    fn handle<'a>(&'a self, call: &'a CallMessage) -> BoxFuture<'a, Result<(), HandlerError>>;
}

#[derive(Debug)]
pub struct HandlerError {
    pub message: String,
    pub client_retry: bool,
}

impl std::fmt::Display for HandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for HandlerError {}

pub async fn declare_queue(channel: &Channel) -> Result<(), lapin::Error> {
    channel
        .queue_declare(QUEUE_NAME, QueueDeclareOptions { durable: true, ..Default::default() }, FieldTable::default())
        .await?;
    Ok(())
}

pub async fn consumer(channel: &Channel, tag: &str) -> Result<Consumer, lapin::Error> {
    channel.basic_qos(1, BasicQosOptions::default()).await?;
    channel.basic_consume(QUEUE_NAME, tag, BasicConsumeOptions::default(), FieldTable::default()).await
}

/// Drains `consumer` until the stream ends (broker shutdown or explicit
/// cancel), dispatching each message to `handler`.
pub async fn run(mut consumer: Consumer, handler: Arc<dyn CallHandler>) {
    while let Some(delivery) = consumer.next().await {
        let Ok(delivery) = delivery else {
            tracing::warn!("amqp delivery error, skipping");
            continue;
        };

        let outcome = match serde_json::from_slice::<CallMessage>(&delivery.data) {
            Ok(call) => handler.handle(&call).await,
            Err(err) => Err(HandlerError { message: format!("malformed call message: {err}"), client_retry: false }),
        };

        let ack_result = match outcome {
            Ok(()) => delivery.ack(BasicAckOptions::default()).await,
            Err(err) => {
                tracing::warn!(error = %err, client_retry = err.client_retry, "sgateway_calls handler failed");
                delivery.nack(BasicNackOptions { requeue: err.client_retry, ..Default::default() }).await
            }
        };
        if let Err(err) = ack_result {
            tracing::error!(%err, "failed to ack/nack amqp delivery");
        }
    }
}
