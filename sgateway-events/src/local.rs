//! In-memory bus used by tests and by the `sgateway-test` harness.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;

use crate::bus::{BusError, MessageBus};

#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub routing_key: String,
    pub payload: Value,
}

#[derive(Default)]
pub struct LocalBus {
    topics: Mutex<HashMap<String, Vec<PublishedMessage>>>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages published to `topic`, in publish order.
    pub fn published(&self, topic: &str) -> Vec<PublishedMessage> {
        self.topics.lock().expect("local bus mutex poisoned").get(topic).cloned().unwrap_or_default()
    }

    pub fn clear(&self) {
        self.topics.lock().expect("local bus mutex poisoned").clear();
    }
}

impl MessageBus for LocalBus {
    fn publish<'a>(&'a self, topic: &'a str, routing_key: &'a str, payload: Value) -> crate::bus::BoxFuture<'a, Result<(), BusError>> {
        Box::pin(async move {
            self.topics
                .lock()
                .expect("local bus mutex poisoned")
                .entry(topic.to_string())
                .or_default()
                .push(PublishedMessage { routing_key: routing_key.to_string(), payload });
            Ok(())
        })
    }
}
