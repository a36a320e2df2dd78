//! Versioned JSON cache envelope.
//!
//! Replaces the original pickle-based cache serialization (§9): cache
//! entries survive code changes and are readable outside this process,
//! at the cost of being JSON rather than arbitrary Python objects.

use serde::{Deserialize, Serialize};
use serde_json::Value;

const CURRENT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct Envelope {
    v: u32,
    data: Value,
}

pub fn encode(data: &Value) -> Vec<u8> {
    serde_json::to_vec(&Envelope { v: CURRENT_VERSION, data: data.clone() }).expect("JSON values always serialize")
}

/// Decodes a stored entry. A version mismatch is treated as a cache miss
/// rather than an error — a future codec change should not crash the
/// gateway on entries written by an older release.
pub fn decode(bytes: &[u8]) -> Option<Value> {
    let envelope: Envelope = serde_json::from_slice(bytes).ok()?;
    if envelope.v != CURRENT_VERSION {
        return None;
    }
    Some(envelope.data)
}
