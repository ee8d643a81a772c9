//! Wire types exchanged between a plugin and the host.
//!
//! ```text
//! plugin -> host   { "type": "api:batch", "id": "...", "calls": [{ "method", "args" }] }
//! host -> plugin   { "rid": "...", "result": { "results": [{ "ok", "result"?, "error"? }] } }
//! host -> plugin   { "rid": "...", "error": "..." }
//! host -> plugin   { "type": "bus:event", "topic", "from", "payload" }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CallError;

/// Frame type of a batch request.
pub const BATCH_FRAME: &str = "api:batch";

/// Frame type of a topic bus delivery.
pub const BUS_EVENT_FRAME: &str = "bus:event";

/// One unit of work inside a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallEnvelope {
    pub method: String,
    #[serde(default = "empty_object")]
    pub args: Value,
}

impl CallEnvelope {
    /// Create a call envelope.
    pub fn new(method: impl Into<String>, args: Value) -> Self {
        Self {
            method: method.into(),
            args,
        }
    }
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

/// A batch of calls submitted by a plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub id: String,
    pub calls: Vec<CallEnvelope>,
}

/// Outcome of one call, at the same index as its envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallResult {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CallResult {
    /// Successful call.
    pub fn success(result: Value) -> Self {
        Self {
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    /// Failed call.
    pub fn failure(error: &CallError) -> Self {
        Self {
            ok: false,
            result: None,
            error: Some(error.to_string()),
        }
    }
}

impl From<Result<Value, CallError>> for CallResult {
    fn from(outcome: Result<Value, CallError>) -> Self {
        match outcome {
            Ok(value) => CallResult::success(value),
            Err(e) => CallResult::failure(&e),
        }
    }
}

/// Per-call results, ordered 1:1 with the request's calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub results: Vec<CallResult>,
}

/// Event delivered to a topic subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub topic: String,
    pub from: String,
    pub payload: Value,
}

impl BusEvent {
    /// Create a bus event frame.
    pub fn new(topic: impl Into<String>, from: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: BUS_EVENT_FRAME.to_string(),
            topic: topic.into(),
            from: from.into(),
            payload,
        }
    }
}

/// Frames sent from the host to a plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutboundFrame {
    /// The batch was admitted; per-call outcomes inside.
    Response { rid: String, result: BatchResult },
    /// The batch was rejected as a whole.
    Failure { rid: String, error: String },
    /// A topic bus delivery.
    Event(BusEvent),
}

impl OutboundFrame {
    /// Serialize to JSON text.
    pub fn to_json(&self) -> String {
        // Every variant is plain data with string keys.
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"))
    }
}

/// Classification of an inbound text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A well-formed batch request.
    Batch(BatchRequest),
    /// A batch frame that carried an id but did not decode.
    Malformed { rid: String, error: String },
    /// Anything else: unknown type, no type, or not JSON.
    Ignored,
}

impl Inbound {
    /// Classify a text frame received from a plugin.
    pub fn parse(text: &str) -> Self {
        let Ok(value) = serde_json::from_str::<Value>(text) else {
            return Inbound::Ignored;
        };

        if value.get("type").and_then(Value::as_str) != Some(BATCH_FRAME) {
            return Inbound::Ignored;
        }

        let rid = value.get("id").and_then(Value::as_str).map(str::to_string);
        match serde_json::from_value::<BatchRequest>(value) {
            Ok(request) => Inbound::Batch(request),
            Err(e) => match rid {
                Some(rid) => Inbound::Malformed {
                    rid,
                    error: format!("invalid batch: {}", e),
                },
                None => Inbound::Ignored,
            },
        }
    }
}
