//! Immutable argument snapshots.
//!
//! Call arguments are copied once into a shared, read-only snapshot before a
//! handler runs. Handlers only ever get `&Value`, so they cannot mutate the
//! caller's structures, and a caller changing its own value afterwards is
//! not observed by a handler still in flight.

use std::ops::Deref;
use std::sync::Arc;

use serde_json::Value;

/// Deeply immutable call arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct FrozenArgs(Arc<Value>);

impl FrozenArgs {
    /// Freeze a copy of `value`.
    pub fn freeze(value: &Value) -> Self {
        Self(Arc::new(value.clone()))
    }

    /// Borrow the frozen value.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Take an owned, independent copy that may be modified freely.
    pub fn thaw(&self) -> Value {
        (*self.0).clone()
    }
}

impl From<Value> for FrozenArgs {
    fn from(value: Value) -> Self {
        Self(Arc::new(value))
    }
}

impl Deref for FrozenArgs {
    type Target = Value;

    fn deref(&self) -> &Value {
        &self.0
    }
}
