//! Shared execution context for one graph run.
//!
//! A single [`ExecutionContext`] is shared by reference with every task unit
//! invoked during a run. It carries:
//!
//! - a read-only payload (e.g. the instruction program being planned),
//! - read-only metadata (manipulator and profile information),
//! - an ordered, append-only [`ResultAccumulator`],
//! - the cooperative abort flag the engine checks between nodes.
//!
//! The engine itself only ever reads the abort flag.

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// Errors that can occur when working with the context.
#[derive(Debug, Error)]
pub enum ContextError {
    /// Key was not found in the context.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// Failed to deserialize value from context.
    #[error("deserialization error for key '{key}': {message}")]
    DeserializationError { key: String, message: String },

    /// Failed to serialize value for context.
    #[error("serialization error for key '{key}': {message}")]
    SerializationError { key: String, message: String },

    /// Context lock was poisoned (concurrent access failure).
    #[error("context lock poisoned")]
    LockPoisoned,
}

/// Ordered, append-only store of results produced during a run.
///
/// Task units push results in the order they produce them. Reads take a
/// shared lock, so concurrent branches may inspect the accumulator while
/// others append.
#[derive(Debug, Default)]
pub struct ResultAccumulator {
    entries: RwLock<Vec<Value>>,
}

impl ResultAccumulator {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a result. Returns the index it was stored at.
    pub fn push<T: Serialize>(&self, value: T) -> Result<usize, ContextError> {
        let json_value =
            serde_json::to_value(value).map_err(|e| ContextError::SerializationError {
                key: "results".to_string(),
                message: e.to_string(),
            })?;
        let mut entries = self.entries.write().map_err(|_| ContextError::LockPoisoned)?;
        entries.push(json_value);
        Ok(entries.len() - 1)
    }

    /// Get the result at `index`.
    pub fn get<T: DeserializeOwned>(&self, index: usize) -> Result<T, ContextError> {
        let key = format!("results[{}]", index);
        let entries = self.entries.read().map_err(|_| ContextError::LockPoisoned)?;
        let value = entries
            .get(index)
            .ok_or_else(|| ContextError::KeyNotFound(key.clone()))?;
        serde_json::from_value(value.clone()).map_err(|e| ContextError::DeserializationError {
            key,
            message: e.to_string(),
        })
    }

    /// Get the most recently appended result, if any.
    pub fn last<T: DeserializeOwned>(&self) -> Option<T> {
        let entries = self.entries.read().ok()?;
        let value = entries.last()?;
        serde_json::from_value(value.clone()).ok()
    }

    /// Copy out every result in insertion order.
    pub fn snapshot(&self) -> Vec<Value> {
        self.entries
            .read()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Number of stored results.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    /// Check if no results have been stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Mutable state shared by every task unit of one run.
///
/// Wrap it in an `Arc` and hand it to [`compile`](crate::compile). Mutation
/// goes through interior mutability; task units running on concurrent
/// branches must coordinate any ordering they depend on themselves.
#[derive(Debug, Default)]
pub struct ExecutionContext {
    payload: Value,
    metadata: HashMap<String, Value>,
    results: ResultAccumulator,
    aborted: AtomicBool,
}

impl ExecutionContext {
    /// Create a context around a payload.
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            ..Self::default()
        }
    }

    /// Attach metadata (manipulator info, profiles, ...).
    pub fn with_metadata(mut self, metadata: HashMap<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Insert a single metadata entry.
    pub fn with_metadata_entry<T: Serialize>(
        mut self,
        key: impl Into<String>,
        value: T,
    ) -> Result<Self, ContextError> {
        let key = key.into();
        let json_value =
            serde_json::to_value(value).map_err(|e| ContextError::SerializationError {
                key: key.clone(),
                message: e.to_string(),
            })?;
        self.metadata.insert(key, json_value);
        Ok(self)
    }

    /// The raw payload.
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Deserialize the payload into a concrete type.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, ContextError> {
        serde_json::from_value(self.payload.clone()).map_err(|e| {
            ContextError::DeserializationError {
                key: "payload".to_string(),
                message: e.to_string(),
            }
        })
    }

    /// Get a metadata value by key.
    pub fn get_metadata<T: DeserializeOwned>(&self, key: &str) -> Result<T, ContextError> {
        self.metadata
            .get(key)
            .ok_or_else(|| ContextError::KeyNotFound(key.to_string()))
            .and_then(|v| {
                serde_json::from_value(v.clone()).map_err(|e| ContextError::DeserializationError {
                    key: key.to_string(),
                    message: e.to_string(),
                })
            })
    }

    /// Get an optional metadata value.
    pub fn get_metadata_optional<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.metadata
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// The results accumulator.
    pub fn results(&self) -> &ResultAccumulator {
        &self.results
    }

    /// Request cooperative cancellation of the run.
    ///
    /// In-flight actions are not interrupted. The engine stops following
    /// edges on any branch that observes the flag.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }
}
