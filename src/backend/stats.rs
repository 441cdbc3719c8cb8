//! # Open telemetry map.
//!
//! [`PartialStats`] is what instances report upward: a string-keyed map of
//! JSON values. Producers only ever add fields, so consumers must tolerate
//! missing ones.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

/// Well-known key holding the instance name.
pub const KEY_NAME: &str = "name";
/// Well-known key holding the `{id, name}` process object.
pub const KEY_PROCESS: &str = "process";
/// Well-known key holding a degradation reason.
pub const KEY_ERROR: &str = "error";

/// Field name → value telemetry snapshot.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PartialStats(BTreeMap<String, Value>);

impl PartialStats {
    /// Creates an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// A snapshot carrying only an `error` field.
    pub fn degraded(reason: impl Into<String>) -> Self {
        let mut s = Self::new();
        s.insert(KEY_ERROR, reason.into());
        s
    }

    /// Sets a field, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Top-level field lookup.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Dotted-path lookup into nested objects, e.g. `"process.id"`.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut cur = self.0.get(parts.next()?)?;
        for part in parts {
            cur = cur.as_object()?.get(part)?;
        }
        Some(cur)
    }

    /// Adds every field of `other`; fields already present are kept.
    pub fn merge(&mut self, other: PartialStats) {
        for (k, v) in other.0 {
            self.0.entry(k).or_insert(v);
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Consumes the snapshot into a JSON object.
    pub fn into_value(self) -> Value {
        Value::Object(self.0.into_iter().collect())
    }
}

impl From<BTreeMap<String, Value>> for PartialStats {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}
