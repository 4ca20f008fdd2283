// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Slush: Derived Signal Side-Channel
//!
//! A `Slush` is a flat JSON object emitted by one agent and handed, unmodified,
//! to a downstream agent. The kernel never inspects its contents: it forwards a
//! single slush step-to-step (Pipeline), merges several into a producer-keyed
//! map (Graph), or carries a failed target's slush to the next one (Broadcast
//! fallback, Recursion Guard).

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Flat key/value map of derived signals produced by a single agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Slush(Map<String, Value>);

impl Slush {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Synthesize the minimal slush recorded for a unit that emitted none, so
    /// downstream consumers can still tell that something ran.
    pub fn placeholder<I, K>(source_agent: &str, signals: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let signals: Map<String, Value> = signals
            .into_iter()
            .map(|(key, value)| (key.into(), value))
            .collect();

        let mut data = Map::new();
        data.insert("source_agent".to_string(), Value::String(source_agent.to_string()));
        data.insert("timestamp".to_string(), Value::String(Utc::now().to_rfc3339()));
        data.insert("signals".to_string(), Value::Object(signals));
        Self(data)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Slush {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Value)> for Slush {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Upstream signals handed to an agent alongside its inputs.
///
/// Pipelines and single-target forwarding carry the previous producer's slush
/// as-is; graph nodes receive every dependency's slush keyed by node name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "slush", rename_all = "snake_case")]
pub enum UpstreamSlush {
    Previous(Slush),
    Merged(BTreeMap<String, Slush>),
}

impl UpstreamSlush {
    /// The single forwarded slush, if this is not a merged map.
    pub fn previous(&self) -> Option<&Slush> {
        match self {
            Self::Previous(slush) => Some(slush),
            Self::Merged(_) => None,
        }
    }

    /// Slush produced by the named dependency, for merged upstream maps.
    pub fn from_producer(&self, producer: &str) -> Option<&Slush> {
        match self {
            Self::Merged(map) => map.get(producer),
            Self::Previous(_) => None,
        }
    }

    /// Producer names present in a merged map, in sorted order.
    pub fn producers(&self) -> Vec<&str> {
        match self {
            Self::Merged(map) => map.keys().map(String::as_str).collect(),
            Self::Previous(_) => Vec::new(),
        }
    }
}
