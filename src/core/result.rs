use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::core::value::Value;

/// Key a single terminal value is published under.
pub const RESULT_KEY: &str = "result";

/// The terminal value of a completed execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultContract {
    Single(Value),
    Named(BTreeMap<String, Value>),
}

impl ResultContract {
    /// A named result with no entries, for executions whose output is the stream itself.
    pub fn empty() -> Self {
        ResultContract::Named(BTreeMap::new())
    }

    pub fn single(value: impl Into<Value>) -> Self {
        ResultContract::Single(value.into())
    }

    pub fn named<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        ResultContract::Named(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            ResultContract::Single(v) if key == RESULT_KEY => Some(v),
            ResultContract::Single(_) => None,
            ResultContract::Named(map) => map.get(key),
        }
    }

    /// The `(key, value)` records this result is published as.
    pub fn records(&self) -> Vec<(String, Value)> {
        match self {
            ResultContract::Single(v) => vec![(RESULT_KEY.to_string(), v.clone())],
            ResultContract::Named(map) => map
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}

/// Which named outputs a subscriber wants.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OutputRequest {
    #[default]
    All,
    Only(BTreeSet<String>),
}

impl OutputRequest {
    pub fn only<S: Into<String>>(keys: impl IntoIterator<Item = S>) -> Self {
        OutputRequest::Only(keys.into_iter().map(Into::into).collect())
    }

    pub fn wants(&self, key: &str) -> bool {
        match self {
            OutputRequest::All => true,
            OutputRequest::Only(keys) => keys.contains(key),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        let keys: Box<dyn Iterator<Item = &String>> = match self {
            OutputRequest::All => Box::new(std::iter::empty()),
            OutputRequest::Only(keys) => Box::new(keys.iter()),
        };
        keys.map(String::as_str)
    }
}
