//! Query string options

use std::collections::BTreeMap;

use serde_json::Value;
use url::Url;

use super::error::{Error, Result};

/// Query parameters that are sent JSON-encoded for view queries
pub(crate) const VIEW_JSON_KEYS: &[&str] = &["startkey", "start_key", "key", "endkey", "end_key"];

/// Query parameters that are sent JSON-encoded for document reads
pub(crate) const GET_JSON_KEYS: &[&str] = &["open_revs", "atts_since"];

/// Query string parameters for a request.
///
/// Values are forwarded verbatim: strings as-is, booleans and numbers in
/// their literal form. Keys listed by the endpoint as JSON keys are sent
/// JSON-encoded instead.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Options(BTreeMap<String, Value>);

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style `set`
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Append all options to the query string of `url`
    pub(crate) fn encode_into(&self, url: &mut Url, json_keys: &[&str]) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }

        let mut pairs = url.query_pairs_mut();
        for (key, value) in &self.0 {
            let encoded = if json_keys.contains(&key.as_str()) {
                serde_json::to_string(value)?
            } else {
                encode_value(key, value)?
            };
            pairs.append_pair(key, &encoded);
        }
        Ok(())
    }
}

fn encode_value(key: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Err(Error::Configuration(format!(
            "invalid option {:?}: value is null",
            key
        ))),
        Value::Array(_) | Value::Object(_) => Err(Error::Configuration(format!(
            "invalid option {:?}: unsupported type",
            key
        ))),
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Options {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut options = Options::new();
        for (key, value) in iter {
            options.set(key, value);
        }
        options
    }
}
