//! Data models for the guestbook
//!
//! Defines the visitor document and the shape of `_all_docs` replies.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A guestbook entry, stored as `{"name": ...}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Visitor {
    pub name: String,
}

impl Visitor {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// The reply sent back when a visitor signs the guestbook
    pub fn greeting(&self) -> String {
        format!("Hello {}", self.name)
    }
}

/// Reply of the `_all_docs` view
#[derive(Debug, Clone, Deserialize)]
pub struct AllDocsResult<T = Value> {
    #[serde(default)]
    pub total_rows: u64,
    #[serde(default)]
    pub offset: u64,
    #[serde(default)]
    pub rows: Vec<AllDocsRow<T>>,
}

/// One row of an `_all_docs` reply
#[derive(Debug, Clone, Deserialize)]
pub struct AllDocsRow<T = Value> {
    pub id: String,
    #[serde(default)]
    pub key: Value,
    #[serde(default)]
    pub value: Value,
    /// Only present with `include_docs=true`
    #[serde(default)]
    pub doc: Option<T>,
}

impl AllDocsResult<Value> {
    /// Names of all documents that look like visitors.
    ///
    /// Rows without a document or without a string `name` are skipped.
    pub fn visitor_names(&self) -> Vec<String> {
        self.rows
            .iter()
            .filter_map(|row| row.doc.as_ref()?.get("name")?.as_str())
            .map(str::to_string)
            .collect()
    }
}
