//! Change feed records

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use serde_json::Value;

/// Update sequence of a change.
///
/// CouchDB 1.x sends integers, CouchDB 2+ opaque strings. The value is only
/// ever compared or handed back to the server, never taken apart.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Sequence {
    Number(i64),
    Opaque(String),
}

impl Sequence {
    /// Interpret a JSON value as a sequence, if it has one of the two shapes
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(Sequence::Number),
            Value::String(s) => Some(Sequence::Opaque(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sequence::Number(n) => write!(f, "{}", n),
            Sequence::Opaque(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Sequence {
    fn from(n: i64) -> Self {
        Sequence::Number(n)
    }
}

impl From<&str> for Sequence {
    fn from(s: &str) -> Self {
        Sequence::Opaque(s.to_string())
    }
}

impl From<String> for Sequence {
    fn from(s: String) -> Self {
        Sequence::Opaque(s)
    }
}

impl From<Sequence> for Value {
    fn from(seq: Sequence) -> Self {
        match seq {
            Sequence::Number(n) => Value::from(n),
            Sequence::Opaque(s) => Value::from(s),
        }
    }
}

/// One document change from a `_changes` feed
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// ID of the changed document
    #[serde(default)]
    pub id: String,

    /// True when the change deleted the document
    #[serde(default)]
    pub deleted: bool,

    /// Update sequence of this change
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<Sequence>,

    /// Leaf revisions of the document after the change
    #[serde(rename = "changes", default, with = "rev_list")]
    pub revisions: Vec<String>,

    /// The document itself, only sent with `include_docs=true`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<Box<RawValue>>,
}

impl ChangeEvent {
    /// Decode the attached document, if any
    pub fn doc_as<T: serde::de::DeserializeOwned>(&self) -> Option<serde_json::Result<T>> {
        self.doc
            .as_ref()
            .map(|raw| serde_json::from_str(raw.get()))
    }
}

/// `"changes": [{"rev": "1-abc"}, ...]` on the wire, plain strings in memory
pub(crate) mod rev_list {
    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Deserialize)]
    struct RevEntry {
        rev: String,
    }

    #[derive(Serialize)]
    struct RevRef<'a> {
        rev: &'a str,
    }

    pub fn serialize<S: Serializer>(revs: &[String], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(revs.len()))?;
        for rev in revs {
            seq.serialize_element(&RevRef { rev })?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
        let entries = Option::<Vec<RevEntry>>::deserialize(deserializer)?;
        Ok(entries
            .unwrap_or_default()
            .into_iter()
            .map(|entry| entry.rev)
            .collect())
    }
}
