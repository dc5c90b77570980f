//! Guestbook storage
//!
//! Visitors are plain `{"name": ...}` documents with server-assigned ids.

use tracing::{debug, info};

use crate::couch::{Client, Database, Options, Result};
use crate::models::{AllDocsResult, Visitor};

/// The guestbook database
#[derive(Debug, Clone)]
pub struct Guestbook {
    db: Database,
}

impl Guestbook {
    /// Use `db` as is, without checking that it exists
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Open the guestbook, creating its database if needed
    pub fn open(client: &Client, db_name: &str) -> Result<Self> {
        let db = client.ensure_db(db_name)?;
        info!(db = db_name, server = client.url(), "guestbook opened");
        Ok(Self { db })
    }

    /// The underlying database
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Store a visitor and return the greeting for them
    pub fn record_visitor(&self, name: &str) -> Result<String> {
        let visitor = Visitor::new(name);
        let (id, _rev) = self.db.post(&visitor)?;
        debug!(%id, name, "visitor recorded");
        Ok(visitor.greeting())
    }

    /// Names of all visitors, in document id order
    pub fn visitors(&self) -> Result<Vec<String>> {
        let result: AllDocsResult = self
            .db
            .all_docs(&Options::new().with("include_docs", true))?;
        Ok(result.visitor_names())
    }
}
