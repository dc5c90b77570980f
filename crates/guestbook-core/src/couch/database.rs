//! Database handle and document operations

use reqwest::blocking::Response;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::client::{read_body, response_rev, Request, Transport};
use super::error::{Error, Result};
use super::options::{Options, GET_JSON_KEYS, VIEW_JSON_KEYS};
use crate::feed::{ChangesFeed, FeedMode};

/// A database on a CouchDB server.
///
/// Shares credentials and connection pool with the [`Client`](super::Client)
/// that created it. Existence is only checked by the server on first use.
#[derive(Debug, Clone)]
pub struct Database {
    transport: Transport,
    name: String,
}

/// Database security object
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Security {
    #[serde(default)]
    pub admins: Members,
    #[serde(default)]
    pub members: Members,
}

/// Member list of a security object
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Members {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub names: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
}

/// Reply to a document POST
#[derive(Debug, Deserialize)]
struct Created {
    id: String,
    rev: String,
}

impl Database {
    pub(crate) fn new(transport: Transport, name: &str) -> Self {
        Self {
            transport,
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fetch a document and decode it into `T`
    pub fn get<T: DeserializeOwned>(&self, id: &str, options: &Options) -> Result<T> {
        let url = self
            .transport
            .url_with_options(&[&self.name, id], options, GET_JSON_KEYS)?;
        self.transport.send_json(Request::new(Method::GET, url))
    }

    /// Current revision of a document, without fetching its body
    pub fn rev(&self, id: &str) -> Result<String> {
        let url = self.transport.url(&[&self.name, id]);
        let response = self.transport.send(Request::new(Method::HEAD, url))?;
        response_rev(&response)
    }

    /// Store a document under `id`. Returns the new revision.
    ///
    /// `rev` must be the current revision when updating.
    pub fn put<T: Serialize>(&self, id: &str, doc: &T, rev: Option<&str>) -> Result<String> {
        let url = self.rev_url(id, rev);
        let body = serde_json::to_vec(doc)?;
        let response = self
            .transport
            .send(Request::new(Method::PUT, url).body(body))?;
        let rev = response_rev(&response)?;
        debug!(db = %self.name, id, %rev, "document stored");
        Ok(rev)
    }

    /// Create a document with a server-assigned id.
    ///
    /// Returns the id and revision of the new document.
    pub fn post<T: Serialize>(&self, doc: &T) -> Result<(String, String)> {
        let url = self.transport.url(&[&self.name]);
        let body = serde_json::to_vec(doc)?;
        let created: Created = self
            .transport
            .send_json(Request::new(Method::POST, url).body(body))?;
        debug!(db = %self.name, id = %created.id, rev = %created.rev, "document created");
        Ok((created.id, created.rev))
    }

    /// Mark a document revision as deleted. Returns the tombstone revision.
    pub fn delete(&self, id: &str, rev: &str) -> Result<String> {
        let url = self.rev_url(id, Some(rev));
        let response = self.transport.send(Request::new(Method::DELETE, url))?;
        response_rev(&response)
    }

    pub fn security(&self) -> Result<Security> {
        let url = self.transport.url(&[&self.name, "_security"]);
        let response = self.transport.send(Request::new(Method::GET, url))?;
        let body = response.bytes()?;
        // An empty reply means defaults
        if body.is_empty() {
            return Ok(Security::default());
        }
        Ok(serde_json::from_slice(&body)?)
    }

    pub fn put_security(&self, security: &Security) -> Result<()> {
        let url = self.transport.url(&[&self.name, "_security"]);
        let body = serde_json::to_vec(security)?;
        self.transport
            .send(Request::new(Method::PUT, url).body(body))?;
        info!(db = %self.name, "security object updated");
        Ok(())
    }

    /// Query a view. `ddoc` is the full design document id, including the
    /// `_design/` prefix.
    pub fn view<T: DeserializeOwned>(&self, ddoc: &str, view: &str, options: &Options) -> Result<T> {
        if !ddoc.starts_with("_design/") {
            return Err(Error::InvalidDesignDoc(ddoc.to_string()));
        }
        let url = self.transport.url_with_options(
            &[&self.name, ddoc, "_view", view],
            options,
            VIEW_JSON_KEYS,
        )?;
        self.transport.send_json(Request::new(Method::GET, url))
    }

    /// Query the `_all_docs` view
    pub fn all_docs<T: DeserializeOwned>(&self, options: &Options) -> Result<T> {
        let url = self.transport.url_with_options(
            &[&self.name, "_all_docs"],
            options,
            VIEW_JSON_KEYS,
        )?;
        let response = self.transport.send(Request::new(Method::GET, url))?;
        read_body(response)
    }

    /// Open the `_changes` feed.
    ///
    /// The `feed` option selects the mode; it is validated before any
    /// request is made. The feed reads from the response as it arrives.
    pub fn changes(&self, options: &Options) -> Result<ChangesFeed<Response>> {
        let mode = FeedMode::from_options(options)?;
        let url = self
            .transport
            .url_with_options(&[&self.name, "_changes"], options, &[])?;
        let response = self
            .transport
            .send(Request::new(Method::GET, url).streaming())?;
        info!(db = %self.name, %mode, "changes feed opened");
        ChangesFeed::from_reader(response, mode)
    }

    fn rev_url(&self, id: &str, rev: Option<&str>) -> url::Url {
        let mut url = self.transport.url(&[&self.name, id]);
        if let Some(rev) = rev.filter(|r| !r.is_empty()) {
            url.query_pairs_mut().append_pair("rev", rev);
        }
        url
    }
}
