//! Server connection
//!
//! `Client` talks to one CouchDB server. Requests go through a blocking
//! `reqwest` client so feeds can be read synchronously from the response.

use std::time::Duration;

use reqwest::blocking::{Client as HttpClient, Response};
use reqwest::header::{CONTENT_TYPE, ETAG};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use super::database::Database;
use super::error::{Error, Result};
use super::options::Options;
use crate::feed::DbUpdatesFeed;

/// Default timeout for non-streaming requests
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Credentials taken from the server URL
#[derive(Clone)]
struct BasicAuth {
    username: String,
    password: String,
}

impl std::fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Shared request plumbing for clients and databases
#[derive(Debug, Clone)]
pub(crate) struct Transport {
    /// Server URL without credentials, query or fragment
    prefix: Url,
    http: HttpClient,
    auth: Option<BasicAuth>,
    /// Applied to every request except feeds
    timeout: Option<Duration>,
}

/// One outgoing request
pub(crate) struct Request {
    method: Method,
    url: Url,
    body: Option<Vec<u8>>,
    /// Feeds stay open indefinitely and must not time out
    streaming: bool,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            body: None,
            streaming: false,
        }
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    pub fn streaming(mut self) -> Self {
        self.streaming = true;
        self
    }
}

impl Transport {
    fn new(raw_url: &str, timeout: Option<Duration>) -> Result<Self> {
        let mut prefix = Url::parse(raw_url)?;
        if prefix.cannot_be_a_base() {
            return Err(Error::Configuration(format!(
                "server URL cannot have paths: {}",
                raw_url
            )));
        }
        prefix.set_query(None);
        prefix.set_fragment(None);

        let auth = if prefix.username().is_empty() {
            None
        } else {
            Some(BasicAuth {
                username: prefix.username().to_string(),
                password: prefix.password().unwrap_or_default().to_string(),
            })
        };
        // Cannot fail for URLs that can be a base
        let _ = prefix.set_username("");
        let _ = prefix.set_password(None);

        let http = HttpClient::builder()
            .timeout(None::<Duration>)
            .user_agent(concat!("guestbook/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            prefix,
            http,
            auth,
            timeout,
        })
    }

    /// Server URL without a trailing slash
    pub fn prefix(&self) -> &str {
        self.prefix.as_str().trim_end_matches('/')
    }

    /// Build a URL from path segments, each escaped on its own.
    ///
    /// A `_design/<name>` segment keeps its slash.
    pub fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.prefix.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            for (i, segment) in segments.iter().enumerate() {
                match segment.strip_prefix("_design/") {
                    Some(name) if i == 1 => {
                        path.push("_design").push(name);
                    }
                    _ => {
                        path.push(segment);
                    }
                }
            }
        }
        url
    }

    /// Like [`Transport::url`], with a query string
    pub fn url_with_options(
        &self,
        segments: &[&str],
        options: &Options,
        json_keys: &[&str],
    ) -> Result<Url> {
        let mut url = self.url(segments);
        options.encode_into(&mut url, json_keys)?;
        Ok(url)
    }

    /// Send a request. Statuses >= 400 are turned into [`Error::Api`].
    pub fn send(&self, request: Request) -> Result<Response> {
        let Request {
            method,
            url,
            body,
            streaming,
        } = request;

        // Content-Type is required for POST
        let mut builder = self
            .http
            .request(method.clone(), url.clone())
            .header(CONTENT_TYPE, "application/json");
        if let Some(auth) = &self.auth {
            builder = builder.basic_auth(&auth.username, Some(&auth.password));
        }
        if let (false, Some(timeout)) = (streaming, self.timeout) {
            builder = builder.timeout(timeout);
        }
        if let Some(body) = body {
            builder = builder.body(body);
        }

        debug!(%method, %url, streaming, "sending request");
        let response = builder.send()?;
        if response.status().is_client_error() || response.status().is_server_error() {
            return Err(parse_error(&method, response));
        }
        Ok(response)
    }

    /// Send a request and decode the JSON response body
    pub fn send_json<T: DeserializeOwned>(&self, request: Request) -> Result<T> {
        let response = self.send(request)?;
        read_body(response)
    }
}

/// Decode a JSON response body
pub(crate) fn read_body<T: DeserializeOwned>(response: Response) -> Result<T> {
    Ok(serde_json::from_reader(response)?)
}

/// The unquoted ETag of a response, which carries the document revision
pub(crate) fn response_rev(response: &Response) -> Result<String> {
    let etag = response
        .headers()
        .get(ETAG)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or(Error::MissingEtag)?;
    Ok(etag.trim_matches('"').to_string())
}

/// Error body sent by CouchDB: `{"error": <code>, "reason": <message>}`
#[derive(Debug, Default, Deserialize)]
struct ErrorReply {
    #[serde(default)]
    error: String,
    #[serde(default)]
    reason: String,
}

fn parse_error(method: &Method, response: Response) -> Error {
    let status = response.status();
    let url = response.url().to_string();

    let reply = if *method == Method::HEAD {
        ErrorReply::default()
    } else {
        serde_json::from_reader(response).unwrap_or_else(|e| {
            warn!(error = %e, %status, "couldn't decode CouchDB error body");
            ErrorReply::default()
        })
    };

    Error::Api {
        method: method.to_string(),
        url,
        status,
        error: reply.error,
        reason: reply.reason,
    }
}

/// A remote CouchDB server.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct Client {
    transport: Transport,
}

impl Client {
    /// Create a client for the server at `url`.
    ///
    /// Credentials in the URL are sent with HTTP basic authentication.
    /// A query string or fragment is ignored.
    pub fn new(url: &str) -> Result<Self> {
        Self::with_timeout(url, Some(DEFAULT_TIMEOUT))
    }

    /// Create a client with a custom timeout for non-feed requests
    pub fn with_timeout(url: &str, timeout: Option<Duration>) -> Result<Self> {
        let transport = Transport::new(url, timeout)?;
        debug!(url = transport.prefix(), "client created");
        Ok(Self { transport })
    }

    /// URL of the server, without a trailing `/`
    pub fn url(&self) -> &str {
        self.transport.prefix()
    }

    /// Check whether the server is alive
    pub fn ping(&self) -> Result<()> {
        let url = self.transport.url(&[]);
        self.transport.send(Request::new(Method::HEAD, url))?;
        Ok(())
    }

    /// Create a database.
    ///
    /// Fails with status 412 if the database already exists.
    pub fn create_db(&self, name: &str) -> Result<Database> {
        let url = self.transport.url(&[name]);
        self.transport.send(Request::new(Method::PUT, url))?;
        info!(db = name, "database created");
        Ok(self.db(name))
    }

    /// Make sure a database exists
    pub fn ensure_db(&self, name: &str) -> Result<Database> {
        match self.create_db(name) {
            Ok(db) => Ok(db),
            Err(e) if e.has_status(StatusCode::PRECONDITION_FAILED) => {
                debug!(db = name, "database already exists");
                Ok(self.db(name))
            }
            Err(e) => Err(e),
        }
    }

    pub fn delete_db(&self, name: &str) -> Result<()> {
        let url = self.transport.url(&[name]);
        self.transport.send(Request::new(Method::DELETE, url))?;
        info!(db = name, "database deleted");
        Ok(())
    }

    /// Names of all databases
    pub fn all_dbs(&self) -> Result<Vec<String>> {
        let url = self.transport.url(&["_all_dbs"]);
        self.transport.send_json(Request::new(Method::GET, url))
    }

    /// Handle for a database. Its existence is not checked.
    pub fn db(&self, name: &str) -> Database {
        Database::new(self.transport.clone(), name)
    }

    /// Open the `_db_updates` feed.
    ///
    /// The `feed` option is always sent as `continuous`.
    pub fn db_updates(&self, options: &Options) -> Result<DbUpdatesFeed<Response>> {
        let options = options.clone().with("feed", "continuous");
        let url = self
            .transport
            .url_with_options(&["_db_updates"], &options, &[])?;
        let response = self
            .transport
            .send(Request::new(Method::GET, url).streaming())?;
        info!("db updates feed opened");
        Ok(DbUpdatesFeed::from_reader(response))
    }
}
