//! CouchDB HTTP client
//!
//! A small synchronous client for the CouchDB document API: databases,
//! documents, views, security objects and the streaming feeds in
//! [`crate::feed`].

mod client;
mod database;
mod error;
mod options;

pub use client::{Client, DEFAULT_TIMEOUT};
pub use database::{Database, Members, Security};
pub use error::{Error, Result};
pub use options::Options;

#[cfg(test)]
pub(crate) use client::tests as test_server;
