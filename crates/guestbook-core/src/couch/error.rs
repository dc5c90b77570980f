//! Database client error handling
//!
//! One typed error for every client operation. Feed failures
//! (`Protocol`, `Decode`, `Io`) are fatal to the feed that produced them;
//! the rest fail the individual call.

use std::io;

use reqwest::StatusCode;
use thiserror::Error;

/// Errors that can occur while talking to the database
#[derive(Error, Debug)]
pub enum Error {
    /// The byte stream does not match the expected token grammar
    #[error("unexpected token: found {found:?}, want {expected:?}")]
    Protocol { found: String, expected: String },

    /// A buffered value failed to decode as JSON
    #[error("failed to decode JSON: {0}")]
    Decode(#[from] serde_json::Error),

    /// Transport failure, including an unexpected end of stream
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Unsupported option value (e.g. an unknown feed mode)
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Request could not be sent or the response could not be read
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server URL could not be parsed
    #[error("invalid server URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The server answered with a status >= 400
    #[error("{}", api_message(.method, .url, .status, .error, .reason))]
    Api {
        method: String,
        url: String,
        status: StatusCode,
        /// Error code reported by the server, empty for HEAD requests
        error: String,
        /// Error message reported by the server, empty for HEAD requests
        reason: String,
    },

    /// A revision was expected in the ETag header but none was sent
    #[error("missing Etag header in response")]
    MissingEtag,

    /// View lookups need the full design document name
    #[error("design doc name must start with _design/: {0:?}")]
    InvalidDesignDoc(String),
}

fn api_message(method: &str, url: &str, status: &StatusCode, error: &str, reason: &str) -> String {
    if error.is_empty() {
        format!("{} {}: {}", method, url, status.as_u16())
    } else {
        format!(
            "{} {}: ({}) {}: {}",
            method,
            url,
            status.as_u16(),
            error,
            reason
        )
    }
}

impl Error {
    pub(crate) fn protocol(found: &[u8], expected: &str) -> Self {
        Error::Protocol {
            found: String::from_utf8_lossy(found).into_owned(),
            expected: expected.to_string(),
        }
    }

    pub(crate) fn unexpected_eof(context: &str) -> Self {
        Error::Io(io::Error::new(io::ErrorKind::UnexpectedEof, context.to_string()))
    }

    /// Classify an error from an incremental JSON stream: transport
    /// failures and truncated values are I/O, everything else is decoding.
    pub(crate) fn from_stream(error: serde_json::Error) -> Self {
        if error.is_io() {
            Error::Io(error.into())
        } else if error.is_eof() {
            Error::unexpected_eof(&error.to_string())
        } else {
            Error::Decode(error)
        }
    }

    /// Whether this error terminates a feed
    pub fn is_fatal_to_feed(&self) -> bool {
        matches!(self, Error::Protocol { .. } | Error::Decode(_) | Error::Io(_))
    }

    /// HTTP status of an API error
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Check whether this is an API error with the given status
    pub fn has_status(&self, status: StatusCode) -> bool {
        self.status() == Some(status)
    }

    pub fn is_not_found(&self) -> bool {
        self.has_status(StatusCode::NOT_FOUND)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.has_status(StatusCode::UNAUTHORIZED)
    }

    pub fn is_conflict(&self) -> bool {
        self.has_status(StatusCode::CONFLICT)
    }
}

/// Result type for database operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(status: StatusCode, error: &str) -> Error {
        Error::Api {
            method: "GET".to_string(),
            url: "http://localhost:5984/mydb".to_string(),
            status,
            error: error.to_string(),
            reason: if error.is_empty() {
                String::new()
            } else {
                "missing".to_string()
            },
        }
    }

    #[test]
    fn test_protocol_error_display() {
        let err = Error::protocol(b"[", "{");
        let msg = err.to_string();
        assert!(msg.contains("\"[\""));
        assert!(msg.contains("\"{\""));
        assert!(err.is_fatal_to_feed());
    }

    #[test]
    fn test_api_error_display() {
        let err = api_error(StatusCode::NOT_FOUND, "not_found");
        assert_eq!(
            err.to_string(),
            "GET http://localhost:5984/mydb: (404) not_found: missing"
        );

        // HEAD requests carry no body
        let err = api_error(StatusCode::NOT_FOUND, "");
        assert_eq!(err.to_string(), "GET http://localhost:5984/mydb: 404");
    }

    #[test]
    fn test_status_helpers() {
        assert!(api_error(StatusCode::NOT_FOUND, "not_found").is_not_found());
        assert!(api_error(StatusCode::CONFLICT, "conflict").is_conflict());
        assert!(api_error(StatusCode::UNAUTHORIZED, "unauthorized").is_unauthorized());
        assert!(!api_error(StatusCode::CONFLICT, "conflict").is_not_found());
        assert!(!api_error(StatusCode::CONFLICT, "conflict").is_fatal_to_feed());
        assert!(Error::MissingEtag.status().is_none());
    }

    #[test]
    fn test_unexpected_eof_is_io() {
        let err = Error::unexpected_eof("stream closed");
        match err {
            Error::Io(ref e) => assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof),
            _ => panic!("Expected Io error"),
        }
    }
}
