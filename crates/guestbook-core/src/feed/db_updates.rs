//! `_db_updates` feed iterator

use std::io::{BufReader, Read};

use serde::{Deserialize, Serialize};
use serde_json::de::IoRead;
use serde_json::StreamDeserializer;
use tracing::{debug, warn};

use super::Feed;
use crate::couch::Error;

/// A database was created, updated or deleted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbUpdate {
    /// "created" | "updated" | "deleted"
    #[serde(rename = "type")]
    pub kind: String,
    /// Event operation status
    #[serde(default)]
    pub ok: bool,
    /// Name of the affected database
    pub db_name: String,
}

/// Iterator over the server-wide `_db_updates` feed.
///
/// Always continuous. Unlike a continuous `_changes` feed, the server
/// closing the stream is a clean end here.
pub struct DbUpdatesFeed<R: Read> {
    updates: Option<StreamDeserializer<'static, IoRead<BufReader<R>>, DbUpdate>>,
    event: Option<DbUpdate>,
    ended: bool,
    err: Option<Error>,
}

impl<R: Read> DbUpdatesFeed<R> {
    pub fn from_reader(reader: R) -> Self {
        let updates = serde_json::Deserializer::from_reader(BufReader::new(reader)).into_iter();
        Self {
            updates: Some(updates),
            event: None,
            ended: false,
            err: None,
        }
    }
}

impl<R: Read> Feed for DbUpdatesFeed<R> {
    type Event = DbUpdate;

    fn advance(&mut self) -> bool {
        self.event = None;
        if self.ended {
            return false;
        }
        let Some(updates) = self.updates.as_mut() else {
            self.ended = true;
            return false;
        };

        match updates.next() {
            Some(Ok(update)) => {
                self.err = None;
                self.event = Some(update);
                true
            }
            Some(Err(e)) => {
                let err = Error::from_stream(e);
                warn!(error = %err, "db updates feed failed");
                self.err = Some(err);
                self.close();
                false
            }
            None => {
                debug!("db updates feed ended");
                self.close();
                false
            }
        }
    }

    fn event(&self) -> Option<&DbUpdate> {
        self.event.as_ref()
    }

    fn err(&self) -> Option<&Error> {
        self.err.as_ref()
    }

    fn take_err(&mut self) -> Option<Error> {
        self.err.take()
    }

    fn close(&mut self) {
        self.ended = true;
        self.updates = None;
    }

    fn is_ended(&self) -> bool {
        self.ended
    }
}
