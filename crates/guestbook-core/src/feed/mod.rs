//! Streaming feeds
//!
//! Iterators over server-pushed notifications read straight from an open
//! HTTP response.
//!
//! ## Feeds
//!
//! - [`ChangesFeed`]: the `_changes` feed of one database, poll-style
//!   (`normal`, `longpoll`) or `continuous`
//! - [`DbUpdatesFeed`]: the server-wide `_db_updates` feed
//!
//! ## Usage
//!
//! ```ignore
//! let mut feed = db.changes(&Options::new())?;
//! while feed.advance() {
//!     if let Some(event) = feed.event() {
//!         println!("changed: {}", event.id);
//!     }
//! }
//! if let Some(err) = feed.take_err() {
//!     return Err(err);
//! }
//! ```
//!
//! A feed owns its connection. It is released when the feed ends, fails,
//! is closed, or is dropped, whichever comes first.

mod boundary;
mod changes;
mod db_updates;
mod event;
mod scanner;

pub use boundary::ObjectBoundary;
pub use changes::{ChangesFeed, FeedMode};
pub use db_updates::{DbUpdate, DbUpdatesFeed};
pub use event::{ChangeEvent, Sequence};
pub use scanner::Scanner;

use crate::couch::{Error, Result};

/// Iteration contract shared by all feeds
pub trait Feed {
    type Event;

    /// Move to the next event. Returns `false` once the feed has ended or
    /// failed; it never does I/O after that.
    fn advance(&mut self) -> bool;

    /// The current event, valid between a `true` advance and the next call
    fn event(&self) -> Option<&Self::Event>;

    /// The error that ended the feed, `None` after a clean end
    fn err(&self) -> Option<&Error>;

    /// Move the terminal error out of the feed
    fn take_err(&mut self) -> Option<Error>;

    /// Release the connection. Calling this more than once is harmless.
    fn close(&mut self);

    /// Whether the feed has ended
    fn is_ended(&self) -> bool;

    /// Drive the feed to its end, handing every event to `f`
    fn for_each_event<F>(&mut self, mut f: F) -> Result<()>
    where
        F: FnMut(&Self::Event),
    {
        while self.advance() {
            if let Some(event) = self.event() {
                f(event);
            }
        }
        match self.take_err() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
