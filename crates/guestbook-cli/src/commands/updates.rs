//! Database updates command handler

use anyhow::{Context, Result};

use guestbook_core::{Config, Feed, Options};

use crate::output::Output;

use super::require_client;

/// Print database events of the whole server until the feed ends
pub fn follow(config: &Config, output: &Output) -> Result<()> {
    let client = require_client(config)?;

    let mut feed = client
        .db_updates(&Options::new())
        .context("Failed to open database updates feed")?;
    feed.for_each_event(|update| output.print_db_update(update))
        .context("Database updates feed failed")?;

    Ok(())
}
