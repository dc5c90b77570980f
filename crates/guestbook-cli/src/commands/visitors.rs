//! Visitor command handlers

use anyhow::{Context, Result};

use guestbook_core::{Config, Guestbook};

use crate::output::Output;

use super::require_client;

fn open(config: &Config) -> Result<Guestbook> {
    let client = require_client(config)?;
    Guestbook::open(&client, &config.db_name)
        .with_context(|| format!("Failed to open database '{}'", config.db_name))
}

/// Sign the guestbook
pub fn add(config: &Config, name: String, output: &Output) -> Result<()> {
    let guestbook = open(config)?;
    let greeting = guestbook
        .record_visitor(&name)
        .context("Failed to record visitor")?;
    output.success(&greeting);
    Ok(())
}

/// List everyone who signed the guestbook
pub fn list(config: &Config, output: &Output) -> Result<()> {
    let guestbook = open(config)?;
    let names = guestbook.visitors().context("Failed to fetch visitors")?;
    output.print_visitors(&names);
    Ok(())
}
