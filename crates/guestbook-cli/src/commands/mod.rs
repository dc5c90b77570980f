//! Command handlers

pub mod changes;
pub mod config;
pub mod serve;
pub mod updates;
pub mod visitors;

use anyhow::{Context, Result};

use guestbook_core::{Client, Config};

/// Client for the configured database server, failing when none is set
pub(crate) fn require_client(config: &Config) -> Result<Client> {
    config.database_client()?.with_context(|| {
        format!(
            "No database configured. Set CLOUDANT_URL or database_url in {}",
            Config::config_file_path().display()
        )
    })
}
