//! Changes command handler

use anyhow::{Context, Result};

use guestbook_core::{Config, Feed, Options};

use crate::output::Output;

use super::require_client;

/// Flags of `guestbook changes`
#[derive(Debug, Clone, Default)]
pub struct ChangesArgs {
    pub continuous: bool,
    pub since: Option<String>,
    pub include_docs: bool,
    pub limit: Option<u64>,
}

impl ChangesArgs {
    /// Query options for the `_changes` request
    pub fn to_options(&self) -> Options {
        let mut options = Options::new();
        if self.continuous {
            options.set("feed", "continuous");
        }
        if let Some(since) = &self.since {
            options.set("since", since.as_str());
        }
        if self.include_docs {
            options.set("include_docs", true);
        }
        if let Some(limit) = self.limit {
            options.set("limit", limit);
        }
        options
    }
}

/// Print changes to the guestbook database until the feed ends
pub fn follow(config: &Config, args: &ChangesArgs, output: &Output) -> Result<()> {
    let client = require_client(config)?;
    let db = client.db(&config.db_name);

    let mut feed = db
        .changes(&args.to_options())
        .with_context(|| format!("Failed to open changes feed of '{}'", config.db_name))?;
    feed.for_each_event(|event| output.print_change(event))
        .context("Changes feed failed")?;

    output.print_last_seq(feed.last_seq());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_default_options_are_empty() {
        assert!(ChangesArgs::default().to_options().is_empty());
    }

    #[test]
    fn test_options_from_flags() {
        let args = ChangesArgs {
            continuous: true,
            since: Some("now".to_string()),
            include_docs: true,
            limit: Some(10),
        };
        let options = args.to_options();
        assert_eq!(options.get("feed"), Some(&Value::from("continuous")));
        assert_eq!(options.get("since"), Some(&Value::from("now")));
        assert_eq!(options.get("include_docs"), Some(&Value::from(true)));
        assert_eq!(options.get("limit"), Some(&Value::from(10u64)));
    }
}
