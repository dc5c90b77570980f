//! Config command handlers

use std::path::PathBuf;

use anyhow::Result;
use url::Url;

use guestbook_core::Config;

use crate::output::{Output, OutputFormat};

/// Show current configuration
pub fn show(config: &Config, config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let database_url = config.database_url.as_deref().map(redact_credentials);

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "database_url": database_url,
                    "db_name": config.db_name,
                    "port": config.port,
                    "request_timeout_secs": config.request_timeout_secs,
                    "log_level": config.log_level
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", config.db_name);
        }
        OutputFormat::Human => {
            let effective_path = config_path
                .cloned()
                .unwrap_or_else(Config::config_file_path);
            println!("Configuration:");
            println!(
                "  database_url:         {}",
                database_url.as_deref().unwrap_or("(not set)")
            );
            println!("  db_name:              {}", config.db_name);
            println!("  port:                 {}", config.port);
            println!("  request_timeout_secs: {}", config.request_timeout_secs);
            println!("  log_level:            {}", config.log_level);
            println!();
            println!("Config file: {}", effective_path.display());
        }
    }

    Ok(())
}

/// Hide the password of a URL with user info
fn redact_credentials(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) if parsed.password().is_some() => {
            let _ = parsed.set_password(Some("***"));
            parsed.to_string()
        }
        _ => url.to_string(),
    }
}
