//! Guestbook CLI
//!
//! Command-line interface and web server for the guestbook.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use guestbook_core::Config;

mod commands;
mod output;

use commands::changes::ChangesArgs;
use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "guestbook")]
#[command(about = "Guestbook - sign in, see who came by, follow the database")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Config file to use instead of the default
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the web server
    Serve {
        /// Port to listen on (defaults to PORT or the config file)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Manage visitors
    Visitors {
        #[command(subcommand)]
        command: VisitorCommands,
    },
    /// Follow the changes feed of the guestbook database
    Changes {
        /// Keep the feed open and stream changes as they happen
        #[arg(short, long)]
        continuous: bool,
        /// Start after this sequence ("now" skips history)
        #[arg(long)]
        since: Option<String>,
        /// Include the changed documents
        #[arg(long)]
        include_docs: bool,
        /// Stop after this many changes
        #[arg(long)]
        limit: Option<u64>,
    },
    /// Follow database creation, updates and deletion on the server
    Updates,
    /// Show configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum VisitorCommands {
    /// Sign the guestbook
    #[command(alias = "sign")]
    Add {
        /// Visitor name
        name: String,
    },
    /// List all visitors
    #[command(alias = "ls")]
    List,
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    let config = Config::load_with_cli_override(cli.config.as_ref())?;
    init_logging(&config.log_level);

    match cli.command {
        Commands::Serve { port } => commands::serve::run(&config, port, &output),
        Commands::Visitors { command } => match command {
            VisitorCommands::Add { name } => commands::visitors::add(&config, name, &output),
            VisitorCommands::List => commands::visitors::list(&config, &output),
        },
        Commands::Changes {
            continuous,
            since,
            include_docs,
            limit,
        } => {
            let args = ChangesArgs {
                continuous,
                since,
                include_docs,
                limit,
            };
            commands::changes::follow(&config, &args, &output)
        }
        Commands::Updates => commands::updates::follow(&config, &output),
        Commands::Config { command } => match command {
            Some(ConfigCommands::Show) | None => {
                commands::config::show(&config, cli.config.as_ref(), &output)
            }
        },
    }
}

/// Log to stderr so stdout stays clean for command output.
///
/// `RUST_LOG` wins over the configured level.
fn init_logging(log_level: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "guestbook_core={},guestbook_cli={}",
            log_level, log_level
        ))
    });

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_changes_flags() {
        let cli = Cli::parse_from([
            "guestbook",
            "changes",
            "--continuous",
            "--since",
            "now",
            "--limit",
            "5",
            "--json",
        ]);
        assert!(cli.json);
        match cli.command {
            Commands::Changes {
                continuous,
                since,
                include_docs,
                limit,
            } => {
                assert!(continuous);
                assert_eq!(since.as_deref(), Some("now"));
                assert!(!include_docs);
                assert_eq!(limit, Some(5));
            }
            _ => panic!("Expected changes command"),
        }
    }

    #[test]
    fn test_parse_visitor_alias() {
        let cli = Cli::parse_from(["guestbook", "visitors", "sign", "Bob", "-q"]);
        assert!(cli.quiet);
        assert!(matches!(
            cli.command,
            Commands::Visitors {
                command: VisitorCommands::Add { ref name }
            } if name == "Bob"
        ));
    }

    #[test]
    fn test_parse_global_config_path() {
        let cli = Cli::parse_from(["guestbook", "--config", "/tmp/gb.toml", "config"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/gb.toml")));
        assert!(matches!(cli.command, Commands::Config { command: None }));
    }
}
