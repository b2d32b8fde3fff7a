//! # toolbridge-cli
//!
//! Command-line interface for Toolbridge.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use toolbridge_core::error::format_error_with_suggestion;
use toolbridge_core::Config;

mod commands;

/// Application context containing shared state.
pub struct AppContext {
    pub config: Config,
}

/// Toolbridge - expose MCP server tools to local callers
#[derive(Parser)]
#[command(name = "toolbridge")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// MCP servers file (defaults to the configured one)
    #[arg(short, long, global = true, value_name = "PATH", env = "TOOLBRIDGE_SERVERS_FILE")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured MCP servers
    Servers,
    /// Start every server and list the tools they provide
    Tools {
        /// Print each tool's input schema
        #[arg(long)]
        schema: bool,
    },
    /// Call a tool and print its result
    Call {
        /// Tool name
        tool: String,
        /// Arguments as a JSON object
        #[arg(value_name = "ARGS_JSON")]
        args: Option<String>,
        /// Only consider tools from this server
        #[arg(short, long)]
        server: Option<String>,
    },
    /// Diagnose configuration issues
    Doctor,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging; stdout is reserved for command output
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    // Load configuration
    let mut config = Config::load_validated().unwrap_or_else(|e| {
        tracing::warn!(
            "Failed to load config, using defaults: {}",
            format_error_with_suggestion(&e)
        );
        Config::default()
    });
    if let Some(path) = cli.config {
        config.client.servers_file = Some(path);
    }

    let ctx = AppContext { config };

    match cli.command {
        Commands::Servers => commands::servers::run(&ctx)?,
        Commands::Tools { schema } => commands::tools::run(&ctx, schema).await?,
        Commands::Call { tool, args, server } => {
            commands::call::run(&ctx, &tool, args.as_deref(), server.as_deref()).await?
        }
        Commands::Doctor => commands::doctor::run(&ctx)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_call_with_global_flags() {
        let cli = Cli::try_parse_from([
            "toolbridge",
            "call",
            "read_file",
            r#"{"path": "/tmp/x"}"#,
            "--server",
            "files",
            "--config",
            "/tmp/mcp.json",
            "-v",
        ])
        .unwrap();

        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/mcp.json")));
        match cli.command {
            Commands::Call { tool, args, server } => {
                assert_eq!(tool, "read_file");
                assert_eq!(args.as_deref(), Some(r#"{"path": "/tmp/x"}"#));
                assert_eq!(server.as_deref(), Some("files"));
            }
            _ => panic!("expected call command"),
        }
    }

    #[test]
    fn test_parse_tools_schema() {
        let cli = Cli::try_parse_from(["toolbridge", "tools", "--schema"]).unwrap();
        assert!(matches!(cli.command, Commands::Tools { schema: true }));
    }

    #[test]
    fn test_subcommand_is_required() {
        assert!(Cli::try_parse_from(["toolbridge"]).is_err());
    }
}
