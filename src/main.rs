// src/main.rs

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Compile {
            document,
            config,
            references,
        }) => commands::cmd_compile(&document, config.as_deref(), &references),
        Some(Commands::Migrate {
            document,
            rules,
            dry_run,
        }) => commands::cmd_migrate(&document, &rules, dry_run),
        Some(Commands::Imports { script }) => commands::cmd_imports(&script),
        Some(Commands::Declarations { script }) => commands::cmd_declarations(&script),
        Some(Commands::Calls {
            script,
            type_name,
            method,
        }) => commands::cmd_calls(&script, &type_name, &method),
        Some(Commands::Purge { config }) => commands::cmd_purge(config.as_deref()),
        None => {
            // No command provided, show help
            println!("scriptweave v{}", env!("CARGO_PKG_VERSION"));
            println!("Run 'scriptweave --help' for usage information");
            Ok(())
        }
    }
}
