// src/cli.rs
//! CLI definitions for scriptweave
//!
//! This module contains all command-line interface definitions using clap.
//! The actual command implementations are in the `commands` module.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "scriptweave")]
#[command(author = "Scriptweave Contributors")]
#[command(version)]
#[command(about = "Compile and migrate manager scripts in simulation documents", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compile every script in a simulation document
    Compile {
        /// Path to the simulation document (JSON)
        document: String,

        /// Compiler configuration file (TOML)
        #[arg(short, long)]
        config: Option<String>,

        /// Additional reference passed to the compiler (repeatable)
        #[arg(short, long = "reference")]
        references: Vec<String>,
    },

    /// Move variable references in every script according to rename rules
    Migrate {
        /// Path to the simulation document (JSON)
        document: String,

        /// Rename rules file (TOML, one [[rule]] table per rule)
        #[arg(short, long)]
        rules: String,

        /// Report what would change without writing the document
        #[arg(long)]
        dry_run: bool,
    },

    /// List the imports of a script file
    Imports {
        /// Path to the script
        script: String,
    },

    /// List the field declarations of a script file
    Declarations {
        /// Path to the script
        script: String,
    },

    /// List calls of a method on instances of a type in a script file
    Calls {
        /// Path to the script
        script: String,

        /// Declared type of the instance, e.g. SoluteManager
        #[arg(short = 't', long = "type")]
        type_name: String,

        /// Method name
        #[arg(short, long)]
        method: String,
    },

    /// Delete stale compiled artifacts
    Purge {
        /// Compiler configuration file (TOML)
        #[arg(short, long)]
        config: Option<String>,
    },
}
