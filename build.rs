// build.rs

use clap::{Arg, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common argument: compiler configuration file
fn config_arg() -> Arg {
    Arg::new("config")
        .short('c')
        .long("config")
        .value_name("FILE")
        .help("Compiler configuration file (TOML)")
}

/// Common argument: script file
fn script_arg() -> Arg {
    Arg::new("script").required(true).help("Path to the script")
}

fn build_cli() -> Command {
    Command::new("scriptweave")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Scriptweave Contributors")
        .about("Compile and migrate manager scripts in simulation documents")
        .subcommand_required(false)
        .subcommand(
            Command::new("compile")
                .about("Compile every script in a simulation document")
                .arg(Arg::new("document").required(true).help("Path to the simulation document (JSON)"))
                .arg(config_arg())
                .arg(
                    Arg::new("reference")
                        .short('r')
                        .long("reference")
                        .action(clap::ArgAction::Append)
                        .help("Additional reference passed to the compiler (repeatable)"),
                ),
        )
        .subcommand(
            Command::new("migrate")
                .about("Move variable references in every script according to rename rules")
                .arg(Arg::new("document").required(true).help("Path to the simulation document (JSON)"))
                .arg(
                    Arg::new("rules")
                        .short('r')
                        .long("rules")
                        .required(true)
                        .help("Rename rules file (TOML)"),
                )
                .arg(
                    Arg::new("dry_run")
                        .long("dry-run")
                        .action(clap::ArgAction::SetTrue)
                        .help("Report what would change without writing the document"),
                ),
        )
        .subcommand(
            Command::new("imports")
                .about("List the imports of a script file")
                .arg(script_arg()),
        )
        .subcommand(
            Command::new("declarations")
                .about("List the field declarations of a script file")
                .arg(script_arg()),
        )
        .subcommand(
            Command::new("calls")
                .about("List calls of a method on instances of a type in a script file")
                .arg(script_arg())
                .arg(Arg::new("type").short('t').long("type").required(true).help("Declared type of the instance"))
                .arg(Arg::new("method").short('m').long("method").required(true).help("Method name")),
        )
        .subcommand(
            Command::new("purge")
                .about("Delete stale compiled artifacts")
                .arg(config_arg()),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory - use CARGO_MANIFEST_DIR which is always set by cargo
    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let cmd = build_cli();
    let man = Man::new(cmd);
    let mut buffer = Vec::new();

    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("scriptweave.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
