// src/commands.rs
//! Command handlers for the scriptweave CLI

use anyhow::{Context, Result};
use scriptweave::script::artifacts::ArtifactStore;
use scriptweave::{
    CommandToolchain, CompileOutcome, CompilerConfig, RenameRules, ScriptCompiler, ScriptParser,
    SimulationDocument,
};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::info;

/// Load the compiler configuration, or the defaults when no file is given
fn load_config(config: Option<&str>) -> Result<CompilerConfig> {
    match config {
        Some(path) => CompilerConfig::load(Path::new(path))
            .with_context(|| format!("Failed to load configuration from {}", path)),
        None => Ok(CompilerConfig::default()),
    }
}

fn read_script(path: &str) -> Result<ScriptParser> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read script: {}", path))?;
    Ok(ScriptParser::new(&text))
}

/// Compile all scripts of a document
pub fn cmd_compile(document: &str, config: Option<&str>, references: &[String]) -> Result<()> {
    let config = load_config(config)?;
    let simulation = SimulationDocument::load(Path::new(document))
        .with_context(|| format!("Failed to load simulation document: {}", document))?;

    let toolchain = CommandToolchain::new(&config);
    let mut compiler = ScriptCompiler::with_config(Box::new(toolchain), &config);
    compiler.add_references(references.iter().cloned());

    let created = Arc::new(AtomicUsize::new(0));
    let nodes = simulation.script_nodes();
    for node in &nodes {
        let created = Arc::clone(&created);
        compiler.register(&node.code, node.path.clone(), move |instance| {
            info!("Created instance of {}", instance.type_name());
            created.fetch_add(1, Ordering::SeqCst);
        });
    }

    if compiler.fragment_count() == 0 {
        println!("No scripts found in {}", document);
        return Ok(());
    }

    info!(
        "Compiling {} distinct script(s) from {} node(s)",
        compiler.fragment_count(),
        nodes.len()
    );

    match compiler.compile()? {
        CompileOutcome::Compiled | CompileOutcome::UpToDate => {
            println!(
                "Compiled {} script(s), {} instance(s) delivered",
                compiler.fragment_count(),
                created.load(Ordering::SeqCst)
            );
            Ok(())
        }
        CompileOutcome::Failed(errors) => {
            eprint!("{}", errors);
            Err(anyhow::anyhow!("Compilation of {} failed", document))
        }
    }
}

/// Apply rename rules to every script of a document
pub fn cmd_migrate(document: &str, rules: &str, dry_run: bool) -> Result<()> {
    let rules = RenameRules::load(Path::new(rules))
        .with_context(|| format!("Failed to load rename rules: {}", rules))?;
    let path = Path::new(document);
    let mut simulation = SimulationDocument::load(path)
        .with_context(|| format!("Failed to load simulation document: {}", document))?;

    let before = simulation.script_nodes();
    let changed = simulation.move_variables(&rules.rules)?;

    if changed == 0 {
        println!("No scripts needed changes");
        return Ok(());
    }

    for (old, new) in before.iter().zip(simulation.script_nodes()) {
        if old.code != new.code {
            println!("  Updated: {}", new.path);
        }
    }

    if dry_run {
        println!("Dry run: {} script(s) would change", changed);
        return Ok(());
    }

    simulation.save(path)?;
    println!("Updated {} script(s) in {}", changed, document);
    Ok(())
}

/// Print the imports of a script
pub fn cmd_imports(script: &str) -> Result<()> {
    let parser = read_script(script)?;
    for import in parser.imports() {
        println!("{}", import);
    }
    Ok(())
}

/// Print the field declarations of a script
pub fn cmd_declarations(script: &str) -> Result<()> {
    let parser = read_script(script)?;
    let declarations = parser.declarations();

    if declarations.is_empty() {
        println!("No declarations found");
        return Ok(());
    }

    for declaration in declarations {
        let visibility = if declaration.is_event {
            "event"
        } else if declaration.is_private {
            "private"
        } else {
            "public"
        };
        let line = declaration.line_index.map(|l| l + 1).unwrap_or_default();
        println!(
            "{:>5}  {:<8} {} {} {}",
            line,
            visibility,
            declaration.type_name,
            declaration.instance_name,
            declaration.attributes.join(" ")
        );
    }
    Ok(())
}

/// Print calls of a method on instances of a type
pub fn cmd_calls(script: &str, type_name: &str, method: &str) -> Result<()> {
    let parser = read_script(script)?;
    for call in parser.find_method_calls(type_name, method) {
        println!(
            "{:>5}  {}.{}({})",
            call.line_index + 1,
            call.instance_name,
            call.method_name,
            call.arguments.join(", ")
        );
    }
    Ok(())
}

/// Delete stale artifacts
pub fn cmd_purge(config: Option<&str>) -> Result<()> {
    let config = load_config(config)?;
    let store = ArtifactStore::from_config(&config.artifacts);
    let removed = store.purge_stale();
    println!("Removed {} stale artifact(s) from {}", removed, store.dir().display());
    Ok(())
}
