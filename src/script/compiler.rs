// src/script/compiler.rs

//! Script registry and compiler driver
//!
//! Scripts are registered with a label (used in error messages) and a
//! callback. Identical script text is stored once and fans out to every
//! callback registered for it. All scripts compile together as one unit, so
//! scripts may refer to each other's types.
//!
//! A successful compile gives each script one instance of its class, shared
//! by all of that script's callbacks. A failed compile reports every
//! toolchain error against the script and line it came from:
//!
//! ```text
//! Manager1, Line 3: The type or namespace name 'Model' could not be found
//! ```

use super::parser::ScriptParser;
use super::toolchain::{CompiledModule, Diagnostic, ScriptInstance, Toolchain};
use super::unit::CompilationUnit;
use crate::config::CompilerConfig;
use crate::error::{Error, Result};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Label used for errors outside every script (the merged import header)
pub const UNIT_LABEL: &str = "<unit>";

/// Receives the instance created for a registered script
pub type InstanceCallback = Box<dyn FnMut(Arc<ScriptInstance>) + Send>;

/// Result of [`ScriptCompiler::compile`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileOutcome {
    /// The toolchain ran and every callback received its instance
    Compiled,
    /// Nothing changed since the last compile; the toolchain did not run
    UpToDate,
    /// The toolchain reported errors, one line per error and label
    Failed(String),
}

impl CompileOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Error text of a failed compile
    pub fn errors(&self) -> Option<&str> {
        match self {
            Self::Failed(errors) => Some(errors),
            _ => None,
        }
    }
}

struct Registration {
    label: String,
    callback: InstanceCallback,
    /// Received an instance from the current module
    delivered: bool,
}

struct Fragment {
    fingerprint: String,
    parser: ScriptParser,
    registrations: Vec<Registration>,
}

impl Fragment {
    fn has_pending(&self) -> bool {
        self.registrations.iter().any(|r| !r.delivered)
    }

    fn first_label(&self) -> &str {
        self.registrations
            .first()
            .map(|r| r.label.as_str())
            .unwrap_or_default()
    }
}

/// Compiles all registered scripts into one module
pub struct ScriptCompiler {
    toolchain: Box<dyn Toolchain>,
    /// Registration order
    fragments: Vec<Fragment>,
    /// Fingerprint to position in `fragments`
    index: HashMap<String, usize>,
    core_references: Vec<String>,
    references: Vec<String>,
    dirty: bool,
    did_compile: bool,
    module: Option<Box<dyn CompiledModule>>,
}

impl ScriptCompiler {
    /// Create a compiler with the default core references
    pub fn new(toolchain: Box<dyn Toolchain>) -> Self {
        Self::with_config(toolchain, &CompilerConfig::default())
    }

    pub fn with_config(toolchain: Box<dyn Toolchain>, config: &CompilerConfig) -> Self {
        Self {
            toolchain,
            fragments: Vec::new(),
            index: HashMap::new(),
            core_references: config.toolchain.core_references.clone(),
            references: Vec::new(),
            dirty: false,
            did_compile: false,
            module: None,
        }
    }

    /// Add references passed to the toolchain on top of the core set
    pub fn add_references<I, S>(&mut self, references: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for reference in references {
            let reference = reference.into();
            if !self.references.contains(&reference) {
                self.references.push(reference);
                self.dirty = true;
            }
        }
    }

    /// Core references followed by the caller's references
    pub fn references(&self) -> Vec<String> {
        let mut references = self.core_references.clone();
        for reference in &self.references {
            if !references.contains(reference) {
                references.push(reference.clone());
            }
        }
        references
    }

    /// Register a script
    ///
    /// `label` names the script in error messages. `callback` is invoked
    /// with the script's instance once it has been compiled. Empty text is
    /// ignored. Registering unchanged text again under the same label
    /// replaces the earlier callback.
    pub fn register<F>(&mut self, text: &str, label: impl Into<String>, callback: F)
    where
        F: FnMut(Arc<ScriptInstance>) + Send + 'static,
    {
        if text.is_empty() {
            return;
        }

        let registration = Registration {
            label: label.into(),
            callback: Box::new(callback),
            delivered: false,
        };

        let fingerprint = fingerprint(text);
        if let Some(&position) = self.index.get(&fingerprint) {
            let fragment = &mut self.fragments[position];
            if let Some(existing) = fragment
                .registrations
                .iter_mut()
                .find(|r| r.label == registration.label)
            {
                debug!("Script '{}' re-registered, replacing its callback", registration.label);
                *existing = registration;
                return;
            }
            debug!(
                "Script '{}' shares text with '{}'",
                registration.label,
                fragment.first_label()
            );
            fragment.registrations.push(registration);
            return;
        }

        debug!("Registered new script '{}'", registration.label);
        self.index.insert(fingerprint.clone(), self.fragments.len());
        self.fragments.push(Fragment {
            fingerprint,
            parser: ScriptParser::new(text),
            registrations: vec![registration],
        });
        self.dirty = true;
    }

    /// Compile all registered scripts
    ///
    /// When nothing changed since the last compile the toolchain is not run,
    /// but callbacks registered in the meantime still receive an instance
    /// from the existing module. Failure to resolve or construct a compiled
    /// type is an error; toolchain errors are returned as
    /// [`CompileOutcome::Failed`].
    pub fn compile(&mut self) -> Result<CompileOutcome> {
        if !self.dirty {
            self.did_compile = false;
            self.deliver()?;
            return Ok(CompileOutcome::UpToDate);
        }

        self.dirty = false;
        self.did_compile = true;
        self.module = None;

        let unit = CompilationUnit::build(self.fragments.iter().map(|f| &f.parser));
        let references = self.references();
        info!(
            "Compiling {} script(s), {} line(s)",
            self.fragments.len(),
            unit.line_count()
        );

        let output = match self.toolchain.compile(&unit, &references) {
            Ok(output) => output,
            Err(e) => {
                warn!("Toolchain failed: {}", e);
                return Ok(CompileOutcome::Failed(e.to_string()));
            }
        };

        if !output.diagnostics.is_empty() {
            warn!("Compilation reported {} error(s)", output.diagnostics.len());
            return Ok(CompileOutcome::Failed(
                self.error_message(&unit, &output.diagnostics),
            ));
        }

        let Some(module) = output.module else {
            return Err(Error::Toolchain(
                "compilation succeeded but produced no module".to_string(),
            ));
        };

        for fragment in &mut self.fragments {
            for registration in &mut fragment.registrations {
                registration.delivered = false;
            }
        }
        self.module = Some(module);
        self.deliver()?;

        Ok(CompileOutcome::Compiled)
    }

    /// Whether the last `compile` ran the toolchain
    pub fn did_compile(&self) -> bool {
        self.did_compile
    }

    /// Whether a script was registered since the last compile
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Number of distinct scripts
    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    /// Labels registered for `text`, in registration order
    pub fn labels_for(&self, text: &str) -> Vec<&str> {
        self.index
            .get(&fingerprint(text))
            .map(|&position| {
                self.fragments[position]
                    .registrations
                    .iter()
                    .map(|r| r.label.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Hand an instance to every callback that has not received one
    fn deliver(&mut self) -> Result<()> {
        let Some(module) = self.module.as_ref() else {
            return Ok(());
        };
        let type_names = module.type_names();

        for fragment in self.fragments.iter_mut().filter(|f| f.has_pending()) {
            let Some(class_name) = fragment.parser.class_name() else {
                debug!("Script '{}' declares no class", fragment.first_label());
                continue;
            };

            let Some(type_name) = type_names
                .iter()
                .find(|name| simple_name(name) == class_name)
            else {
                return Err(Error::TypeNotFound {
                    class_name,
                    label: fragment.first_label().to_string(),
                });
            };

            let instance = Arc::new(module.construct(type_name)?);
            debug!(
                "Created {} for script {}",
                instance.type_name(),
                &fragment.fingerprint[..12]
            );

            for registration in fragment.registrations.iter_mut().filter(|r| !r.delivered) {
                (registration.callback)(Arc::clone(&instance));
                registration.delivered = true;
            }
        }

        Ok(())
    }

    /// One line per diagnostic and label, in toolchain order
    fn error_message(&self, unit: &CompilationUnit, diagnostics: &[Diagnostic]) -> String {
        let mut message = String::new();
        for diagnostic in diagnostics {
            match unit.locate(diagnostic.line) {
                Some((position, line)) => {
                    for registration in &self.fragments[position].registrations {
                        message.push_str(&format!(
                            "{}, Line {}: {}\n",
                            registration.label, line, diagnostic.message
                        ));
                    }
                }
                None => message.push_str(&format!(
                    "{}, Line {}: {}\n",
                    UNIT_LABEL, diagnostic.line, diagnostic.message
                )),
            }
        }
        message
    }
}

/// SHA-256 of the script text, hex encoded
fn fingerprint(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

/// Type name without its namespace
fn simple_name(qualified: &str) -> &str {
    qualified.rsplit('.').next().unwrap_or(qualified)
}
