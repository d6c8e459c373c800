// src/script/toolchain.rs

//! Boundary between the compiler driver and the external compiler
//!
//! The driver only knows the [`Toolchain`] and [`CompiledModule`] traits.
//! [`CommandToolchain`] implements them by running a compiler program on a
//! source file written to the artifact store and scraping its error output.

use super::artifacts::{self, ArtifactStore};
use super::unit::CompilationUnit;
use crate::config::{CompilerConfig, ToolchainConfig};
use crate::error::{Error, Result};
use regex::Regex;
use serde::Deserialize;
use std::any::Any;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::LazyLock;
use tracing::{debug, info, warn};

/// `file(line,col): error CODE: message`
static MSBUILD_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<file>.+?)\((?P<line>\d+),(?P<col>\d+)\):\s*error\s+(?P<code>\w+):\s*(?P<message>.*)$",
    )
    .expect("msbuild pattern is valid")
});

/// `file:line:col: error: message`
static GNU_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<file>.+?):(?P<line>\d+):(?:(?P<col>\d+):)?\s*error:\s*(?P<message>.*)$")
        .expect("gnu pattern is valid")
});

/// An error reported by the toolchain against the compilation unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// 1-based unit line; 0 when the toolchain gave no position
    pub line: usize,
    pub column: Option<usize>,
    pub code: Option<String>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            column: None,
            code: None,
            message: message.into(),
        }
    }
}

/// Object produced from a compiled type
///
/// Shared between every callback registered for the same script.
pub struct ScriptInstance {
    type_name: String,
    object: Box<dyn Any + Send + Sync>,
}

impl ScriptInstance {
    pub fn new<T: Any + Send + Sync>(type_name: impl Into<String>, object: T) -> Self {
        Self {
            type_name: type_name.into(),
            object: Box::new(object),
        }
    }

    /// Qualified name of the type this instance was constructed from
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.object.downcast_ref::<T>()
    }
}

impl fmt::Debug for ScriptInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptInstance")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// A successfully compiled module
pub trait CompiledModule: Send {
    /// Qualified names of all types the module defines
    fn type_names(&self) -> Vec<String>;

    /// Construct an instance of the named type
    fn construct(&self, qualified_name: &str) -> Result<ScriptInstance>;
}

/// Result of one toolchain run
///
/// A module is only present when there are no diagnostics.
#[derive(Default)]
pub struct CompileOutput {
    pub diagnostics: Vec<Diagnostic>,
    pub module: Option<Box<dyn CompiledModule>>,
}

impl CompileOutput {
    pub fn success(module: Box<dyn CompiledModule>) -> Self {
        Self {
            diagnostics: Vec::new(),
            module: Some(module),
        }
    }

    pub fn failure(diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            diagnostics,
            module: None,
        }
    }
}

/// Compiles a unit against a list of references
pub trait Toolchain: Send {
    fn compile(&self, unit: &CompilationUnit, references: &[String]) -> Result<CompileOutput>;
}

/// Error line layout of the external compiler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticFormat {
    /// `file(line,col): error CODE: message` as printed by csc and mcs
    #[default]
    Msbuild,
    /// `file:line:col: error: message`
    Gnu,
}

impl DiagnosticFormat {
    /// Parse one output line; warnings and other chatter yield `None`
    pub fn parse_line(&self, line: &str) -> Option<Diagnostic> {
        let line = line.trim_end();
        let caps = match self {
            Self::Msbuild => MSBUILD_PATTERN.captures(line)?,
            Self::Gnu => GNU_PATTERN.captures(line)?,
        };

        Some(Diagnostic {
            line: caps["line"].parse().ok()?,
            column: caps.name("col").and_then(|c| c.as_str().parse().ok()),
            code: caps.name("code").map(|c| c.as_str().to_string()),
            message: caps["message"].trim().to_string(),
        })
    }

    pub fn parse_output(&self, output: &str) -> Vec<Diagnostic> {
        output.lines().filter_map(|line| self.parse_line(line)).collect()
    }
}

/// Handle to a type inside a compiled artifact, for the host's loader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactHandle {
    pub path: PathBuf,
    pub type_name: String,
}

/// Module produced by [`CommandToolchain`]
#[derive(Debug, Clone)]
pub struct ArtifactModule {
    path: PathBuf,
    type_names: Vec<String>,
}

impl ArtifactModule {
    pub fn new(path: impl Into<PathBuf>, type_names: Vec<String>) -> Self {
        Self {
            path: path.into(),
            type_names,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CompiledModule for ArtifactModule {
    fn type_names(&self) -> Vec<String> {
        self.type_names.clone()
    }

    fn construct(&self, qualified_name: &str) -> Result<ScriptInstance> {
        if !self.type_names.iter().any(|name| name == qualified_name) {
            return Err(Error::Construction {
                type_name: qualified_name.to_string(),
                reason: format!("not defined in {}", self.path.display()),
            });
        }

        Ok(ScriptInstance::new(
            qualified_name,
            ArtifactHandle {
                path: self.path.clone(),
                type_name: qualified_name.to_string(),
            },
        ))
    }
}

/// Toolchain driving an external compiler program
#[derive(Debug, Clone)]
pub struct CommandToolchain {
    config: ToolchainConfig,
    store: ArtifactStore,
}

impl CommandToolchain {
    /// Create a toolchain, performing one-time artifact setup if needed
    pub fn new(config: &CompilerConfig) -> Self {
        let store = ArtifactStore::from_config(&config.artifacts);
        artifacts::initialize(&store);
        Self {
            config: config.toolchain.clone(),
            store,
        }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Expand argument templates for one compilation
    fn arguments(&self, source: &Path, output: &Path, references: &[String]) -> Vec<String> {
        let source = source.to_string_lossy();
        let output = output.to_string_lossy();

        let mut args: Vec<String> = references
            .iter()
            .map(|reference| self.config.reference_arg.replace("{reference}", reference))
            .collect();
        args.extend(self.config.args.iter().map(|arg| {
            arg.replace("{source}", &source).replace("{output}", &output)
        }));
        args
    }
}

impl Toolchain for CommandToolchain {
    fn compile(&self, unit: &CompilationUnit, references: &[String]) -> Result<CompileOutput> {
        let paths = self.store.allocate(&self.config.output_extension)?;
        fs::write(&paths.source, unit.source())?;
        debug!("Wrote compilation unit to {}", paths.source.display());

        let args = self.arguments(&paths.source, &paths.output, references);
        info!("Running {} for {}", self.config.program, paths.name);

        let output = Command::new(&self.config.program)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                Error::Toolchain(format!("Failed to run {}: {}", self.config.program, e))
            })?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        let mut diagnostics = self.config.diagnostic_format.parse_output(&text);
        if !output.status.success() && diagnostics.is_empty() {
            warn!("{} exited with {} without reporting errors", self.config.program, output.status);
            let message = match text.trim() {
                "" => format!("{} exited with {}", self.config.program, output.status),
                trimmed => trimmed.to_string(),
            };
            diagnostics.push(Diagnostic::new(0, message));
        }

        if !diagnostics.is_empty() {
            return Ok(CompileOutput::failure(diagnostics));
        }

        Ok(CompileOutput::success(Box::new(ArtifactModule::new(
            paths.output,
            unit.declared_types().to_vec(),
        ))))
    }
}
