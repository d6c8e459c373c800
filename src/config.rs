// src/config.rs
//! Configuration file parsing for the script compiler
//!
//! Supports TOML configuration files with the following sections:
//! - [artifacts] - Artifact directory, file name prefix, retention window
//! - [toolchain] - Compiler program, argument templates, core references
//!
//! Every field has a default, so an empty file is a valid configuration.

use crate::error::{Error, Result};
use crate::script::toolchain::DiagnosticFormat;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// TOML configuration file structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompilerConfig {
    /// Artifact storage settings
    #[serde(default)]
    pub artifacts: ArtifactConfig,

    /// External compiler settings
    #[serde(default)]
    pub toolchain: ToolchainConfig,
}

/// Artifact storage section
#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactConfig {
    /// Directory holding generated sources and compiled modules
    #[serde(default = "default_artifact_dir")]
    pub dir: PathBuf,

    /// File name prefix marking files owned by the compiler
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Artifacts idle for longer than this are purged
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            dir: default_artifact_dir(),
            prefix: default_prefix(),
            retention_secs: default_retention_secs(),
        }
    }
}

/// External compiler section
///
/// Argument templates may contain `{source}` and `{output}`. The
/// `reference_arg` template is expanded once per reference via `{reference}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolchainConfig {
    #[serde(default = "default_program")]
    pub program: String,

    #[serde(default = "default_args")]
    pub args: Vec<String>,

    #[serde(default = "default_reference_arg")]
    pub reference_arg: String,

    /// How the compiler prints errors
    #[serde(default)]
    pub diagnostic_format: DiagnosticFormat,

    /// References passed to every compilation
    #[serde(default = "default_core_references")]
    pub core_references: Vec<String>,

    /// Extension of the compiled module
    #[serde(default = "default_output_extension")]
    pub output_extension: String,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
            reference_arg: default_reference_arg(),
            diagnostic_format: DiagnosticFormat::default(),
            core_references: default_core_references(),
            output_extension: default_output_extension(),
        }
    }
}

fn default_artifact_dir() -> PathBuf {
    std::env::temp_dir()
}

fn default_prefix() -> String {
    "SW".to_string()
}

fn default_retention_secs() -> u64 {
    3600
}

fn default_program() -> String {
    "mcs".to_string()
}

fn default_args() -> Vec<String> {
    ["-target:library", "-debug", "-warn:2", "-out:{output}", "{source}"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_reference_arg() -> String {
    "-r:{reference}".to_string()
}

fn default_core_references() -> Vec<String> {
    ["System.dll", "System.Xml.dll", "System.Data.dll", "System.Core.dll"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_output_extension() -> String {
    "dll".to_string()
}

impl CompilerConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        let config: CompilerConfig = toml::from_str(&content).map_err(|e| {
            Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.artifacts.prefix.is_empty() {
            return Err(Error::Config("artifacts.prefix must not be empty".to_string()));
        }
        if self
            .artifacts
            .prefix
            .contains(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        {
            return Err(Error::Config(format!(
                "artifacts.prefix must be alphanumeric, got '{}'",
                self.artifacts.prefix
            )));
        }

        if self.toolchain.program.trim().is_empty() {
            return Err(Error::Config("toolchain.program must not be empty".to_string()));
        }
        if !self.toolchain.args.iter().any(|arg| arg.contains("{source}")) {
            return Err(Error::Config(
                "toolchain.args must pass the source file via {source}".to_string(),
            ));
        }
        if !self.toolchain.reference_arg.contains("{reference}") {
            return Err(Error::Config(
                "toolchain.reference_arg must contain {reference}".to_string(),
            ));
        }
        if self.toolchain.output_extension.is_empty() || self.toolchain.output_extension == "cs" {
            return Err(Error::Config(format!(
                "toolchain.output_extension is invalid: '{}'",
                self.toolchain.output_extension
            )));
        }

        Ok(())
    }
}
