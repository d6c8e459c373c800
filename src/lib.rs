// src/lib.rs

//! Scriptweave
//!
//! Aggregation, compilation and migration of manager scripts embedded in
//! simulation documents.
//!
//! # Architecture
//!
//! - Scanning: scripts are line lists queried and rewritten with per-line
//!   patterns, never parsed into a syntax tree
//! - One unit: every registered script compiles together, so scripts can
//!   refer to each other
//! - Deduplication: identical script text compiles once and fans out to every
//!   caller that registered it
//! - Error attribution: toolchain errors are reported against the script and
//!   line they came from
//! - Migration: rename rules move variable references between model types

pub mod config;
pub mod document;
mod error;
pub mod migration;
pub mod script;

pub use config::{ArtifactConfig, CompilerConfig, ToolchainConfig};
pub use document::{Parameter, ScriptNode, SimulationDocument};
pub use error::{Error, Result};
pub use migration::{move_variables, RenameRule, RenameRules};
pub use script::{
    CommandToolchain, CompilationUnit, CompileOutcome, CompileOutput, CompiledModule, Declaration,
    Diagnostic, DiagnosticFormat, MethodCall, RegexOptions, ScriptCompiler, ScriptInstance,
    ScriptParser, Toolchain,
};
