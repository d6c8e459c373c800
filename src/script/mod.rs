// src/script/mod.rs

//! Manager script handling
//!
//! - [`parser`] - Line-oriented structural scanning and rewriting of one script
//! - [`unit`] - Merging scripts into one compilation unit with line mapping
//! - [`compiler`] - Script registry and compiler driver
//! - [`toolchain`] - External compiler boundary
//! - [`artifacts`] - Compiled artifacts in temporary storage

pub mod artifacts;
pub mod compiler;
pub mod parser;
pub mod toolchain;
pub mod unit;

pub use compiler::{CompileOutcome, InstanceCallback, ScriptCompiler, UNIT_LABEL};
pub use parser::{Declaration, MethodCall, RegexOptions, ScriptParser};
pub use toolchain::{
    ArtifactHandle, ArtifactModule, CommandToolchain, CompileOutput, CompiledModule, Diagnostic,
    DiagnosticFormat, ScriptInstance, Toolchain,
};
pub use unit::{CompilationUnit, FragmentSpan};
