// src/error.rs

//! Error types for script compilation and migration

use thiserror::Error;

/// Result type alias using the crate error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the script subsystem
///
/// Structural misses (a query that finds nothing) are never errors; they
/// come back as empty results. Compilation diagnostics are data, returned
/// through [`crate::CompileOutcome::Failed`].
#[derive(Error, Debug)]
pub enum Error {
    /// A rename rule's old name is not of the form `Type.member`
    #[error("Invalid old variable name in rename rule: {0}")]
    InvalidRenameRule(String),

    /// A caller-supplied regular expression failed to compile
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The toolchain could not be driven
    #[error("Toolchain error: {0}")]
    Toolchain(String),

    /// A fragment's class was not among the types the compiled module lists
    #[error("Type '{class_name}' for script '{label}' not found in compiled module")]
    TypeNotFound { class_name: String, label: String },

    /// A compiled type could not be constructed
    #[error("Failed to construct '{type_name}': {reason}")]
    Construction { type_name: String, reason: String },

    /// Configuration could not be read or is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// Simulation document is malformed
    #[error("Document error: {0}")]
    Document(String),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
