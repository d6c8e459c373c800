// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use scriptweave::{
    CompilationUnit, CompileOutput, CompiledModule, Diagnostic, Result, ScriptInstance, Toolchain,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Error the mock reports for a class deriving from `Model` without `using Models.Core;`
pub const MISSING_MODEL: &str = "The type or namespace name 'Model' could not be found (are you missing a using directive or an assembly reference?)";

/// Object the mock module constructs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockObject {
    pub type_name: String,
}

/// Counters shared between a test and its mock toolchain
#[derive(Debug, Clone, Default)]
pub struct MockState {
    compiles: Arc<AtomicUsize>,
    references: Arc<Mutex<Vec<String>>>,
    sources: Arc<Mutex<Vec<String>>>,
}

impl MockState {
    /// Number of times the toolchain ran
    pub fn compiles(&self) -> usize {
        self.compiles.load(Ordering::SeqCst)
    }

    /// References passed on the last run
    pub fn references(&self) -> Vec<String> {
        self.references.lock().unwrap().clone()
    }

    /// Unit source of the last run
    pub fn last_source(&self) -> Option<String> {
        self.sources.lock().unwrap().last().cloned()
    }
}

/// Toolchain that "compiles" by inspecting the unit text
///
/// - A line containing `: Model` is an error unless the unit imports `Models.Core`
/// - A line containing `#error` is an error
/// - Otherwise the module defines every class the scripts declare, except
///   classes whose name starts with `Hidden`
pub struct MockToolchain {
    state: MockState,
}

impl MockToolchain {
    pub fn new() -> (Self, MockState) {
        let state = MockState::default();
        (
            Self {
                state: state.clone(),
            },
            state,
        )
    }
}

impl Toolchain for MockToolchain {
    fn compile(&self, unit: &CompilationUnit, references: &[String]) -> Result<CompileOutput> {
        self.state.compiles.fetch_add(1, Ordering::SeqCst);
        *self.state.references.lock().unwrap() = references.to_vec();
        self.state.sources.lock().unwrap().push(unit.source().to_string());

        let has_core = unit.imports().iter().any(|import| import == "Models.Core");
        let mut diagnostics = Vec::new();
        for (index, line) in unit.source().lines().enumerate() {
            if line.contains(": Model") && !has_core {
                diagnostics.push(Diagnostic::new(index + 1, MISSING_MODEL));
            }
            if line.contains("#error") {
                diagnostics.push(Diagnostic::new(index + 1, "Error directive"));
            }
        }

        if !diagnostics.is_empty() {
            return Ok(CompileOutput::failure(diagnostics));
        }

        let types = unit
            .declared_types()
            .iter()
            .filter(|name| !name.rsplit('.').next().unwrap_or_default().starts_with("Hidden"))
            .cloned()
            .collect();
        Ok(CompileOutput::success(Box::new(MockModule { types })))
    }
}

pub struct MockModule {
    types: Vec<String>,
}

impl CompiledModule for MockModule {
    fn type_names(&self) -> Vec<String> {
        self.types.clone()
    }

    fn construct(&self, qualified_name: &str) -> Result<ScriptInstance> {
        if qualified_name.ends_with("Broken") {
            return Err(scriptweave::Error::Construction {
                type_name: qualified_name.to_string(),
                reason: "constructor threw".to_string(),
            });
        }
        Ok(ScriptInstance::new(
            qualified_name,
            MockObject {
                type_name: qualified_name.to_string(),
            },
        ))
    }
}

/// Instances received by callbacks
pub type Received = Arc<Mutex<Vec<Arc<ScriptInstance>>>>;

/// A callback that records every instance it receives
pub fn recorder() -> (Received, impl FnMut(Arc<ScriptInstance>) + Send + 'static) {
    let received: Received = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    (received, move |instance: Arc<ScriptInstance>| sink.lock().unwrap().push(instance))
}

/// A script in namespace `Models` declaring `class_name : Model`
pub fn model_script(class_name: &str, with_core: bool) -> String {
    let mut script = String::new();
    if with_core {
        script.push_str("using Models.Core;\n");
    }
    script.push_str("using System;\n");
    script.push_str("namespace Models\n");
    script.push_str("{\n");
    script.push_str(&format!("    class {} : Model\n", class_name));
    script.push_str("    {\n");
    script.push_str("    }\n");
    script.push_str("}\n");
    script
}
