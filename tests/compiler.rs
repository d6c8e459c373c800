// tests/compiler.rs

//! Compiler driver tests: deduplication, caching, error attribution, instance delivery.

mod common;

use common::{model_script, recorder, MockObject, MockToolchain, MISSING_MODEL};
use scriptweave::{
    CompilationUnit, CompileOutcome, CompileOutput, Error, Result, ScriptCompiler, Toolchain,
};
use std::sync::Arc;

#[test]
fn test_compile_two_scripts() {
    let (toolchain, state) = MockToolchain::new();
    let mut compiler = ScriptCompiler::new(Box::new(toolchain));

    let (s1, on_s1) = recorder();
    let (s2, on_s2) = recorder();
    compiler.register(&model_script("S1", true), "TestS1", on_s1);
    compiler.register(&model_script("S2", true), "TestS1", on_s2);

    assert_eq!(compiler.compile().unwrap(), CompileOutcome::Compiled);
    assert_eq!(state.compiles(), 1);

    let s1 = s1.lock().unwrap();
    let s2 = s2.lock().unwrap();
    assert_eq!(s1.len(), 1);
    assert_eq!(s2.len(), 1);
    assert_eq!(s1[0].type_name(), "Models.S1");
    assert_eq!(
        s2[0].downcast_ref::<MockObject>(),
        Some(&MockObject {
            type_name: "Models.S2".to_string()
        })
    );
}

#[test]
fn test_successive_compiles_run_toolchain_once() {
    let (toolchain, state) = MockToolchain::new();
    let mut compiler = ScriptCompiler::new(Box::new(toolchain));

    let (s1, on_s1) = recorder();
    compiler.register(&model_script("S1", true), "TestS1", on_s1);

    assert_eq!(compiler.compile().unwrap(), CompileOutcome::Compiled);
    assert!(compiler.did_compile());
    assert_eq!(s1.lock().unwrap().len(), 1);

    assert_eq!(compiler.compile().unwrap(), CompileOutcome::UpToDate);
    assert!(!compiler.did_compile());
    assert_eq!(state.compiles(), 1);
    assert_eq!(s1.lock().unwrap().len(), 1);
}

#[test]
fn test_three_scripts_with_errors() {
    let bad_script = "namespace Models
{
    class S2 : Model
    {
    }
}
";
    let (toolchain, _state) = MockToolchain::new();
    let mut compiler = ScriptCompiler::new(Box::new(toolchain));

    let (s1, on_s1) = recorder();
    let (s2, on_s2) = recorder();
    let (s3, on_s3) = recorder();
    compiler.register(bad_script, "TestS1", on_s1);
    compiler.register(bad_script, "TestS2", on_s2);
    compiler.register(bad_script, "TestS3", on_s3);
    assert_eq!(compiler.fragment_count(), 1);

    let outcome = compiler.compile().unwrap();
    assert_eq!(
        outcome,
        CompileOutcome::Failed(format!(
            "TestS1, Line 3: {m}\nTestS2, Line 3: {m}\nTestS3, Line 3: {m}\n",
            m = MISSING_MODEL
        ))
    );
    assert!(s1.lock().unwrap().is_empty());
    assert!(s2.lock().unwrap().is_empty());
    assert!(s3.lock().unwrap().is_empty());
}

#[test]
fn test_shared_script_errors_report_script_lines_not_unit_lines() {
    // the merged header has two lines, this script's import block has three
    let bad_script = "using System;
// climate inputs
using Models.Climate;
namespace Models
{
    class S2 : Model
    {
    }
}
";
    let (toolchain, state) = MockToolchain::new();
    let mut compiler = ScriptCompiler::new(Box::new(toolchain));
    compiler.register(bad_script, "TestS1", |_| {});
    compiler.register(bad_script, "TestS2", |_| {});
    compiler.register(bad_script, "TestS3", |_| {});

    let outcome = compiler.compile().unwrap();

    let source = state.last_source().unwrap();
    let unit_line = source.lines().position(|line| line.contains(": Model")).unwrap() + 1;
    assert_eq!(unit_line, 5);
    assert_eq!(
        outcome,
        CompileOutcome::Failed(format!(
            "TestS1, Line 6: {m}\nTestS2, Line 6: {m}\nTestS3, Line 6: {m}\n",
            m = MISSING_MODEL
        ))
    );
}

#[test]
fn test_errors_map_to_lines_of_their_own_script() {
    let second = "using System;
namespace Models
{
#error oops
    class B : Model
    {
    }
}
";
    let (toolchain, _state) = MockToolchain::new();
    let mut compiler = ScriptCompiler::new(Box::new(toolchain));
    compiler.register(&model_script("A", true), "A", |_| {});
    compiler.register(second, "B", |_| {});

    let outcome = compiler.compile().unwrap();
    assert_eq!(outcome.errors(), Some("B, Line 4: Error directive\n"));
}

#[test]
fn test_identical_registration_shares_one_instance() {
    let (toolchain, state) = MockToolchain::new();
    let mut compiler = ScriptCompiler::new(Box::new(toolchain));

    let script = model_script("Shared", true);
    let (first, on_first) = recorder();
    let (second, on_second) = recorder();
    compiler.register(&script, "First", on_first);
    compiler.register(&script, "Second", on_second);

    assert_eq!(compiler.compile().unwrap(), CompileOutcome::Compiled);
    assert_eq!(state.compiles(), 1);

    let first = first.lock().unwrap();
    let second = second.lock().unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 1);
    assert!(Arc::ptr_eq(&first[0], &second[0]));
}

#[test]
fn test_late_registration_is_served_from_last_module() {
    let (toolchain, state) = MockToolchain::new();
    let mut compiler = ScriptCompiler::new(Box::new(toolchain));

    let script = model_script("S1", true);
    let (early, on_early) = recorder();
    compiler.register(&script, "Early", on_early);
    compiler.compile().unwrap();

    let (late, on_late) = recorder();
    compiler.register(&script, "Late", on_late);
    assert!(!compiler.is_dirty());

    assert_eq!(compiler.compile().unwrap(), CompileOutcome::UpToDate);
    assert_eq!(state.compiles(), 1);
    assert_eq!(early.lock().unwrap().len(), 1);
    assert_eq!(late.lock().unwrap().len(), 1);
}

#[test]
fn test_new_script_recompiles_everything() {
    let (toolchain, state) = MockToolchain::new();
    let mut compiler = ScriptCompiler::new(Box::new(toolchain));

    let (s1, on_s1) = recorder();
    compiler.register(&model_script("S1", true), "S1", on_s1);
    compiler.compile().unwrap();

    let (s2, on_s2) = recorder();
    compiler.register(&model_script("S2", true), "S2", on_s2);
    assert!(compiler.is_dirty());

    assert_eq!(compiler.compile().unwrap(), CompileOutcome::Compiled);
    assert_eq!(state.compiles(), 2);
    assert_eq!(s1.lock().unwrap().len(), 2);
    assert_eq!(s2.lock().unwrap().len(), 1);
}

#[test]
fn test_unit_merges_imports_once() {
    let (toolchain, state) = MockToolchain::new();
    let mut compiler = ScriptCompiler::new(Box::new(toolchain));
    compiler.register(&model_script("S1", true), "S1", |_| {});
    compiler.register(&model_script("S2", true), "S2", |_| {});
    compiler.compile().unwrap();

    let source = state.last_source().unwrap();
    assert!(source.starts_with("using Models.Core;\nusing System;\nnamespace Models\n"));
    assert_eq!(source.matches("using Models.Core;").count(), 1);
}

#[test]
fn test_references_passed_to_toolchain() {
    let (toolchain, state) = MockToolchain::new();
    let mut compiler = ScriptCompiler::new(Box::new(toolchain));
    compiler.add_references(["Models.dll"]);
    compiler.register(&model_script("S1", true), "S1", |_| {});
    compiler.compile().unwrap();

    assert_eq!(
        state.references(),
        [
            "System.dll",
            "System.Xml.dll",
            "System.Data.dll",
            "System.Core.dll",
            "Models.dll"
        ]
    );
}

#[test]
fn test_missing_type_is_an_error() {
    let (toolchain, _state) = MockToolchain::new();
    let mut compiler = ScriptCompiler::new(Box::new(toolchain));
    compiler.register(&model_script("HiddenThing", true), "Hidden", |_| {});

    match compiler.compile() {
        Err(Error::TypeNotFound { class_name, label }) => {
            assert_eq!(class_name, "HiddenThing");
            assert_eq!(label, "Hidden");
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_construction_failure_propagates() {
    let (toolchain, _state) = MockToolchain::new();
    let mut compiler = ScriptCompiler::new(Box::new(toolchain));
    compiler.register(&model_script("Broken", true), "Broken", |_| {});

    assert!(matches!(compiler.compile(), Err(Error::Construction { .. })));
}

#[test]
fn test_toolchain_error_is_reported_as_failure() {
    struct Unavailable;

    impl Toolchain for Unavailable {
        fn compile(&self, _unit: &CompilationUnit, _references: &[String]) -> Result<CompileOutput> {
            Err(Error::Toolchain("compiler not installed".to_string()))
        }
    }

    let mut compiler = ScriptCompiler::new(Box::new(Unavailable));
    compiler.register(&model_script("S1", true), "S1", |_| {});

    let outcome = compiler.compile().unwrap();
    assert_eq!(outcome.errors(), Some("Toolchain error: compiler not installed"));
}

#[test]
fn test_compiler_is_send() {
    fn assert_send<T: Send>() {}
    assert_send::<ScriptCompiler>();
}

#[test]
fn test_rebuild_reregistration_replaces_stale_callback() {
    let (toolchain, state) = MockToolchain::new();
    let mut compiler = ScriptCompiler::new(Box::new(toolchain));
    let script = model_script("S1", true);

    let (first, on_first) = recorder();
    compiler.register(&script, "Manager", on_first);
    assert_eq!(compiler.compile().unwrap(), CompileOutcome::Compiled);

    let (second, on_second) = recorder();
    compiler.register(&script, "Manager", on_second);
    assert_eq!(compiler.labels_for(&script), ["Manager"]);

    assert_eq!(compiler.compile().unwrap(), CompileOutcome::UpToDate);
    assert_eq!(state.compiles(), 1);
    assert_eq!(first.lock().unwrap().len(), 1);
    assert_eq!(second.lock().unwrap().len(), 1);
}
