// tests/artifacts.rs

//! Process-wide artifact setup, in its own binary so no other test runs it first.

use scriptweave::script::artifacts::{self, ArtifactStore};
use std::fs;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

const THREADS: usize = 8;

#[test]
fn test_concurrent_first_use_initializes_once() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("SWstale.dll"), b"module").unwrap();
    fs::write(temp.path().join("SWstale.cs"), b"source").unwrap();
    let store = Arc::new(ArtifactStore::new(temp.path(), "SW", Duration::ZERO));
    assert!(!artifacts::is_initialized());
    assert_eq!(artifacts::resolve_module("SWstale"), None);

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                artifacts::initialize(&store)
            })
        })
        .collect();
    let performed = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|&ran| ran)
        .count();

    assert_eq!(performed, 1);
    assert!(artifacts::is_initialized());
    assert!(!artifacts::initialize(&store));

    // setup purged the stale artifacts and installed the hook
    assert!(!temp.path().join("SWstale.dll").exists());
    assert!(!temp.path().join("SWstale.cs").exists());
    fs::write(temp.path().join("SWfresh.dll"), b"module").unwrap();
    assert_eq!(
        artifacts::resolve_module("SWfresh, Version=0.0.0.0"),
        Some(temp.path().join("SWfresh.dll"))
    );
}
