// src/script/artifacts.rs

//! Compiled script artifacts in temporary storage
//!
//! Every compilation writes a source file and a module file named
//! `<prefix><uuid>.<ext>` into the artifact directory. This module handles:
//!
//! - Allocating fresh artifact paths
//! - Purging stale artifacts left behind by earlier runs
//! - The process-wide resolution hook that finds a previously compiled
//!   module by name
//!
//! Setup ([`initialize`]) runs once per process. Concurrent callers race
//! through a check-lock-check so exactly one of them performs it.

use crate::config::ArtifactConfig;
use crate::error::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::{Duration, SystemTime};
use tracing::{debug, info};
use uuid::Uuid;
use walkdir::WalkDir;

/// Extensions of files the store owns
const ARTIFACT_EXTENSIONS: &[&str] = &["dll", "cs", "pdb", "so"];

static INITIALIZED: AtomicBool = AtomicBool::new(false);
static INIT_LOCK: Mutex<()> = Mutex::new(());
static RESOLUTION_HOOK: RwLock<Option<ArtifactStore>> = RwLock::new(None);

/// Paths allocated for one compilation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    /// Base name shared by both files, e.g. `SW1a2b...`
    pub name: String,
    pub source: PathBuf,
    pub output: PathBuf,
}

/// Directory of compiled script artifacts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactStore {
    dir: PathBuf,
    prefix: String,
    retention: Duration,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>, retention: Duration) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            retention,
        }
    }

    pub fn from_config(config: &ArtifactConfig) -> Self {
        Self::new(
            &config.dir,
            &config.prefix,
            Duration::from_secs(config.retention_secs),
        )
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Allocate unique source and output paths for a new compilation
    pub fn allocate(&self, output_extension: &str) -> Result<ArtifactPaths> {
        fs::create_dir_all(&self.dir)?;

        let name = format!("{}{}", self.prefix, Uuid::new_v4().simple());
        Ok(ArtifactPaths {
            source: self.dir.join(format!("{}.cs", name)),
            output: self.dir.join(format!("{}.{}", name, output_extension)),
            name,
        })
    }

    /// Delete artifacts not accessed within the retention window
    ///
    /// Returns the number of files removed. Files that cannot be inspected
    /// or deleted are skipped.
    pub fn purge_stale(&self) -> usize {
        let now = SystemTime::now();
        let mut removed = 0;

        for entry in WalkDir::new(&self.dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !entry.file_type().is_file() || !self.owns(path) {
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(e) => {
                    debug!("Cannot inspect artifact {}: {}", path.display(), e);
                    continue;
                }
            };
            let Ok(last_used) = metadata.accessed().or_else(|_| metadata.modified()) else {
                continue;
            };

            // timestamps in the future count as fresh
            let idle = now.duration_since(last_used).unwrap_or(Duration::ZERO);
            if idle < self.retention {
                continue;
            }

            match fs::remove_file(path) {
                Ok(()) => removed += 1,
                Err(e) => debug!("Cannot remove stale artifact {}: {}", path.display(), e),
            }
        }

        if removed > 0 {
            info!("Purged {} stale artifact(s) from {}", removed, self.dir.display());
        }
        removed
    }

    /// Find a compiled module by name
    ///
    /// `name` may be a full identity such as `SW1234, Version=0.0.0.0`; only
    /// the text before the first comma is compared with the file stem.
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        let wanted = name.split(',').next()?.trim();
        if wanted.is_empty() || !wanted.starts_with(&self.prefix) {
            return None;
        }

        WalkDir::new(&self.dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|entry| entry.into_path())
            .find(|path| {
                path.file_stem().is_some_and(|stem| stem == wanted)
                    && path
                        .extension()
                        .and_then(|ext| ext.to_str())
                        .is_some_and(|ext| ext != "cs" && ARTIFACT_EXTENSIONS.contains(&ext))
            })
    }

    /// Whether `path` carries the store's prefix and an artifact extension
    fn owns(&self, path: &Path) -> bool {
        let prefixed = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with(&self.prefix));
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ARTIFACT_EXTENSIONS.contains(&ext));
        prefixed && extension
    }
}

/// One-time process setup: install the resolution hook and purge stale artifacts
///
/// Returns true for the single call that performed the setup.
pub fn initialize(store: &ArtifactStore) -> bool {
    if INITIALIZED.load(Ordering::Acquire) {
        return false;
    }

    let _guard = match INIT_LOCK.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if INITIALIZED.load(Ordering::Acquire) {
        return false;
    }

    match RESOLUTION_HOOK.write() {
        Ok(mut hook) => *hook = Some(store.clone()),
        Err(poisoned) => *poisoned.into_inner() = Some(store.clone()),
    }
    debug!("Installed artifact resolution hook for {}", store.dir().display());

    store.purge_stale();
    INITIALIZED.store(true, Ordering::Release);
    true
}

pub fn is_initialized() -> bool {
    INITIALIZED.load(Ordering::Acquire)
}

/// Resolve a module name through the process-wide hook
pub fn resolve_module(name: &str) -> Option<PathBuf> {
    let hook = RESOLUTION_HOOK.read().ok()?;
    hook.as_ref()?.resolve(name)
}
