//! Mount point bindings.
//!
//! A mount point maps an identifier to a path specification so that
//! `MOUNT` nodes resolve through an indirection. The registry is
//! process-wide state: empty at startup, populated by application code,
//! cleared at shutdown.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crate::error::{StrataError, StrataResult};
use crate::path::PathSpec;

// ============================================================================
// Mount Point Manager
// ============================================================================

/// Registry of mount identifiers bound to path specifications.
#[derive(Debug, Default)]
pub struct MountPointManager {
    bindings: RwLock<BTreeMap<String, Arc<PathSpec>>>,
}

impl MountPointManager {
    /// Create an empty registry.
    pub fn new() -> Self {
        MountPointManager::default()
    }

    /// Bind `identifier` to `path_spec`.
    ///
    /// Fails when the identifier is empty or already bound.
    pub fn register(&self, identifier: &str, path_spec: Arc<PathSpec>) -> StrataResult<()> {
        if identifier.is_empty() {
            return Err(StrataError::mount_point("empty mount identifier"));
        }
        let mut bindings = self.bindings.write().expect("mount lock poisoned");
        if bindings.contains_key(identifier) {
            return Err(StrataError::mount_point(format!(
                "mount identifier already bound: {}",
                identifier
            )));
        }
        bindings.insert(identifier.to_string(), path_spec);
        Ok(())
    }

    /// Remove the binding for `identifier`.
    pub fn deregister(&self, identifier: &str) -> StrataResult<()> {
        let mut bindings = self.bindings.write().expect("mount lock poisoned");
        if bindings.remove(identifier).is_none() {
            return Err(StrataError::mount_point(format!(
                "mount identifier not bound: {}",
                identifier
            )));
        }
        Ok(())
    }

    /// The path specification bound to `identifier`, when present.
    pub fn get(&self, identifier: &str) -> Option<Arc<PathSpec>> {
        self.bindings
            .read()
            .expect("mount lock poisoned")
            .get(identifier)
            .cloned()
    }

    /// Remove every binding.
    pub fn empty(&self) {
        self.bindings.write().expect("mount lock poisoned").clear();
    }

    /// Number of bindings.
    pub fn len(&self) -> usize {
        self.bindings.read().expect("mount lock poisoned").len()
    }

    /// Whether the registry holds no bindings.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Tests
// ============================================================================
