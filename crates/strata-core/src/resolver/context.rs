//! The resolver context: per-session caches of open handles.
//!
//! A context caches open file objects and filesystems keyed by the path
//! spec comparable, with plain (non-atomic) reference counts and a pin
//! set. It is scoped to one consumer session and is not safe for
//! concurrent mutation; parallel scans use one context per worker.
//!
//! Refcounts are internal: the public surface is open/close through the
//! resolver plus `pin`/`unpin`/`empty` and the size queries here.

use std::collections::{HashMap, HashSet};

use crate::error::{StrataError, StrataResult};
use crate::vfs::{FileObjectRef, FileSystemRef};

// ============================================================================
// Cache Entry
// ============================================================================

#[derive(Debug)]
struct CacheEntry<T> {
    handle: T,
    refcount: usize,
}

// ============================================================================
// Resolver Context
// ============================================================================

/// Per-session cache of open file objects and filesystems.
#[derive(Default)]
pub struct ResolverContext {
    file_objects: HashMap<String, CacheEntry<FileObjectRef>>,
    file_systems: HashMap<String, CacheEntry<FileSystemRef>>,
    pins: HashSet<String>,
    maximum_size: Option<usize>,
}

impl ResolverContext {
    /// Create an unbounded context.
    pub fn new() -> Self {
        ResolverContext::default()
    }

    /// Create a context whose combined cache is bounded to `maximum_size`
    /// entries; inserting beyond the bound fails with `CacheFull`.
    pub fn with_maximum_size(maximum_size: usize) -> Self {
        ResolverContext {
            maximum_size: Some(maximum_size),
            ..ResolverContext::default()
        }
    }

    /// Number of cached file objects.
    pub fn number_of_file_objects(&self) -> usize {
        self.file_objects.len()
    }

    /// Number of cached filesystems.
    pub fn number_of_file_systems(&self) -> usize {
        self.file_systems.len()
    }

    /// Keep the entry for `comparable` alive regardless of refcount.
    pub fn pin(&mut self, comparable: &str) {
        self.pins.insert(comparable.to_string());
    }

    /// Drop the pin for `comparable`; the entry is released once its
    /// refcount reaches zero again.
    pub fn unpin(&mut self, comparable: &str) {
        self.pins.remove(comparable);
    }

    /// Release every cached entry regardless of refcount, in one sweep.
    ///
    /// Consumers must not hold handles across this call.
    pub fn empty(&mut self) {
        for (_, entry) in self.file_objects.drain() {
            entry.handle.borrow_mut().close();
        }
        self.file_systems.clear();
        self.pins.clear();
    }

    fn check_capacity(&self) -> StrataResult<()> {
        if let Some(maximum_size) = self.maximum_size {
            if self.file_objects.len() + self.file_systems.len() >= maximum_size {
                return Err(StrataError::cache_full(format!(
                    "context cache holds {} entries",
                    maximum_size
                )));
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // File object cache (resolver-internal)
    // ------------------------------------------------------------------

    /// Cache hit: bump the refcount and return the shared handle.
    pub(crate) fn get_file_object(&mut self, comparable: &str) -> Option<FileObjectRef> {
        let entry = self.file_objects.get_mut(comparable)?;
        entry.refcount += 1;
        Some(FileObjectRef::clone(&entry.handle))
    }

    /// Insert a freshly constructed handle with refcount 1.
    pub(crate) fn cache_file_object(
        &mut self,
        comparable: String,
        handle: FileObjectRef,
    ) -> StrataResult<()> {
        self.check_capacity()?;
        self.file_objects
            .insert(comparable, CacheEntry { handle, refcount: 1 });
        Ok(())
    }

    /// Drop one reference; closes and evicts the entry at refcount zero
    /// unless pinned. Returns true when the entry was evicted.
    pub(crate) fn release_file_object(&mut self, comparable: &str) -> bool {
        let Some(entry) = self.file_objects.get_mut(comparable) else {
            return false;
        };
        entry.refcount = entry.refcount.saturating_sub(1);
        if entry.refcount == 0 && !self.pins.contains(comparable) {
            let entry = self
                .file_objects
                .remove(comparable)
                .expect("entry present above");
            entry.handle.borrow_mut().close();
            return true;
        }
        false
    }

    // ------------------------------------------------------------------
    // Filesystem cache (resolver-internal)
    // ------------------------------------------------------------------

    pub(crate) fn get_file_system(&mut self, comparable: &str) -> Option<FileSystemRef> {
        let entry = self.file_systems.get_mut(comparable)?;
        entry.refcount += 1;
        Some(FileSystemRef::clone(&entry.handle))
    }

    pub(crate) fn cache_file_system(
        &mut self,
        comparable: String,
        handle: FileSystemRef,
    ) -> StrataResult<()> {
        self.check_capacity()?;
        self.file_systems
            .insert(comparable, CacheEntry { handle, refcount: 1 });
        Ok(())
    }

    pub(crate) fn release_file_system(&mut self, comparable: &str) -> bool {
        let Some(entry) = self.file_systems.get_mut(comparable) else {
            return false;
        };
        entry.refcount = entry.refcount.saturating_sub(1);
        if entry.refcount == 0 && !self.pins.contains(comparable) {
            self.file_systems.remove(comparable);
            return true;
        }
        false
    }
}

// ============================================================================
// Tests
// ============================================================================
