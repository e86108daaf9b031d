//! Resolver helpers: per-format factories for file objects and
//! filesystems.
//!
//! A helper is a stateless singleton registered for one type indicator.
//! It exposes either `new_file_object` or `new_file_system`; the other
//! side falls through to `NotSupported`. All per-open state lives in the
//! returned object and in the context cache. Registration only populates
//! the registry; helpers are looked up at resolve time.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::{StrataError, StrataResult};
use crate::path::PathSpec;
use crate::resolver::{Resolver, ResolverContext};
use crate::vfs::{FileObject, FileSystem};

// ============================================================================
// ResolverHelper
// ============================================================================

/// Per-format factory invoked by the resolver on a cache miss.
///
/// A helper receives the resolver so it can open its parent layer through
/// the same cache (`Resolver::open_file_object` on
/// `path_spec.parent()`); by the time a helper runs, the resolver has
/// already opened the parent and positioned it at offset 0.
pub trait ResolverHelper: Send + Sync {
    /// Type indicator this helper serves.
    fn type_indicator(&self) -> &'static str;

    /// Construct a file object for `path_spec`.
    fn new_file_object(
        &self,
        resolver: &Resolver,
        context: &mut ResolverContext,
        path_spec: &Arc<PathSpec>,
    ) -> StrataResult<Box<dyn FileObject>> {
        let _ = (resolver, context, path_spec);
        Err(StrataError::not_supported(format!(
            "{} does not provide a file object",
            self.type_indicator()
        )))
    }

    /// Construct a filesystem for `path_spec`.
    fn new_file_system(
        &self,
        resolver: &Resolver,
        context: &mut ResolverContext,
        path_spec: &Arc<PathSpec>,
    ) -> StrataResult<Box<dyn FileSystem>> {
        let _ = (resolver, context, path_spec);
        Err(StrataError::not_supported(format!(
            "{} does not provide a filesystem",
            self.type_indicator()
        )))
    }
}

// ============================================================================
// ResolverHelperManager
// ============================================================================

/// Registry of resolver helpers keyed by type indicator.
#[derive(Default)]
pub struct ResolverHelperManager {
    helpers: RwLock<HashMap<String, Arc<dyn ResolverHelper>>>,
}

impl ResolverHelperManager {
    /// Create an empty registry.
    pub fn new() -> Self {
        ResolverHelperManager::default()
    }

    /// Register a helper under its type indicator.
    pub fn register(&self, helper: Arc<dyn ResolverHelper>) -> StrataResult<()> {
        let mut helpers = self.helpers.write().expect("helper lock poisoned");
        let type_indicator = helper.type_indicator();
        if helpers.contains_key(type_indicator) {
            return Err(StrataError::AlreadyRegistered {
                type_indicator: type_indicator.to_string(),
            });
        }
        helpers.insert(type_indicator.to_string(), helper);
        Ok(())
    }

    /// Deregister the helper for a type indicator.
    pub fn deregister(&self, type_indicator: &str) -> StrataResult<()> {
        let mut helpers = self.helpers.write().expect("helper lock poisoned");
        if helpers.remove(type_indicator).is_none() {
            return Err(StrataError::NotRegistered {
                type_indicator: type_indicator.to_string(),
            });
        }
        Ok(())
    }

    /// The helper for a type indicator, when registered.
    pub fn get(&self, type_indicator: &str) -> Option<Arc<dyn ResolverHelper>> {
        self.helpers
            .read()
            .expect("helper lock poisoned")
            .get(type_indicator)
            .cloned()
    }

    /// Whether a helper is registered for a type indicator.
    pub fn is_registered(&self, type_indicator: &str) -> bool {
        self.helpers
            .read()
            .expect("helper lock poisoned")
            .contains_key(type_indicator)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    struct StubHelper;

    impl ResolverHelper for StubHelper {
        fn type_indicator(&self) -> &'static str {
            "STUB"
        }
    }

    #[test]
    fn register_and_lookup() {
        let manager = ResolverHelperManager::new();
        manager.register(Arc::new(StubHelper)).unwrap();
        assert!(manager.is_registered("STUB"));
        assert!(manager.get("STUB").is_some());
        assert!(manager.get("OTHER").is_none());
    }

    #[test]
    fn duplicate_registration_fails() {
        let manager = ResolverHelperManager::new();
        manager.register(Arc::new(StubHelper)).unwrap();
        let err = manager.register(Arc::new(StubHelper)).unwrap_err();
        assert!(matches!(err, StrataError::AlreadyRegistered { .. }));
    }

    #[test]
    fn deregister_absent_fails() {
        let manager = ResolverHelperManager::new();
        let err = manager.deregister("STUB").unwrap_err();
        assert!(matches!(err, StrataError::NotRegistered { .. }));
    }

    #[test]
    fn default_constructors_are_not_supported() {
        let helper = StubHelper;
        let resolver = Resolver::new();
        let mut context = ResolverContext::new();
        let factory = crate::path::PathSpecFactory::with_builtin_definitions();
        let spec = factory
            .new_path_spec("OS", &[("location", "/tmp/x".into())], None)
            .unwrap();
        let err = helper
            .new_file_object(&resolver, &mut context, &spec)
            .unwrap_err();
        assert!(matches!(err, StrataError::NotSupported { .. }));
        let err = helper
            .new_file_system(&resolver, &mut context, &spec)
            .unwrap_err();
        assert!(matches!(err, StrataError::NotSupported { .. }));
    }
}
