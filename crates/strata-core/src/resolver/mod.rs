//! The resolver: public entry point mapping path specifications to live
//! handles.
//!
//! Resolution walks a path spec chain from the root outward: the deepest
//! parent is opened first (cache hit or helper construction), then each
//! layer wraps the one beneath it until the leaf handle is produced. All
//! caching happens in a [`ResolverContext`]; helpers are looked up in the
//! resolver's [`ResolverHelperManager`] at resolve time, and `MOUNT`
//! indirections are substituted from its mount point registry before any
//! cache lookup so equivalent chains share cache entries.

use std::rc::Rc;
use std::sync::Arc;

use tracing::debug;

use crate::definitions::TYPE_INDICATOR_MOUNT;
use crate::error::{StrataError, StrataResult};
use crate::mount::MountPointManager;
use crate::path::PathSpec;
use crate::vfs::file_object::SeekFrom;
use crate::vfs::{new_file_object_ref, FileObjectRef, FileSystemRef};

pub mod context;
pub mod helper;

pub use context::ResolverContext;
pub use helper::{ResolverHelper, ResolverHelperManager};

// ============================================================================
// Resolver
// ============================================================================

/// Dispatch engine for opening path specifications.
#[derive(Default)]
pub struct Resolver {
    helpers: ResolverHelperManager,
    mount_points: MountPointManager,
}

impl Resolver {
    /// Create a resolver with empty registries.
    pub fn new() -> Self {
        Resolver::default()
    }

    /// The helper registry of this resolver.
    pub fn helpers(&self) -> &ResolverHelperManager {
        &self.helpers
    }

    /// The mount point registry of this resolver.
    pub fn mount_points(&self) -> &MountPointManager {
        &self.mount_points
    }

    // ------------------------------------------------------------------
    // Mount expansion
    // ------------------------------------------------------------------

    /// Substitute every `MOUNT` node in the chain with its binding.
    ///
    /// Descendant nodes are rebuilt on top of the substituted chain, so an
    /// indirect spec and its direct equivalent produce the same comparable
    /// and share cache entries.
    fn expand_mount_points(&self, path_spec: &Arc<PathSpec>) -> StrataResult<Arc<PathSpec>> {
        if path_spec.type_indicator() == TYPE_INDICATOR_MOUNT {
            let identifier = path_spec.identifier().ok_or_else(|| {
                StrataError::mount_point("mount path specification without identifier")
            })?;
            let binding = self.mount_points.get(identifier).ok_or_else(|| {
                StrataError::mount_point(format!("mount identifier not bound: {}", identifier))
            })?;
            return self.expand_mount_points(&binding);
        }
        match path_spec.parent() {
            None => Ok(Arc::clone(path_spec)),
            Some(parent) => {
                let expanded = self.expand_mount_points(parent)?;
                if Arc::ptr_eq(&expanded, parent) {
                    Ok(Arc::clone(path_spec))
                } else {
                    Ok(Arc::new(path_spec.with_parent(Some(expanded))))
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // File objects
    // ------------------------------------------------------------------

    /// Open the file object addressed by `path_spec`.
    ///
    /// Returns the shared cached handle when one exists; the seek position
    /// of a shared handle is unspecified, so consumers re-seek.
    pub fn open_file_object(
        &self,
        path_spec: &Arc<PathSpec>,
        context: &mut ResolverContext,
    ) -> StrataResult<FileObjectRef> {
        let path_spec = self.expand_mount_points(path_spec)?;
        let comparable = path_spec.comparable().to_string();

        if let Some(handle) = context.get_file_object(&comparable) {
            debug!(comparable = %comparable, "file object cache hit");
            return Ok(handle);
        }
        debug!(comparable = %comparable, "file object cache miss");

        let file_object = self.construct_with_parent(&path_spec, context, |resolver, context| {
            let helper = resolver.helpers.get(path_spec.type_indicator()).ok_or_else(|| {
                StrataError::back_end_for(
                    format!(
                        "no resolver helper registered for {}",
                        path_spec.type_indicator()
                    ),
                    path_spec.comparable(),
                )
            })?;
            helper.new_file_object(resolver, context, &path_spec)
        })?;

        let handle = new_file_object_ref(file_object);
        context.cache_file_object(comparable, Rc::clone(&handle))?;
        Ok(handle)
    }

    /// Release one reference to the file object addressed by `path_spec`,
    /// cascading to parent layers when the entry is evicted.
    pub fn close_file_object(
        &self,
        path_spec: &Arc<PathSpec>,
        context: &mut ResolverContext,
    ) -> StrataResult<()> {
        let path_spec = self.expand_mount_points(path_spec)?;
        self.release_file_object_chain(&path_spec, context);
        Ok(())
    }

    fn release_file_object_chain(&self, path_spec: &Arc<PathSpec>, context: &mut ResolverContext) {
        if context.release_file_object(path_spec.comparable()) {
            debug!(comparable = %path_spec.comparable(), "file object evicted");
            if let Some(parent) = path_spec.parent() {
                self.release_file_object_chain(parent, context);
            }
        }
    }

    // ------------------------------------------------------------------
    // Filesystems
    // ------------------------------------------------------------------

    /// Open the filesystem addressed by `path_spec`.
    ///
    /// By convention callers pass the layer's root spec (for partition
    /// schemes, `location="/"`); the filesystem is cached under the
    /// comparable of the spec it was opened with.
    pub fn open_file_system(
        &self,
        path_spec: &Arc<PathSpec>,
        context: &mut ResolverContext,
    ) -> StrataResult<FileSystemRef> {
        let path_spec = self.expand_mount_points(path_spec)?;
        let comparable = path_spec.comparable().to_string();

        if let Some(handle) = context.get_file_system(&comparable) {
            debug!(comparable = %comparable, "filesystem cache hit");
            return Ok(handle);
        }
        debug!(comparable = %comparable, "filesystem cache miss");

        let file_system = self.construct_with_parent(&path_spec, context, |resolver, context| {
            let helper = resolver.helpers.get(path_spec.type_indicator()).ok_or_else(|| {
                StrataError::back_end_for(
                    format!(
                        "no resolver helper registered for {}",
                        path_spec.type_indicator()
                    ),
                    path_spec.comparable(),
                )
            })?;
            helper.new_file_system(resolver, context, &path_spec)
        })?;

        let handle: FileSystemRef = Rc::from(file_system);
        context.cache_file_system(comparable, Rc::clone(&handle))?;
        Ok(handle)
    }

    /// Release one reference to the filesystem addressed by `path_spec`,
    /// cascading to its parent stream when the entry is evicted.
    pub fn close_file_system(
        &self,
        path_spec: &Arc<PathSpec>,
        context: &mut ResolverContext,
    ) -> StrataResult<()> {
        let path_spec = self.expand_mount_points(path_spec)?;
        if context.release_file_system(path_spec.comparable()) {
            debug!(comparable = %path_spec.comparable(), "filesystem evicted");
            if let Some(parent) = path_spec.parent() {
                self.release_file_object_chain(parent, context);
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Construction plumbing
    // ------------------------------------------------------------------

    /// Open the parent layer first, hand it to `construct` at offset 0,
    /// and release the temporary parent reference afterwards. The helper
    /// re-opens the parent through the resolver (a cache hit) and keeps
    /// that reference for the lifetime of the constructed handle.
    fn construct_with_parent<T>(
        &self,
        path_spec: &Arc<PathSpec>,
        context: &mut ResolverContext,
        construct: impl FnOnce(&Resolver, &mut ResolverContext) -> StrataResult<T>,
    ) -> StrataResult<T> {
        let parent_spec = path_spec.parent().map(Arc::clone);

        let prepared: StrataResult<()> = match parent_spec.as_ref() {
            Some(parent) => {
                let parent_handle = self.open_file_object(parent, context)?;
                let seeked = parent_handle.borrow_mut().seek(SeekFrom::Start(0));
                seeked.map(|_| ())
            }
            None => Ok(()),
        };

        let result = match prepared {
            Ok(()) => construct(self, context),
            Err(error) => Err(error),
        };

        if let Some(parent) = parent_spec.as_ref() {
            self.release_file_object_chain(parent, context);
        }
        result
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::PathSpecFactory;
    use crate::vfs::file_object::tests::MemoryFileObject;
    use crate::vfs::{FileObject, PassThroughFileObject};

    const ROOT_DATA: &[u8] = b"0123456789abcdef";

    /// Root helper: serves a fixed in-memory stream for `OS` specs.
    struct MemoryRootHelper;

    impl ResolverHelper for MemoryRootHelper {
        fn type_indicator(&self) -> &'static str {
            "OS"
        }

        fn new_file_object(
            &self,
            _resolver: &Resolver,
            _context: &mut ResolverContext,
            _path_spec: &Arc<PathSpec>,
        ) -> StrataResult<Box<dyn FileObject>> {
            Ok(Box::new(MemoryFileObject::new(ROOT_DATA.to_vec())))
        }
    }

    /// Nested helper: pass-through view of the parent stream.
    struct PassThroughHelper;

    impl ResolverHelper for PassThroughHelper {
        fn type_indicator(&self) -> &'static str {
            "RAW"
        }

        fn new_file_object(
            &self,
            resolver: &Resolver,
            context: &mut ResolverContext,
            path_spec: &Arc<PathSpec>,
        ) -> StrataResult<Box<dyn FileObject>> {
            let parent = path_spec
                .parent()
                .ok_or_else(|| StrataError::path_spec("RAW requires a parent"))?;
            let parent_handle = resolver.open_file_object(parent, context)?;
            Ok(Box::new(PassThroughFileObject::whole(
                Arc::clone(path_spec),
                parent_handle,
            )?))
        }
    }

    fn resolver() -> Resolver {
        let resolver = Resolver::new();
        resolver.helpers().register(Arc::new(MemoryRootHelper)).unwrap();
        resolver.helpers().register(Arc::new(PassThroughHelper)).unwrap();
        resolver
    }

    fn factory() -> PathSpecFactory {
        PathSpecFactory::with_builtin_definitions()
    }

    fn raw_spec(factory: &PathSpecFactory) -> Arc<PathSpec> {
        let os = factory
            .new_path_spec("OS", &[("location", "/tmp/image.raw".into())], None)
            .unwrap();
        factory.new_path_spec("RAW", &[], Some(os)).unwrap()
    }

    mod open_file_object {
        use super::*;

        #[test]
        fn repeated_opens_return_the_same_handle() {
            let resolver = resolver();
            let factory = factory();
            let spec = raw_spec(&factory);
            let mut context = ResolverContext::new();

            let first = resolver.open_file_object(&spec, &mut context).unwrap();
            let second = resolver.open_file_object(&spec, &mut context).unwrap();
            assert!(FileObjectRef::ptr_eq(&first, &second));
        }

        #[test]
        fn parent_layers_are_cached_once() {
            let resolver = resolver();
            let factory = factory();
            let spec = raw_spec(&factory);
            let mut context = ResolverContext::new();

            let _handle = resolver.open_file_object(&spec, &mut context).unwrap();
            // One entry for RAW, one for its OS parent.
            assert_eq!(context.number_of_file_objects(), 2);
        }

        #[test]
        fn layered_reads_see_the_parent_bytes() {
            let resolver = resolver();
            let factory = factory();
            let spec = raw_spec(&factory);
            let mut context = ResolverContext::new();

            let handle = resolver.open_file_object(&spec, &mut context).unwrap();
            let mut buf = [0u8; 4];
            handle.borrow_mut().read_exact(&mut buf).unwrap();
            assert_eq!(&buf, b"0123");
        }

        #[test]
        fn unregistered_helper_is_a_back_end_error() {
            let resolver = resolver();
            let factory = factory();
            let os = factory
                .new_path_spec("OS", &[("location", "/tmp/image.raw".into())], None)
                .unwrap();
            let spec = factory.new_path_spec("EWF", &[], Some(os)).unwrap();
            let mut context = ResolverContext::new();

            let err = resolver.open_file_object(&spec, &mut context).unwrap_err();
            assert!(matches!(err, StrataError::BackEnd { .. }));
        }

        #[test]
        fn failed_construction_releases_the_parent() {
            let resolver = resolver();
            let factory = factory();
            let os = factory
                .new_path_spec("OS", &[("location", "/tmp/image.raw".into())], None)
                .unwrap();
            let spec = factory.new_path_spec("EWF", &[], Some(os)).unwrap();
            let mut context = ResolverContext::new();

            let _ = resolver.open_file_object(&spec, &mut context);
            assert_eq!(context.number_of_file_objects(), 0);
        }
    }

    mod close_semantics {
        use super::*;

        #[test]
        fn close_cascades_to_parent_layers() {
            let resolver = resolver();
            let factory = factory();
            let spec = raw_spec(&factory);
            let mut context = ResolverContext::new();

            let _handle = resolver.open_file_object(&spec, &mut context).unwrap();
            assert_eq!(context.number_of_file_objects(), 2);

            resolver.close_file_object(&spec, &mut context).unwrap();
            assert_eq!(context.number_of_file_objects(), 0);
        }

        #[test]
        fn close_respects_outstanding_references() {
            let resolver = resolver();
            let factory = factory();
            let spec = raw_spec(&factory);
            let mut context = ResolverContext::new();

            let _first = resolver.open_file_object(&spec, &mut context).unwrap();
            let _second = resolver.open_file_object(&spec, &mut context).unwrap();

            resolver.close_file_object(&spec, &mut context).unwrap();
            assert_eq!(context.number_of_file_objects(), 2);

            resolver.close_file_object(&spec, &mut context).unwrap();
            assert_eq!(context.number_of_file_objects(), 0);
        }

        #[test]
        fn empty_clears_the_context() {
            let resolver = resolver();
            let factory = factory();
            let spec = raw_spec(&factory);
            let mut context = ResolverContext::new();

            let _handle = resolver.open_file_object(&spec, &mut context).unwrap();
            context.empty();
            assert_eq!(context.number_of_file_objects(), 0);
        }
    }

    mod mount_indirection {
        use super::*;

        #[test]
        fn mount_spec_resolves_through_its_binding() {
            let resolver = resolver();
            let factory = factory();
            let spec = raw_spec(&factory);
            resolver
                .mount_points()
                .register("C", Arc::clone(&spec))
                .unwrap();

            let mount = factory
                .new_path_spec("MOUNT", &[("identifier", "C".into())], None)
                .unwrap();
            let mut context = ResolverContext::new();

            let direct = resolver.open_file_object(&spec, &mut context).unwrap();
            let indirect = resolver.open_file_object(&mount, &mut context).unwrap();
            assert!(FileObjectRef::ptr_eq(&direct, &indirect));
            assert_eq!(context.number_of_file_objects(), 2);
        }

        #[test]
        fn child_of_a_mount_shares_the_direct_cache_entry() {
            let resolver = resolver();
            let factory = factory();
            let os = factory
                .new_path_spec("OS", &[("location", "/tmp/image.raw".into())], None)
                .unwrap();
            resolver
                .mount_points()
                .register("image", Arc::clone(&os))
                .unwrap();

            let mount = factory
                .new_path_spec("MOUNT", &[("identifier", "image".into())], None)
                .unwrap();
            let raw_via_mount = factory.new_path_spec("RAW", &[], Some(mount)).unwrap();
            let raw_direct = factory.new_path_spec("RAW", &[], Some(os)).unwrap();

            let mut context = ResolverContext::new();
            let indirect = resolver
                .open_file_object(&raw_via_mount, &mut context)
                .unwrap();
            let direct = resolver.open_file_object(&raw_direct, &mut context).unwrap();
            assert!(FileObjectRef::ptr_eq(&direct, &indirect));
            assert_eq!(context.number_of_file_objects(), 2);
        }

        #[test]
        fn unbound_mount_is_a_mount_point_error() {
            let resolver = resolver();
            let factory = factory();
            let mount = factory
                .new_path_spec("MOUNT", &[("identifier", "missing".into())], None)
                .unwrap();
            let mut context = ResolverContext::new();

            let err = resolver.open_file_object(&mount, &mut context).unwrap_err();
            assert!(matches!(err, StrataError::MountPoint { .. }));
        }
    }

    mod pass_through {
        use super::*;
        use crate::vfs::new_file_object_ref;

        #[test]
        fn range_clamps_reads() {
            let factory = factory();
            let spec = raw_spec(&factory);
            let parent = new_file_object_ref(Box::new(MemoryFileObject::new(ROOT_DATA.to_vec())));
            let mut range =
                PassThroughFileObject::range(spec, parent, 4, 4).unwrap();
            assert_eq!(range.size().unwrap(), 4);

            let mut buf = [0u8; 8];
            let read = range.read(&mut buf).unwrap();
            assert_eq!(read, 4);
            assert_eq!(&buf[..4], b"4567");
            assert_eq!(range.read(&mut buf).unwrap(), 0);
        }

        #[test]
        fn range_beyond_parent_is_rejected() {
            let factory = factory();
            let spec = raw_spec(&factory);
            let parent = new_file_object_ref(Box::new(MemoryFileObject::new(ROOT_DATA.to_vec())));
            let err = PassThroughFileObject::range(spec, parent, 12, 8).unwrap_err();
            assert!(matches!(err, StrataError::BackEnd { .. }));
        }
    }
}
