//! The RAW storage media image back-end.
//!
//! A RAW layer is a single-segment storage media image: a pass-through
//! view of its parent stream with an independent cursor. Split
//! multi-segment images are not handled.

use std::sync::Arc;

use strata_core::definitions::TYPE_INDICATOR_RAW;
use strata_core::error::{StrataError, StrataResult};
use strata_core::path::PathSpec;
use strata_core::resolver::{Resolver, ResolverContext, ResolverHelper};
use strata_core::vfs::{FileObject, PassThroughFileObject};

/// Resolver helper for `RAW` path specifications.
pub struct RawResolverHelper;

impl ResolverHelper for RawResolverHelper {
    fn type_indicator(&self) -> &'static str {
        TYPE_INDICATOR_RAW
    }

    fn new_file_object(
        &self,
        resolver: &Resolver,
        context: &mut ResolverContext,
        path_spec: &Arc<PathSpec>,
    ) -> StrataResult<Box<dyn FileObject>> {
        let parent = path_spec.parent().ok_or_else(|| {
            StrataError::path_spec_for(
                "RAW path specification requires a parent",
                path_spec.comparable(),
            )
        })?;
        let parent_handle = resolver.open_file_object(parent, context)?;
        Ok(Box::new(PassThroughFileObject::whole(
            Arc::clone(path_spec),
            parent_handle,
        )?))
    }
}
