//! The data range back-end: a sub-range view of the parent stream.

use std::sync::Arc;

use strata_core::definitions::TYPE_INDICATOR_DATA_RANGE;
use strata_core::error::{StrataError, StrataResult};
use strata_core::path::PathSpec;
use strata_core::resolver::{Resolver, ResolverContext, ResolverHelper};
use strata_core::vfs::{FileObject, PassThroughFileObject};

/// Resolver helper for `DATA_RANGE` path specifications.
pub struct DataRangeResolverHelper;

impl ResolverHelper for DataRangeResolverHelper {
    fn type_indicator(&self) -> &'static str {
        TYPE_INDICATOR_DATA_RANGE
    }

    fn new_file_object(
        &self,
        resolver: &Resolver,
        context: &mut ResolverContext,
        path_spec: &Arc<PathSpec>,
    ) -> StrataResult<Box<dyn FileObject>> {
        let parent = path_spec.parent().ok_or_else(|| {
            StrataError::path_spec_for(
                "DATA_RANGE path specification requires a parent",
                path_spec.comparable(),
            )
        })?;
        let range_offset = path_spec.range_offset().ok_or_else(|| {
            StrataError::path_spec_for(
                "DATA_RANGE path specification requires range_offset",
                path_spec.comparable(),
            )
        })?;
        let range_size = path_spec.range_size().ok_or_else(|| {
            StrataError::path_spec_for(
                "DATA_RANGE path specification requires range_size",
                path_spec.comparable(),
            )
        })?;
        let parent_handle = resolver.open_file_object(parent, context)?;
        Ok(Box::new(PassThroughFileObject::range(
            Arc::clone(path_spec),
            parent_handle,
            range_offset,
            range_size,
        )?))
    }
}
