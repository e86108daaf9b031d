//! The filesystem contract: path-spec addressed entry lookup over one
//! format layer.

use std::rc::Rc;
use std::sync::Arc;

use crate::error::StrataResult;
use crate::path::PathSpec;
use crate::vfs::file_entry::FileEntry;

/// A filesystem-like view of one format layer.
///
/// Lookups with an out-of-range index or a malformed or unknown location
/// return `Ok(None)` / `false`, never an error; errors are reserved for
/// back-end failures while reading the layer itself.
pub trait FileSystem {
    /// Type indicator of this filesystem's format.
    fn type_indicator(&self) -> &'static str;

    /// The path specification this filesystem was opened from.
    fn path_spec(&self) -> &Arc<PathSpec>;

    /// The entry addressed by `path_spec`, or `None` when it names nothing
    /// inside this filesystem.
    fn get_file_entry_by_path_spec(
        &self,
        path_spec: &Arc<PathSpec>,
    ) -> StrataResult<Option<Box<dyn FileEntry>>>;

    /// Whether `path_spec` addresses an entry inside this filesystem.
    fn file_entry_exists_by_path_spec(&self, path_spec: &Arc<PathSpec>) -> bool {
        matches!(self.get_file_entry_by_path_spec(path_spec), Ok(Some(_)))
    }

    /// The root entry of this filesystem.
    fn get_root_file_entry(&self) -> StrataResult<Box<dyn FileEntry>>;
}

impl std::fmt::Debug for dyn FileSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FileSystem")
    }
}

/// Shared handle to an open filesystem.
pub type FileSystemRef = Rc<dyn FileSystem>;
