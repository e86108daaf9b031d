//! Abstract contracts implemented by format back-ends.
//!
//! - [`FileObject`]: seek/read over an opaque byte stream.
//! - [`FileSystem`]: path-spec addressed lookup of file entries.
//! - [`FileEntry`]: one addressable object inside a filesystem layer.

pub mod file_entry;
pub mod file_object;
pub mod file_system;

pub use file_entry::{DataStream, FileEntry, FileEntryKind};
pub use file_object::{
    new_file_object_ref, FileObject, FileObjectRef, PassThroughFileObject, SeekFrom, StreamReader,
};
pub use file_system::{FileSystem, FileSystemRef};
