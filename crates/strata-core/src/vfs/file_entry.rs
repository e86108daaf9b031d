//! The file-entry contract: one addressable object inside a filesystem
//! layer.
//!
//! Sub-entry and data-stream sequences are lazy, restartable, and finite:
//! every call to the accessor starts a fresh iteration from the underlying
//! format's enumeration, and no state is shared between iterations.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::StrataResult;
use crate::path::PathSpec;
use crate::vfs::file_object::FileObjectRef;

// ============================================================================
// Entry Kind
// ============================================================================

/// Kind of a file entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEntryKind {
    File,
    Directory,
    Link,
    Device,
    Pipe,
    Socket,
}

// ============================================================================
// Data Streams
// ============================================================================

/// A named byte stream of a file entry.
///
/// The empty name designates the default data stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataStream {
    name: String,
}

impl DataStream {
    /// Create a named data stream descriptor.
    pub fn new(name: impl Into<String>) -> Self {
        DataStream { name: name.into() }
    }

    /// The default (unnamed) data stream.
    pub fn default_stream() -> Self {
        DataStream::new("")
    }

    /// Stream name; empty for the default stream.
    pub fn name(&self) -> &str {
        &self.name
    }
}

// ============================================================================
// FileEntry
// ============================================================================

/// One addressable object inside a filesystem layer.
pub trait FileEntry {
    /// Printable name of this entry.
    ///
    /// Synthetic partition entries are named `p<N>` with `N = entry_index +
    /// 1`; root entries have the empty name.
    fn name(&self) -> String;

    /// The path specification addressing this entry.
    fn path_spec(&self) -> &Arc<PathSpec>;

    /// Kind of this entry.
    fn kind(&self) -> FileEntryKind;

    /// Size of the default data stream, in bytes.
    fn size(&self) -> u64 {
        0
    }

    /// Whether this entry is the root of its filesystem.
    fn is_root(&self) -> bool {
        false
    }

    /// Whether this entry is synthesized rather than stored on media.
    fn is_virtual(&self) -> bool {
        false
    }

    /// Whether this entry is allocated.
    fn is_allocated(&self) -> bool {
        true
    }

    fn is_file(&self) -> bool {
        self.kind() == FileEntryKind::File
    }

    fn is_directory(&self) -> bool {
        self.kind() == FileEntryKind::Directory
    }

    fn is_link(&self) -> bool {
        self.kind() == FileEntryKind::Link
    }

    fn is_device(&self) -> bool {
        self.kind() == FileEntryKind::Device
    }

    fn is_pipe(&self) -> bool {
        self.kind() == FileEntryKind::Pipe
    }

    fn is_socket(&self) -> bool {
        self.kind() == FileEntryKind::Socket
    }

    /// Modification time, when the format records one.
    fn modification_time(&self) -> Option<DateTime<Utc>> {
        None
    }

    /// Access time, when the format records one.
    fn access_time(&self) -> Option<DateTime<Utc>> {
        None
    }

    /// Creation time, when the format records one.
    fn creation_time(&self) -> Option<DateTime<Utc>> {
        None
    }

    /// Fresh iteration over the sub entries, in the underlying format's
    /// enumeration order.
    fn sub_file_entries(&self) -> Box<dyn Iterator<Item = Box<dyn FileEntry>> + '_>;

    /// Number of sub entries; equals the length of the sequence.
    fn number_of_sub_file_entries(&self) -> usize {
        self.sub_file_entries().count()
    }

    /// Fresh iteration over the data streams of this entry.
    fn data_streams(&self) -> Box<dyn Iterator<Item = DataStream> + '_>;

    /// Number of data streams; equals the length of the sequence.
    fn number_of_data_streams(&self) -> usize {
        self.data_streams().count()
    }

    /// The data stream with the given name; `""` designates the default
    /// stream. Unknown names return `None`, not an error.
    fn get_data_stream(&self, name: &str) -> Option<DataStream> {
        self.data_streams().find(|stream| stream.name() == name)
    }

    /// The parent entry within the same filesystem, or `None` for a root.
    fn get_parent_file_entry(&self) -> Option<Box<dyn FileEntry>>;

    /// A file object over the default data stream, when this entry has one.
    fn get_file_object(&self) -> StrataResult<Option<FileObjectRef>> {
        Ok(None)
    }
}
