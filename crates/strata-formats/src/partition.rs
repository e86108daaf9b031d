//! Shared machinery for partition-scheme volume systems.
//!
//! GPT, APM, and MBR expose one filesystem shape: a virtual root
//! directory named `""` enumerating synthetic file entries `p1..pN` in
//! entry-index order. Each partition entry is a file with a single
//! default data stream backed by a range view over the parent stream.
//! The scheme-specific modules parse their tables into
//! [`PartitionTableEntry`] records and wrap them in a
//! [`PartitionFileSystem`].

use std::rc::Rc;
use std::sync::Arc;

use strata_core::error::StrataResult;
use strata_core::path::{PathSpec, PathSpecFactory};
use strata_core::vfs::{
    new_file_object_ref, DataStream, FileEntry, FileEntryKind, FileObjectRef, FileSystem,
    PassThroughFileObject,
};

// ============================================================================
// Table Entries
// ============================================================================

/// One partition parsed from a scheme's table.
#[derive(Debug, Clone)]
pub(crate) struct PartitionTableEntry {
    /// Byte offset of the partition data within the parent stream.
    pub offset: u64,
    /// Byte size of the partition data.
    pub size: u64,
    /// Scheme-specific identifier (GPT partition GUID), lowercase.
    pub identifier: Option<String>,
    /// Whether the scheme marks this partition allocated.
    pub is_allocated: bool,
}

// ============================================================================
// Volume
// ============================================================================

/// Parsed volume state shared between a filesystem and its entries.
pub(crate) struct PartitionVolume {
    type_indicator: &'static str,
    /// Location prefix for identifier addressing (`gpt` enables
    /// `/gpt{<identifier>}`); `None` disables identifier locations.
    identifier_prefix: Option<&'static str>,
    parent: FileObjectRef,
    entries: Vec<PartitionTableEntry>,
}

impl PartitionVolume {
    pub(crate) fn new(
        type_indicator: &'static str,
        identifier_prefix: Option<&'static str>,
        parent: FileObjectRef,
        entries: Vec<PartitionTableEntry>,
    ) -> Self {
        PartitionVolume {
            type_indicator,
            identifier_prefix,
            parent,
            entries,
        }
    }

    /// Resolve a location string to an entry index.
    ///
    /// `/p<N>` is 1-based; `/<prefix>{<identifier>}` matches the
    /// scheme-specific identifier case-insensitively. Anything else is no
    /// entry.
    fn entry_index_by_location(&self, location: &str) -> Option<usize> {
        let label = location.strip_prefix('/')?;
        if let Some(number) = label.strip_prefix('p') {
            let number: usize = number.parse().ok()?;
            let index = number.checked_sub(1)?;
            if index < self.entries.len() {
                return Some(index);
            }
            return None;
        }
        let prefix = self.identifier_prefix?;
        let identifier = label.strip_prefix(prefix)?.strip_prefix('{')?.strip_suffix('}')?;
        self.entries.iter().position(|entry| {
            entry
                .identifier
                .as_deref()
                .is_some_and(|known| known.eq_ignore_ascii_case(identifier))
        })
    }

    /// Resolve a path spec to an entry index, or `None` for the root or an
    /// unknown address.
    fn resolve(&self, path_spec: &Arc<PathSpec>) -> PartitionAddress {
        if let Some(index) = path_spec.entry_index() {
            let index = index as usize;
            if index < self.entries.len() {
                return PartitionAddress::Entry(index);
            }
            return PartitionAddress::Unknown;
        }
        match path_spec.location() {
            Some("/") => PartitionAddress::Root,
            Some(location) => match self.entry_index_by_location(location) {
                Some(index) => PartitionAddress::Entry(index),
                None => PartitionAddress::Unknown,
            },
            None => PartitionAddress::Unknown,
        }
    }
}

enum PartitionAddress {
    Root,
    Entry(usize),
    Unknown,
}

// ============================================================================
// File System
// ============================================================================

/// Filesystem view over a parsed partition table.
pub(crate) struct PartitionFileSystem {
    volume: Rc<PartitionVolume>,
    path_spec: Arc<PathSpec>,
}

impl PartitionFileSystem {
    pub(crate) fn new(volume: PartitionVolume, path_spec: Arc<PathSpec>) -> Self {
        PartitionFileSystem {
            volume: Rc::new(volume),
            path_spec,
        }
    }

    /// The path spec layer beneath this filesystem.
    fn parent_spec(&self) -> Option<Arc<PathSpec>> {
        self.path_spec.parent().map(Arc::clone)
    }

    fn root_entry(&self) -> Box<dyn FileEntry> {
        let path_spec = PathSpecFactory::global()
            .new_path_spec(
                self.volume.type_indicator,
                &[("location", "/".into())],
                self.parent_spec(),
            )
            .expect("built-in partition path specs are valid");
        Box::new(PartitionFileEntry {
            volume: Rc::clone(&self.volume),
            path_spec,
            index: None,
        })
    }

    fn partition_entry(&self, index: usize) -> Box<dyn FileEntry> {
        let path_spec = PathSpecFactory::global()
            .new_path_spec(
                self.volume.type_indicator,
                &[("entry_index", index.into())],
                self.parent_spec(),
            )
            .expect("built-in partition path specs are valid");
        Box::new(PartitionFileEntry {
            volume: Rc::clone(&self.volume),
            path_spec,
            index: Some(index),
        })
    }
}

impl FileSystem for PartitionFileSystem {
    fn type_indicator(&self) -> &'static str {
        self.volume.type_indicator
    }

    fn path_spec(&self) -> &Arc<PathSpec> {
        &self.path_spec
    }

    fn get_file_entry_by_path_spec(
        &self,
        path_spec: &Arc<PathSpec>,
    ) -> StrataResult<Option<Box<dyn FileEntry>>> {
        if path_spec.type_indicator() != self.volume.type_indicator {
            return Ok(None);
        }
        match self.volume.resolve(path_spec) {
            PartitionAddress::Root => Ok(Some(self.root_entry())),
            PartitionAddress::Entry(index) => Ok(Some(self.partition_entry(index))),
            PartitionAddress::Unknown => Ok(None),
        }
    }

    fn get_root_file_entry(&self) -> StrataResult<Box<dyn FileEntry>> {
        Ok(self.root_entry())
    }
}

// ============================================================================
// File Entry
// ============================================================================

/// Virtual root or synthetic partition entry of a partition scheme.
struct PartitionFileEntry {
    volume: Rc<PartitionVolume>,
    path_spec: Arc<PathSpec>,
    /// `None` for the root entry.
    index: Option<usize>,
}

impl PartitionFileEntry {
    fn table_entry(&self) -> Option<&PartitionTableEntry> {
        self.index.map(|index| &self.volume.entries[index])
    }

    fn sibling(&self, index: usize) -> Box<dyn FileEntry> {
        let path_spec = PathSpecFactory::global()
            .new_path_spec(
                self.volume.type_indicator,
                &[("entry_index", index.into())],
                self.path_spec.parent().map(Arc::clone),
            )
            .expect("built-in partition path specs are valid");
        Box::new(PartitionFileEntry {
            volume: Rc::clone(&self.volume),
            path_spec,
            index: Some(index),
        })
    }
}

impl FileEntry for PartitionFileEntry {
    fn name(&self) -> String {
        match self.index {
            Some(index) => format!("p{}", index + 1),
            None => String::new(),
        }
    }

    fn path_spec(&self) -> &Arc<PathSpec> {
        &self.path_spec
    }

    fn kind(&self) -> FileEntryKind {
        match self.index {
            Some(_) => FileEntryKind::File,
            None => FileEntryKind::Directory,
        }
    }

    fn size(&self) -> u64 {
        self.table_entry().map_or(0, |entry| entry.size)
    }

    fn is_root(&self) -> bool {
        self.index.is_none()
    }

    fn is_virtual(&self) -> bool {
        self.index.is_none()
    }

    fn is_allocated(&self) -> bool {
        match self.table_entry() {
            Some(entry) => entry.is_allocated,
            None => true,
        }
    }

    fn sub_file_entries(&self) -> Box<dyn Iterator<Item = Box<dyn FileEntry>> + '_> {
        match self.index {
            Some(_) => Box::new(std::iter::empty()),
            None => Box::new((0..self.volume.entries.len()).map(|index| self.sibling(index))),
        }
    }

    fn data_streams(&self) -> Box<dyn Iterator<Item = DataStream> + '_> {
        match self.index {
            Some(_) => Box::new(std::iter::once(DataStream::default_stream())),
            None => Box::new(std::iter::empty()),
        }
    }

    fn get_parent_file_entry(&self) -> Option<Box<dyn FileEntry>> {
        self.index?;
        let path_spec = PathSpecFactory::global()
            .new_path_spec(
                self.volume.type_indicator,
                &[("location", "/".into())],
                self.path_spec.parent().map(Arc::clone),
            )
            .expect("built-in partition path specs are valid");
        Some(Box::new(PartitionFileEntry {
            volume: Rc::clone(&self.volume),
            path_spec,
            index: None,
        }))
    }

    fn get_file_object(&self) -> StrataResult<Option<FileObjectRef>> {
        let Some(entry) = self.table_entry() else {
            return Ok(None);
        };
        let file_object = PassThroughFileObject::range(
            Arc::clone(&self.path_spec),
            FileObjectRef::clone(&self.volume.parent),
            entry.offset,
            entry.size,
        )?;
        Ok(Some(new_file_object_ref(Box::new(file_object))))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeFileObject;
    use strata_core::definitions::TYPE_INDICATOR_GPT;
    fn volume() -> PartitionFileSystem {
        let data: Vec<u8> = (0u8..=255).cycle().take(4096).collect();
        let parent = new_file_object_ref(Box::new(FakeFileObject::new(data)));
        let entries = vec![
            PartitionTableEntry {
                offset: 512,
                size: 1024,
                identifier: Some("1e25588c-27a9-4094-868c-2f257021f87b".to_string()),
                is_allocated: true,
            },
            PartitionTableEntry {
                offset: 2048,
                size: 512,
                identifier: Some("53d86ccf-3188-4b54-90d8-81866426b70a".to_string()),
                is_allocated: true,
            },
        ];
        let factory = PathSpecFactory::global();
        let os = factory
            .new_path_spec("OS", &[("location", "/tmp/image.raw".into())], None)
            .unwrap();
        let raw = factory.new_path_spec("RAW", &[], Some(os)).unwrap();
        let fs_spec = factory
            .new_path_spec(TYPE_INDICATOR_GPT, &[("location", "/".into())], Some(raw))
            .unwrap();
        PartitionFileSystem::new(
            PartitionVolume::new(TYPE_INDICATOR_GPT, Some("gpt"), parent, entries),
            fs_spec,
        )
    }

    fn entry_spec(fs: &PartitionFileSystem, attributes: &[(&str, strata_core::path::AttributeValue)]) -> Arc<PathSpec> {
        PathSpecFactory::global()
            .new_path_spec(
                TYPE_INDICATOR_GPT,
                attributes,
                fs.path_spec().parent().map(Arc::clone),
            )
            .unwrap()
    }

    #[test]
    fn root_entry_shape() {
        let fs = volume();
        let root = fs.get_root_file_entry().unwrap();
        assert_eq!(root.name(), "");
        assert!(root.is_root());
        assert!(root.is_virtual());
        assert!(root.is_directory());
        assert_eq!(root.number_of_sub_file_entries(), 2);
        assert_eq!(root.number_of_data_streams(), 0);
        assert!(root.get_parent_file_entry().is_none());
    }

    #[test]
    fn sub_entries_enumerate_in_index_order_and_restart() {
        let fs = volume();
        let root = fs.get_root_file_entry().unwrap();
        let names: Vec<String> = root.sub_file_entries().map(|entry| entry.name()).collect();
        assert_eq!(names, ["p1", "p2"]);
        // A fresh iteration starts over.
        let names: Vec<String> = root.sub_file_entries().map(|entry| entry.name()).collect();
        assert_eq!(names, ["p1", "p2"]);
    }

    #[test]
    fn index_location_and_identifier_addressing_agree() {
        let fs = volume();
        let by_index = fs
            .get_file_entry_by_path_spec(&entry_spec(&fs, &[("entry_index", 0u64.into())]))
            .unwrap()
            .unwrap();
        let by_location = fs
            .get_file_entry_by_path_spec(&entry_spec(&fs, &[("location", "/p1".into())]))
            .unwrap()
            .unwrap();
        let by_identifier = fs
            .get_file_entry_by_path_spec(&entry_spec(
                &fs,
                &[(
                    "location",
                    "/gpt{1e25588c-27a9-4094-868c-2f257021f87b}".into(),
                )],
            ))
            .unwrap()
            .unwrap();
        assert_eq!(by_index.name(), "p1");
        assert_eq!(by_location.name(), "p1");
        assert_eq!(by_identifier.name(), "p1");
        assert_eq!(by_index.size(), 1024);
        assert_eq!(by_location.size(), 1024);
        assert_eq!(by_identifier.size(), 1024);
    }

    #[test]
    fn negative_lookups_return_none() {
        let fs = volume();
        for attributes in [
            vec![("entry_index", strata_core::path::AttributeValue::from(9u64))],
            vec![("location", "/p0".into())],
            vec![("location", "/p9".into())],
            vec![("location", "/gpt{00000000-0000-0000-0000-000000000000}".into())],
            vec![("location", "/bogus".into())],
        ] {
            let spec = entry_spec(&fs, &attributes);
            assert!(fs.get_file_entry_by_path_spec(&spec).unwrap().is_none());
            assert!(!fs.file_entry_exists_by_path_spec(&spec));
        }
    }

    #[test]
    fn partition_entry_shape() {
        let fs = volume();
        let entry = fs
            .get_file_entry_by_path_spec(&entry_spec(&fs, &[("entry_index", 0u64.into())]))
            .unwrap()
            .unwrap();
        assert_eq!(entry.name(), "p1");
        assert!(entry.is_file());
        assert!(!entry.is_root());
        assert_eq!(entry.number_of_data_streams(), 1);
        assert_eq!(entry.get_data_stream("").unwrap().name(), "");
        assert!(entry.get_data_stream("bogus").is_none());
        assert_eq!(entry.number_of_sub_file_entries(), 0);
        assert_eq!(entry.get_parent_file_entry().unwrap().name(), "");
    }

    #[test]
    fn partition_data_reads_from_the_parent_range() {
        let fs = volume();
        let entry = fs
            .get_file_entry_by_path_spec(&entry_spec(&fs, &[("entry_index", 0u64.into())]))
            .unwrap()
            .unwrap();
        let file_object = entry.get_file_object().unwrap().unwrap();
        let mut file_object = file_object.borrow_mut();
        assert_eq!(file_object.size().unwrap(), 1024);
        let mut buf = [0u8; 4];
        file_object.read_exact(&mut buf).unwrap();
        // Offset 512 in a repeating 0..=255 pattern.
        assert_eq!(buf, [0, 1, 2, 3]);
    }
}
