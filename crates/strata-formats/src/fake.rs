//! In-memory filesystem test double.
//!
//! `FakeFileSystem` and `FakeFileObject` exercise the VFS contracts
//! without touching disk. They are constructed directly rather than
//! through a resolver helper; tests that need resolver coverage use the
//! `OS` back-end over a temporary file instead.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use strata_core::definitions::TYPE_INDICATOR_FAKE;
use strata_core::error::{StrataError, StrataResult};
use strata_core::path::PathSpec;
use strata_core::vfs::{
    new_file_object_ref, DataStream, FileEntry, FileEntryKind, FileObject, FileObjectRef,
    FileSystem, SeekFrom,
};

// ============================================================================
// FakeFileObject
// ============================================================================

/// File object over an in-memory byte buffer.
pub struct FakeFileObject {
    data: Vec<u8>,
    position: u64,
    open: bool,
}

impl FakeFileObject {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        FakeFileObject {
            data: data.into(),
            position: 0,
            open: true,
        }
    }
}

impl FileObject for FakeFileObject {
    fn read(&mut self, buf: &mut [u8]) -> StrataResult<usize> {
        if !self.open {
            return Err(StrataError::back_end("file object is closed"));
        }
        let start = self.position.min(self.data.len() as u64) as usize;
        let available = &self.data[start..];
        let count = available.len().min(buf.len());
        buf[..count].copy_from_slice(&available[..count]);
        self.position += count as u64;
        Ok(count)
    }

    fn seek(&mut self, pos: SeekFrom) -> StrataResult<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => offset as i128,
            SeekFrom::Current(delta) => self.position as i128 + delta as i128,
            SeekFrom::End(delta) => self.data.len() as i128 + delta as i128,
        };
        if target < 0 {
            return Err(StrataError::back_end("seek before start of stream"));
        }
        self.position = target as u64;
        Ok(self.position)
    }

    fn offset(&mut self) -> StrataResult<u64> {
        Ok(self.position)
    }

    fn size(&mut self) -> StrataResult<u64> {
        Ok(self.data.len() as u64)
    }

    fn close(&mut self) {
        self.open = false;
    }
}

// ============================================================================
// FakeFileSystem
// ============================================================================

#[derive(Debug, Clone)]
struct FakeEntryData {
    kind: FileEntryKind,
    data: Vec<u8>,
    modification_time: Option<DateTime<Utc>>,
}

/// In-memory filesystem keyed by absolute POSIX-style locations.
pub struct FakeFileSystem {
    path_spec: Arc<PathSpec>,
    entries: Rc<RefCell<BTreeMap<String, FakeEntryData>>>,
}

impl FakeFileSystem {
    /// Create a fake filesystem holding only the root directory.
    ///
    /// `path_spec` is conventionally a `FAKE` spec with `location="/"`.
    pub fn new(path_spec: Arc<PathSpec>) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(
            "/".to_string(),
            FakeEntryData {
                kind: FileEntryKind::Directory,
                data: Vec::new(),
                modification_time: None,
            },
        );
        FakeFileSystem {
            path_spec,
            entries: Rc::new(RefCell::new(entries)),
        }
    }

    fn add_entry(
        &self,
        location: &str,
        kind: FileEntryKind,
        data: Vec<u8>,
        modification_time: Option<DateTime<Utc>>,
    ) -> StrataResult<()> {
        if !location.starts_with('/') || location.len() < 2 {
            return Err(StrataError::path_spec(format!(
                "fake filesystem location must be absolute: {}",
                location
            )));
        }
        let mut entries = self.entries.borrow_mut();
        if entries.contains_key(location) {
            return Err(StrataError::path_spec(format!(
                "fake filesystem location already exists: {}",
                location
            )));
        }
        entries.insert(
            location.to_string(),
            FakeEntryData {
                kind,
                data,
                modification_time,
            },
        );
        Ok(())
    }

    /// Add a regular file with the given content.
    pub fn add_file(&self, location: &str, data: impl Into<Vec<u8>>) -> StrataResult<()> {
        self.add_entry(location, FileEntryKind::File, data.into(), None)
    }

    /// Add a regular file with a modification time.
    pub fn add_file_with_time(
        &self,
        location: &str,
        data: impl Into<Vec<u8>>,
        modification_time: DateTime<Utc>,
    ) -> StrataResult<()> {
        self.add_entry(
            location,
            FileEntryKind::File,
            data.into(),
            Some(modification_time),
        )
    }

    /// Add a directory.
    pub fn add_directory(&self, location: &str) -> StrataResult<()> {
        self.add_entry(location, FileEntryKind::Directory, Vec::new(), None)
    }

    /// Add a symbolic link whose content is the target location.
    pub fn add_symlink(&self, location: &str, target: &str) -> StrataResult<()> {
        self.add_entry(
            location,
            FileEntryKind::Link,
            target.as_bytes().to_vec(),
            None,
        )
    }

    fn entry(&self, location: &str) -> Option<FakeEntryData> {
        self.entries.borrow().get(location).cloned()
    }

    fn make_entry(&self, location: &str, data: FakeEntryData) -> Box<dyn FileEntry> {
        let path_spec = strata_core::path::PathSpecFactory::global()
            .new_path_spec(TYPE_INDICATOR_FAKE, &[("location", location.into())], None)
            .expect("fake locations are valid path spec attributes");
        Box::new(FakeFileEntry {
            entries: Rc::clone(&self.entries),
            path_spec,
            location: location.to_string(),
            data,
        })
    }
}

impl FileSystem for FakeFileSystem {
    fn type_indicator(&self) -> &'static str {
        TYPE_INDICATOR_FAKE
    }

    fn path_spec(&self) -> &Arc<PathSpec> {
        &self.path_spec
    }

    fn get_file_entry_by_path_spec(
        &self,
        path_spec: &Arc<PathSpec>,
    ) -> StrataResult<Option<Box<dyn FileEntry>>> {
        if path_spec.type_indicator() != TYPE_INDICATOR_FAKE {
            return Ok(None);
        }
        let Some(location) = path_spec.location() else {
            return Ok(None);
        };
        match self.entry(location) {
            Some(data) => Ok(Some(self.make_entry(location, data))),
            None => Ok(None),
        }
    }

    fn get_root_file_entry(&self) -> StrataResult<Box<dyn FileEntry>> {
        let data = self
            .entry("/")
            .ok_or_else(|| StrataError::back_end("fake filesystem lost its root"))?;
        Ok(self.make_entry("/", data))
    }
}

// ============================================================================
// FakeFileEntry
// ============================================================================

struct FakeFileEntry {
    entries: Rc<RefCell<BTreeMap<String, FakeEntryData>>>,
    path_spec: Arc<PathSpec>,
    location: String,
    data: FakeEntryData,
}

impl FakeFileEntry {
    /// Locations of the direct children of `location`.
    fn child_locations(&self) -> Vec<String> {
        let prefix = if self.location == "/" {
            "/".to_string()
        } else {
            format!("{}/", self.location)
        };
        self.entries
            .borrow()
            .keys()
            .filter(|key| {
                key.len() > prefix.len()
                    && key.starts_with(&prefix)
                    && !key[prefix.len()..].contains('/')
            })
            .cloned()
            .collect()
    }

    fn entry_at(&self, location: &str) -> Option<Box<dyn FileEntry>> {
        let data = self.entries.borrow().get(location).cloned()?;
        let path_spec = strata_core::path::PathSpecFactory::global()
            .new_path_spec(TYPE_INDICATOR_FAKE, &[("location", location.into())], None)
            .ok()?;
        Some(Box::new(FakeFileEntry {
            entries: Rc::clone(&self.entries),
            path_spec,
            location: location.to_string(),
            data,
        }))
    }
}

impl FileEntry for FakeFileEntry {
    fn name(&self) -> String {
        if self.location == "/" {
            return String::new();
        }
        self.location
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string()
    }

    fn path_spec(&self) -> &Arc<PathSpec> {
        &self.path_spec
    }

    fn kind(&self) -> FileEntryKind {
        self.data.kind
    }

    fn size(&self) -> u64 {
        self.data.data.len() as u64
    }

    fn is_root(&self) -> bool {
        self.location == "/"
    }

    fn is_virtual(&self) -> bool {
        true
    }

    fn modification_time(&self) -> Option<DateTime<Utc>> {
        self.data.modification_time
    }

    fn sub_file_entries(&self) -> Box<dyn Iterator<Item = Box<dyn FileEntry>> + '_> {
        let locations = self.child_locations();
        Box::new(
            locations
                .into_iter()
                .filter_map(|location| self.entry_at(&location)),
        )
    }

    fn data_streams(&self) -> Box<dyn Iterator<Item = DataStream> + '_> {
        match self.data.kind {
            FileEntryKind::File => Box::new(std::iter::once(DataStream::default_stream())),
            _ => Box::new(std::iter::empty()),
        }
    }

    fn get_parent_file_entry(&self) -> Option<Box<dyn FileEntry>> {
        if self.location == "/" {
            return None;
        }
        let parent_location = match self.location.rsplit_once('/') {
            Some(("", _)) => "/",
            Some((parent, _)) => parent,
            None => return None,
        };
        self.entry_at(parent_location)
    }

    fn get_file_object(&self) -> StrataResult<Option<FileObjectRef>> {
        match self.data.kind {
            FileEntryKind::File => Ok(Some(new_file_object_ref(Box::new(FakeFileObject::new(
                self.data.data.clone(),
            ))))),
            _ => Ok(None),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
