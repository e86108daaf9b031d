//! The operating system back-end: file objects over local files.
//!
//! `OS` is a root-layer type; its path specs carry a `location` naming a
//! file on the host filesystem and never have a parent. The location is
//! used as given, without normalization, so two spellings of the same
//! file are distinct cache entries.

use std::fs::File;
use std::io::{Read, Seek};
use std::sync::Arc;

use strata_core::definitions::TYPE_INDICATOR_OS;
use strata_core::error::{StrataError, StrataResult};
use strata_core::path::PathSpec;
use strata_core::resolver::{Resolver, ResolverContext, ResolverHelper};
use strata_core::vfs::{FileObject, SeekFrom};

// ============================================================================
// OsFileObject
// ============================================================================

/// File object over a local file.
#[derive(Debug)]
pub struct OsFileObject {
    path_spec: Arc<PathSpec>,
    file: Option<File>,
    size: u64,
}

impl OsFileObject {
    /// Open the file named by the spec's `location`.
    pub fn open(path_spec: Arc<PathSpec>) -> StrataResult<Self> {
        let location = path_spec.location().ok_or_else(|| {
            StrataError::path_spec_for(
                "OS path specification requires a location",
                path_spec.comparable(),
            )
        })?;
        let file = File::open(location).map_err(|error| match error.kind() {
            std::io::ErrorKind::PermissionDenied => {
                StrataError::access(format!("cannot open {}: {}", location, error))
            }
            _ => StrataError::back_end_for(
                format!("cannot open {}: {}", location, error),
                path_spec.comparable(),
            ),
        })?;
        let size = file
            .metadata()
            .map_err(|error| {
                StrataError::back_end_for(
                    format!("cannot stat {}: {}", location, error),
                    path_spec.comparable(),
                )
            })?
            .len();
        Ok(OsFileObject {
            path_spec,
            file: Some(file),
            size,
        })
    }

    fn file_mut(&mut self) -> StrataResult<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| StrataError::back_end("file object is closed"))
    }
}

impl FileObject for OsFileObject {
    fn path_spec(&self) -> Option<&Arc<PathSpec>> {
        Some(&self.path_spec)
    }

    fn read(&mut self, buf: &mut [u8]) -> StrataResult<usize> {
        Ok(self.file_mut()?.read(buf)?)
    }

    fn seek(&mut self, pos: SeekFrom) -> StrataResult<u64> {
        Ok(self.file_mut()?.seek(pos)?)
    }

    fn offset(&mut self) -> StrataResult<u64> {
        Ok(self.file_mut()?.stream_position()?)
    }

    fn size(&mut self) -> StrataResult<u64> {
        Ok(self.size)
    }

    fn close(&mut self) {
        self.file = None;
    }
}

// ============================================================================
// Resolver Helper
// ============================================================================

/// Resolver helper for `OS` path specifications.
pub struct OsResolverHelper;

impl ResolverHelper for OsResolverHelper {
    fn type_indicator(&self) -> &'static str {
        TYPE_INDICATOR_OS
    }

    fn new_file_object(
        &self,
        _resolver: &Resolver,
        _context: &mut ResolverContext,
        path_spec: &Arc<PathSpec>,
    ) -> StrataResult<Box<dyn FileObject>> {
        Ok(Box::new(OsFileObject::open(Arc::clone(path_spec))?))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use strata_core::path::PathSpecFactory;

    fn temp_file(content: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file.flush().unwrap();
        file
    }

    fn os_spec(location: &str) -> Arc<PathSpec> {
        PathSpecFactory::global()
            .new_path_spec(TYPE_INDICATOR_OS, &[("location", location.into())], None)
            .unwrap()
    }

    #[test]
    fn open_read_seek() {
        let file = temp_file(b"hello, strata");
        let spec = os_spec(&file.path().to_string_lossy());
        let mut file_object = OsFileObject::open(spec).unwrap();

        assert_eq!(file_object.size().unwrap(), 13);

        let mut buf = [0u8; 5];
        file_object.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");

        file_object.seek(SeekFrom::Start(7)).unwrap();
        assert_eq!(file_object.offset().unwrap(), 7);
        file_object.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"strat");
    }

    #[test]
    fn missing_file_is_a_back_end_error() {
        let spec = os_spec("/nonexistent/strata-test-file");
        let err = OsFileObject::open(spec).unwrap_err();
        assert!(matches!(err, StrataError::BackEnd { .. }));
    }

    #[test]
    fn reads_after_close_fail() {
        let file = temp_file(b"data");
        let spec = os_spec(&file.path().to_string_lossy());
        let mut file_object = OsFileObject::open(spec).unwrap();
        file_object.close();
        file_object.close();
        let mut buf = [0u8; 1];
        assert!(file_object.read(&mut buf).is_err());
    }
}
