//! The file-object contract: a seekable, readable byte stream.
//!
//! File objects returned by the resolver are shared (`FileObjectRef`), and
//! the shared handle owns a single seek cursor; a consumer that needs an
//! independent cursor wraps the handle in a [`StreamReader`], which also
//! adapts it to `std::io::Read + Seek` for interoperability with stream
//! codecs.

use std::cell::RefCell;
use std::io;
use std::rc::Rc;
use std::sync::Arc;

use crate::error::{StrataError, StrataResult};
use crate::path::PathSpec;

pub use std::io::SeekFrom;

// ============================================================================
// FileObject
// ============================================================================

/// A read-only, seekable byte stream over one format layer.
pub trait FileObject {
    /// The path specification this object was opened from, when known.
    fn path_spec(&self) -> Option<&Arc<PathSpec>> {
        None
    }

    /// Read up to `buf.len()` bytes at the current offset.
    fn read(&mut self, buf: &mut [u8]) -> StrataResult<usize>;

    /// Reposition the cursor; returns the new offset from the start.
    fn seek(&mut self, pos: SeekFrom) -> StrataResult<u64>;

    /// Current offset from the start of the stream.
    fn offset(&mut self) -> StrataResult<u64>;

    /// Total size of the stream in bytes.
    fn size(&mut self) -> StrataResult<u64>;

    /// Release underlying resources. Must be idempotent; reads after close
    /// fail with a back-end error.
    fn close(&mut self);

    /// Read exactly `buf.len()` bytes or fail.
    fn read_exact(&mut self, buf: &mut [u8]) -> StrataResult<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let read = self.read(&mut buf[filled..])?;
            if read == 0 {
                return Err(StrataError::back_end("unexpected end of stream"));
            }
            filled += read;
        }
        Ok(())
    }

    /// Seek to `offset` and read up to `buf.len()` bytes.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> StrataResult<usize> {
        self.seek(SeekFrom::Start(offset))?;
        self.read(buf)
    }
}

impl std::fmt::Debug for dyn FileObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FileObject")
    }
}

/// Shared handle to an open file object.
///
/// Handles are shared within one resolver context and are not thread-safe;
/// the context that produced a handle owns its lifecycle.
pub type FileObjectRef = Rc<RefCell<Box<dyn FileObject>>>;

/// Wrap a freshly constructed file object into a shared handle.
pub fn new_file_object_ref(file_object: Box<dyn FileObject>) -> FileObjectRef {
    Rc::new(RefCell::new(file_object))
}

// ============================================================================
// PassThroughFileObject
// ============================================================================

/// File object view over a shared parent handle with a private cursor.
///
/// The common shape of single-stream layers (`RAW`, data ranges, partition
/// data streams): reads are forwarded to the parent at `base_offset +
/// cursor`, clamped to `size`.
#[derive(Debug)]
pub struct PassThroughFileObject {
    path_spec: Arc<PathSpec>,
    parent: FileObjectRef,
    base_offset: u64,
    size: u64,
    position: u64,
    open: bool,
}

impl PassThroughFileObject {
    /// View the whole parent stream.
    pub fn whole(path_spec: Arc<PathSpec>, parent: FileObjectRef) -> StrataResult<Self> {
        let size = parent.borrow_mut().size()?;
        Ok(PassThroughFileObject {
            path_spec,
            parent,
            base_offset: 0,
            size,
            position: 0,
            open: true,
        })
    }

    /// View `size` bytes of the parent stream starting at `base_offset`.
    pub fn range(
        path_spec: Arc<PathSpec>,
        parent: FileObjectRef,
        base_offset: u64,
        size: u64,
    ) -> StrataResult<Self> {
        let parent_size = parent.borrow_mut().size()?;
        let fits = match base_offset.checked_add(size) {
            Some(end) => end <= parent_size,
            None => false,
        };
        if !fits {
            return Err(StrataError::back_end_for(
                format!(
                    "range [{}, {}) exceeds parent stream of {} bytes",
                    base_offset,
                    base_offset.saturating_add(size),
                    parent_size
                ),
                path_spec.comparable(),
            ));
        }
        Ok(PassThroughFileObject {
            path_spec,
            parent,
            base_offset,
            size,
            position: 0,
            open: true,
        })
    }
}

impl FileObject for PassThroughFileObject {
    fn path_spec(&self) -> Option<&Arc<PathSpec>> {
        Some(&self.path_spec)
    }

    fn read(&mut self, buf: &mut [u8]) -> StrataResult<usize> {
        if !self.open {
            return Err(StrataError::back_end("file object is closed"));
        }
        if self.position >= self.size {
            return Ok(0);
        }
        let remaining = (self.size - self.position) as usize;
        let count = buf.len().min(remaining);
        let mut parent = self.parent.borrow_mut();
        parent.seek(SeekFrom::Start(self.base_offset + self.position))?;
        let read = parent.read(&mut buf[..count])?;
        self.position += read as u64;
        Ok(read)
    }

    fn seek(&mut self, pos: SeekFrom) -> StrataResult<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => offset as i128,
            SeekFrom::Current(delta) => self.position as i128 + delta as i128,
            SeekFrom::End(delta) => self.size as i128 + delta as i128,
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
        Ok(self.size)
    }

    fn close(&mut self) {
        self.open = false;
    }
}

// ============================================================================
// StreamReader
// ============================================================================

/// `std::io::Read + Seek` adapter over a shared file object.
///
/// Keeps a private cursor, so several readers over the same handle do not
/// fight over the shared seek position.
#[derive(Debug)]
pub struct StreamReader {
    file_object: FileObjectRef,
    position: u64,
}

impl StreamReader {
    /// Create a reader positioned at the start of the stream.
    pub fn new(file_object: FileObjectRef) -> Self {
        StreamReader {
            file_object,
            position: 0,
        }
    }

    /// Current private cursor position.
    pub fn position(&self) -> u64 {
        self.position
    }
}

impl io::Read for StreamReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut file_object = self.file_object.borrow_mut();
        file_object
            .seek(SeekFrom::Start(self.position))
            .map_err(io::Error::other)?;
        let read = file_object.read(buf).map_err(io::Error::other)?;
        self.position += read as u64;
        Ok(read)
    }
}

impl io::Seek for StreamReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => offset as i128,
            SeekFrom::Current(delta) => self.position as i128 + delta as i128,
            SeekFrom::End(delta) => {
                let size = self
                    .file_object
                    .borrow_mut()
                    .size()
                    .map_err(io::Error::other)?;
                size as i128 + delta as i128
            }
        };
        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of stream",
            ));
        }
        self.position = target as u64;
        Ok(self.position)
    }
}

// ============================================================================
// Tests
// ============================================================================
