//! The gzip compressed stream back-end.
//!
//! The file object decompresses through `flate2`, reporting the
//! uncompressed size from the member's ISIZE trailer (size modulo 2^32,
//! per RFC 1952). Decompression is strictly forward; a backward seek
//! restarts the decoder from the start of the parent stream.

use std::io::Read;
use std::sync::Arc;

use flate2::read::GzDecoder;

use strata_core::analyzer::{AnalyzerHelper, FormatSpecification, Signature};
use strata_core::definitions::{FormatCategory, TYPE_INDICATOR_GZIP};
use strata_core::error::{StrataError, StrataResult};
use strata_core::path::PathSpec;
use strata_core::resolver::{Resolver, ResolverContext, ResolverHelper};
use strata_core::vfs::{FileObject, FileObjectRef, SeekFrom, StreamReader};

/// Magic bytes plus the deflate compression method.
const GZIP_SIGNATURE: [u8; 3] = [0x1f, 0x8b, 0x08];

/// Header (10) plus trailer (8) of an empty member.
const MINIMUM_MEMBER_SIZE: u64 = 18;

// ============================================================================
// GzipFileObject
// ============================================================================

/// File object over the decompressed content of a gzip member.
#[derive(Debug)]
pub struct GzipFileObject {
    path_spec: Arc<PathSpec>,
    parent: FileObjectRef,
    decoder: Option<GzDecoder<StreamReader>>,
    /// Bytes already produced by the current decoder.
    decoded: u64,
    /// Logical read cursor; applied lazily on the next read.
    position: u64,
    uncompressed_size: u64,
    open: bool,
}

impl GzipFileObject {
    /// Validate the member header and trailer and set up decompression.
    pub fn open(path_spec: Arc<PathSpec>, parent: FileObjectRef) -> StrataResult<Self> {
        let uncompressed_size = {
            let mut stream = parent.borrow_mut();
            let compressed_size = stream.size()?;
            if compressed_size < MINIMUM_MEMBER_SIZE {
                return Err(StrataError::back_end_for(
                    "stream too small for a gzip member",
                    path_spec.comparable(),
                ));
            }
            let mut magic = [0u8; 3];
            stream.seek(SeekFrom::Start(0))?;
            stream.read_exact(&mut magic)?;
            if magic != GZIP_SIGNATURE {
                return Err(StrataError::back_end_for(
                    "missing gzip signature",
                    path_spec.comparable(),
                ));
            }
            let mut trailer = [0u8; 4];
            stream.seek(SeekFrom::Start(compressed_size - 4))?;
            stream.read_exact(&mut trailer)?;
            u64::from(u32::from_le_bytes(trailer))
        };

        Ok(GzipFileObject {
            path_spec,
            decoder: Some(GzDecoder::new(StreamReader::new(FileObjectRef::clone(
                &parent,
            )))),
            parent,
            decoded: 0,
            position: 0,
            uncompressed_size,
            open: true,
        })
    }

    fn restart(&mut self) {
        self.decoder = Some(GzDecoder::new(StreamReader::new(FileObjectRef::clone(
            &self.parent,
        ))));
        self.decoded = 0;
    }

    /// Advance the decoder to the logical cursor.
    fn catch_up(&mut self) -> StrataResult<()> {
        if self.position < self.decoded || self.decoder.is_none() {
            self.restart();
        }
        let mut scratch = [0u8; 4096];
        while self.decoded < self.position {
            let want = scratch.len().min((self.position - self.decoded) as usize);
            let decoder = self.decoder.as_mut().ok_or_else(|| {
                StrataError::back_end("gzip decoder unavailable")
            })?;
            let read = decoder
                .read(&mut scratch[..want])
                .map_err(|error| StrataError::back_end(format!("gzip read failed: {}", error)))?;
            if read == 0 {
                break;
            }
            self.decoded += read as u64;
        }
        Ok(())
    }
}

impl FileObject for GzipFileObject {
    fn path_spec(&self) -> Option<&Arc<PathSpec>> {
        Some(&self.path_spec)
    }

    fn read(&mut self, buf: &mut [u8]) -> StrataResult<usize> {
        if !self.open {
            return Err(StrataError::back_end("file object is closed"));
        }
        self.catch_up()?;
        if self.decoded < self.position {
            // Cursor parked past the end of the member.
            return Ok(0);
        }
        let decoder = self
            .decoder
            .as_mut()
            .ok_or_else(|| StrataError::back_end("gzip decoder unavailable"))?;
        let read = decoder
            .read(buf)
            .map_err(|error| StrataError::back_end(format!("gzip read failed: {}", error)))?;
        self.decoded += read as u64;
        self.position += read as u64;
        Ok(read)
    }

    fn seek(&mut self, pos: SeekFrom) -> StrataResult<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => offset as i128,
            SeekFrom::Current(delta) => self.position as i128 + delta as i128,
            SeekFrom::End(delta) => self.uncompressed_size as i128 + delta as i128,
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
        Ok(self.uncompressed_size)
    }

    fn close(&mut self) {
        self.decoder = None;
        self.open = false;
    }
}

// ============================================================================
// Resolver Helper
// ============================================================================

/// Resolver helper for `GZIP` path specifications.
pub struct GzipResolverHelper;

impl ResolverHelper for GzipResolverHelper {
    fn type_indicator(&self) -> &'static str {
        TYPE_INDICATOR_GZIP
    }

    fn new_file_object(
        &self,
        resolver: &Resolver,
        context: &mut ResolverContext,
        path_spec: &Arc<PathSpec>,
    ) -> StrataResult<Box<dyn FileObject>> {
        let parent = path_spec.parent().ok_or_else(|| {
            StrataError::path_spec_for(
                "GZIP path specification requires a parent",
                path_spec.comparable(),
            )
        })?;
        let parent_handle = resolver.open_file_object(parent, context)?;
        Ok(Box::new(GzipFileObject::open(
            Arc::clone(path_spec),
            parent_handle,
        )?))
    }
}

// ============================================================================
// Analyzer Helper
// ============================================================================

/// Analyzer helper detecting gzip members.
pub struct GzipAnalyzerHelper;

impl AnalyzerHelper for GzipAnalyzerHelper {
    fn type_indicator(&self) -> &'static str {
        TYPE_INDICATOR_GZIP
    }

    fn format_categories(&self) -> &'static [FormatCategory] {
        &[FormatCategory::CompressedStream]
    }

    fn format_specification(&self) -> Option<FormatSpecification> {
        Some(
            FormatSpecification::new(TYPE_INDICATOR_GZIP)
                .with_signature(Signature::bounded(0, GZIP_SIGNATURE))
                .with_mime_type("application/gzip"),
        )
    }

    fn analyze_file_object(
        &self,
        file_object: &mut dyn FileObject,
    ) -> StrataResult<Option<&'static str>> {
        let mut header = [0u8; 4];
        if file_object.read(&mut header)? < header.len() {
            return Ok(None);
        }
        // Magic, deflate method, and no reserved flag bits.
        if header[..3] == GZIP_SIGNATURE && header[3] & 0xe0 == 0 {
            Ok(Some(TYPE_INDICATOR_GZIP))
        } else {
            Ok(None)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeFileObject;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use strata_core::path::PathSpecFactory;
    use strata_core::vfs::new_file_object_ref;

    const PAYLOAD: &[u8] = b"the quick brown fox jumps over the lazy dog";

    fn gzip_bytes(payload: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(payload).unwrap();
        encoder.finish().unwrap()
    }

    fn gzip_spec() -> Arc<PathSpec> {
        let factory = PathSpecFactory::global();
        let os = factory
            .new_path_spec("OS", &[("location", "/tmp/file.gz".into())], None)
            .unwrap();
        factory.new_path_spec("GZIP", &[], Some(os)).unwrap()
    }

    fn open_fixture(payload: &[u8]) -> GzipFileObject {
        let parent = new_file_object_ref(Box::new(FakeFileObject::new(gzip_bytes(payload))));
        GzipFileObject::open(gzip_spec(), parent).unwrap()
    }

    #[test]
    fn size_comes_from_the_trailer() {
        let mut file_object = open_fixture(PAYLOAD);
        assert_eq!(file_object.size().unwrap(), PAYLOAD.len() as u64);
    }

    #[test]
    fn sequential_read_decompresses() {
        let mut file_object = open_fixture(PAYLOAD);
        let mut content = vec![0u8; PAYLOAD.len()];
        file_object.read_exact(&mut content).unwrap();
        assert_eq!(content, PAYLOAD);
        let mut extra = [0u8; 8];
        assert_eq!(file_object.read(&mut extra).unwrap(), 0);
    }

    #[test]
    fn forward_and_backward_seeks() {
        let mut file_object = open_fixture(PAYLOAD);
        file_object.seek(SeekFrom::Start(10)).unwrap();
        let mut buf = [0u8; 5];
        file_object.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, &PAYLOAD[10..15]);

        // Backward seek forces a decoder restart.
        file_object.seek(SeekFrom::Start(4)).unwrap();
        file_object.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, &PAYLOAD[4..9]);

        file_object.seek(SeekFrom::End(-3)).unwrap();
        let mut tail = [0u8; 3];
        file_object.read_exact(&mut tail).unwrap();
        assert_eq!(&tail, &PAYLOAD[PAYLOAD.len() - 3..]);
    }

    #[test]
    fn non_gzip_stream_is_rejected() {
        let parent = new_file_object_ref(Box::new(FakeFileObject::new(vec![0u8; 64])));
        let err = GzipFileObject::open(gzip_spec(), parent).unwrap_err();
        assert!(matches!(err, StrataError::BackEnd { .. }));
    }

    #[test]
    fn analyzer_probe_accepts_gzip_and_rejects_noise() {
        let helper = GzipAnalyzerHelper;

        let mut stream = FakeFileObject::new(gzip_bytes(PAYLOAD));
        assert_eq!(
            helper.analyze_file_object(&mut stream).unwrap(),
            Some(TYPE_INDICATOR_GZIP)
        );

        let mut stream = FakeFileObject::new(vec![0u8; 64]);
        assert_eq!(helper.analyze_file_object(&mut stream).unwrap(), None);
    }
}
