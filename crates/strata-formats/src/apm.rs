//! The Apple Partition Map (APM) volume system back-end.
//!
//! Map entries are big-endian `PM` records in consecutive 512-byte
//! sectors starting at sector 1; the first record carries the total entry
//! count. Entries describing the partition map itself
//! (`Apple_partition_map`) are excluded from enumeration; free-space
//! regions are kept, since they remain addressable space.

use std::sync::Arc;

use byteorder::{BigEndian, ByteOrder};

use strata_core::analyzer::{AnalyzerHelper, FormatSpecification, Signature};
use strata_core::definitions::{FormatCategory, TYPE_INDICATOR_APM};
use strata_core::error::{StrataError, StrataResult};
use strata_core::path::PathSpec;
use strata_core::resolver::{Resolver, ResolverContext, ResolverHelper};
use strata_core::vfs::{FileObject, FileSystem, SeekFrom};

use crate::partition::{PartitionFileSystem, PartitionTableEntry, PartitionVolume};

const BYTES_PER_SECTOR: u64 = 512;

const ENTRY_SIGNATURE: &[u8; 2] = b"PM";

/// Partition type of the map's own entries.
const PARTITION_MAP_TYPE: &str = "Apple_partition_map";

/// Status flag: partition is allocated.
const STATUS_ALLOCATED: u32 = 0x0000_0002;

const MAXIMUM_ENTRIES: u32 = 128;

// ============================================================================
// Table Parsing
// ============================================================================

/// NUL-terminated printable string from a fixed-size field.
fn fixed_string(field: &[u8]) -> String {
    let end = field.iter().position(|byte| *byte == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// Parse the partition map; returns the enumerable entries.
fn read_table(file_object: &mut dyn FileObject) -> StrataResult<Vec<PartitionTableEntry>> {
    let stream_size = file_object.size()?;
    if stream_size < BYTES_PER_SECTOR * 2 {
        return Err(StrataError::back_end("stream too small for a partition map"));
    }

    let mut record = [0u8; 512];
    file_object.seek(SeekFrom::Start(BYTES_PER_SECTOR))?;
    file_object.read_exact(&mut record)?;
    if &record[0..2] != ENTRY_SIGNATURE {
        return Err(StrataError::back_end("missing partition map signature"));
    }
    let map_entries = BigEndian::read_u32(&record[4..8]);
    if map_entries == 0 || map_entries > MAXIMUM_ENTRIES {
        return Err(StrataError::back_end("invalid partition map entry count"));
    }

    let mut entries = Vec::new();
    for map_index in 0..map_entries {
        let sector = 1 + u64::from(map_index);
        if (sector + 1) * BYTES_PER_SECTOR > stream_size {
            return Err(StrataError::back_end("partition map exceeds the stream"));
        }
        file_object.seek(SeekFrom::Start(sector * BYTES_PER_SECTOR))?;
        file_object.read_exact(&mut record)?;
        if &record[0..2] != ENTRY_SIGNATURE {
            return Err(StrataError::back_end("damaged partition map entry"));
        }

        let start_sector = BigEndian::read_u32(&record[8..12]);
        let sector_count = BigEndian::read_u32(&record[12..16]);
        let partition_type = fixed_string(&record[48..80]);
        let status = BigEndian::read_u32(&record[88..92]);

        if partition_type == PARTITION_MAP_TYPE {
            continue;
        }
        entries.push(PartitionTableEntry {
            offset: u64::from(start_sector) * BYTES_PER_SECTOR,
            size: u64::from(sector_count) * BYTES_PER_SECTOR,
            identifier: None,
            is_allocated: status & STATUS_ALLOCATED != 0,
        });
    }
    Ok(entries)
}

// ============================================================================
// Resolver Helper
// ============================================================================

/// Resolver helper for `APM` path specifications.
pub struct ApmResolverHelper;

impl ResolverHelper for ApmResolverHelper {
    fn type_indicator(&self) -> &'static str {
        TYPE_INDICATOR_APM
    }

    fn new_file_system(
        &self,
        resolver: &Resolver,
        context: &mut ResolverContext,
        path_spec: &Arc<PathSpec>,
    ) -> StrataResult<Box<dyn FileSystem>> {
        let parent = path_spec.parent().ok_or_else(|| {
            StrataError::path_spec_for(
                "APM path specification requires a parent",
                path_spec.comparable(),
            )
        })?;
        let parent_handle = resolver.open_file_object(parent, context)?;
        let entries = {
            let mut stream = parent_handle.borrow_mut();
            read_table(stream.as_mut())?
        };
        Ok(Box::new(PartitionFileSystem::new(
            PartitionVolume::new(TYPE_INDICATOR_APM, None, parent_handle, entries),
            Arc::clone(path_spec),
        )))
    }
}

// ============================================================================
// Analyzer Helper
// ============================================================================

/// Analyzer helper detecting Apple partition maps.
pub struct ApmAnalyzerHelper;

impl AnalyzerHelper for ApmAnalyzerHelper {
    fn type_indicator(&self) -> &'static str {
        TYPE_INDICATOR_APM
    }

    fn format_categories(&self) -> &'static [FormatCategory] {
        &[FormatCategory::VolumeSystem]
    }

    fn format_specification(&self) -> Option<FormatSpecification> {
        Some(
            FormatSpecification::new(TYPE_INDICATOR_APM)
                .with_signature(Signature::bounded(512, *ENTRY_SIGNATURE)),
        )
    }

    fn analyze_file_object(
        &self,
        file_object: &mut dyn FileObject,
    ) -> StrataResult<Option<&'static str>> {
        match read_table(file_object) {
            Ok(_) => Ok(Some(TYPE_INDICATOR_APM)),
            Err(_) => Ok(None),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
