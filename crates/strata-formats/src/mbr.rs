//! The Master Boot Record (MBR) volume system back-end.
//!
//! The four primary slots behind the `55 aa` boot signature are surfaced
//! as-is; an extended-type slot appears as a plain entry and the EBR
//! chain is not walked. The probe additionally requires sane status
//! bytes and at least one used slot, since a two-byte signature alone
//! matches far too much.

use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};

use strata_core::analyzer::{AnalyzerHelper, FormatSpecification, Signature};
use strata_core::definitions::{FormatCategory, TYPE_INDICATOR_MBR};
use strata_core::error::{StrataError, StrataResult};
use strata_core::path::PathSpec;
use strata_core::resolver::{Resolver, ResolverContext, ResolverHelper};
use strata_core::vfs::{FileObject, FileSystem, SeekFrom};

use crate::partition::{PartitionFileSystem, PartitionTableEntry, PartitionVolume};

const BYTES_PER_SECTOR: u64 = 512;

const BOOT_SIGNATURE: [u8; 2] = [0x55, 0xaa];

/// Offset of the partition table within the boot sector.
const TABLE_OFFSET: usize = 446;

// ============================================================================
// Table Parsing
// ============================================================================

/// Parse the boot sector; returns the used primary slots.
fn read_table(file_object: &mut dyn FileObject) -> StrataResult<Vec<PartitionTableEntry>> {
    let stream_size = file_object.size()?;
    if stream_size < BYTES_PER_SECTOR {
        return Err(StrataError::back_end("stream too small for a boot sector"));
    }

    let mut sector = [0u8; 512];
    file_object.seek(SeekFrom::Start(0))?;
    file_object.read_exact(&mut sector)?;
    if sector[510..512] != BOOT_SIGNATURE {
        return Err(StrataError::back_end("missing MBR boot signature"));
    }

    let mut entries = Vec::new();
    for slot in 0..4 {
        let record = &sector[TABLE_OFFSET + slot * 16..TABLE_OFFSET + (slot + 1) * 16];
        let status = record[0];
        let partition_type = record[4];
        let start_lba = LittleEndian::read_u32(&record[8..12]);
        let sector_count = LittleEndian::read_u32(&record[12..16]);

        if partition_type == 0 || sector_count == 0 {
            continue;
        }
        if status != 0x00 && status != 0x80 {
            return Err(StrataError::back_end("invalid MBR partition status"));
        }
        entries.push(PartitionTableEntry {
            offset: u64::from(start_lba) * BYTES_PER_SECTOR,
            size: u64::from(sector_count) * BYTES_PER_SECTOR,
            identifier: None,
            is_allocated: true,
        });
    }
    if entries.is_empty() {
        return Err(StrataError::back_end("MBR partition table is empty"));
    }
    Ok(entries)
}

// ============================================================================
// Resolver Helper
// ============================================================================

/// Resolver helper for `MBR` path specifications.
pub struct MbrResolverHelper;

impl ResolverHelper for MbrResolverHelper {
    fn type_indicator(&self) -> &'static str {
        TYPE_INDICATOR_MBR
    }

    fn new_file_system(
        &self,
        resolver: &Resolver,
        context: &mut ResolverContext,
        path_spec: &Arc<PathSpec>,
    ) -> StrataResult<Box<dyn FileSystem>> {
        let parent = path_spec.parent().ok_or_else(|| {
            StrataError::path_spec_for(
                "MBR path specification requires a parent",
                path_spec.comparable(),
            )
        })?;
        let parent_handle = resolver.open_file_object(parent, context)?;
        let entries = {
            let mut stream = parent_handle.borrow_mut();
            read_table(stream.as_mut())?
        };
        Ok(Box::new(PartitionFileSystem::new(
            PartitionVolume::new(TYPE_INDICATOR_MBR, None, parent_handle, entries),
            Arc::clone(path_spec),
        )))
    }
}

// ============================================================================
// Analyzer Helper
// ============================================================================

/// Analyzer helper detecting MBR partition tables.
pub struct MbrAnalyzerHelper;

impl AnalyzerHelper for MbrAnalyzerHelper {
    fn type_indicator(&self) -> &'static str {
        TYPE_INDICATOR_MBR
    }

    fn format_categories(&self) -> &'static [FormatCategory] {
        &[FormatCategory::VolumeSystem]
    }

    fn format_specification(&self) -> Option<FormatSpecification> {
        Some(
            FormatSpecification::new(TYPE_INDICATOR_MBR)
                .with_signature(Signature::bounded(510, BOOT_SIGNATURE)),
        )
    }

    fn analyze_file_object(
        &self,
        file_object: &mut dyn FileObject,
    ) -> StrataResult<Option<&'static str>> {
        match read_table(file_object) {
            Ok(_) => Ok(Some(TYPE_INDICATOR_MBR)),
            Err(_) => Ok(None),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
