//! The GUID Partition Table (GPT) volume system back-end.
//!
//! The header lives at LBA 1; the sector size is probed at 512 then 4096
//! bytes. Header signature, size, and CRC32 are validated, as is the
//! CRC32 of the partition entry array. Entries with a zero type GUID are
//! unused and skipped. Partitions are addressable by `entry_index`,
//! `/p<N>`, or `/gpt{<partition guid>}`.

use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};
use tracing::warn;
use uuid::Uuid;

use strata_core::analyzer::{AnalyzerHelper, FormatSpecification, Signature};
use strata_core::definitions::{FormatCategory, TYPE_INDICATOR_GPT};
use strata_core::error::{StrataError, StrataResult};
use strata_core::path::PathSpec;
use strata_core::resolver::{Resolver, ResolverContext, ResolverHelper};
use strata_core::vfs::{FileObject, FileSystem, SeekFrom};

use crate::partition::{PartitionFileSystem, PartitionTableEntry, PartitionVolume};

const GPT_SIGNATURE: &[u8; 8] = b"EFI PART";

/// Sector sizes probed for the header, in order.
const SECTOR_SIZES: [u64; 2] = [512, 4096];

const MINIMUM_HEADER_SIZE: u32 = 92;
const MINIMUM_ENTRY_SIZE: u32 = 128;
const MAXIMUM_ENTRIES: u32 = 4096;

// ============================================================================
// Table Parsing
// ============================================================================

/// Parse and validate the partition table; returns the usable entries.
fn read_table(file_object: &mut dyn FileObject) -> StrataResult<Vec<PartitionTableEntry>> {
    let stream_size = file_object.size()?;
    for bytes_per_sector in SECTOR_SIZES {
        if let Ok(entries) = read_table_at(file_object, stream_size, bytes_per_sector) {
            return Ok(entries);
        }
    }
    Err(StrataError::back_end("no valid GPT header found"))
}

fn read_table_at(
    file_object: &mut dyn FileObject,
    stream_size: u64,
    bytes_per_sector: u64,
) -> StrataResult<Vec<PartitionTableEntry>> {
    // Header sector plus at least the fixed header fields.
    if stream_size < bytes_per_sector + u64::from(MINIMUM_HEADER_SIZE) {
        return Err(StrataError::back_end("stream too small for a GPT header"));
    }
    let mut header = [0u8; 512];
    let header_read = (stream_size - bytes_per_sector).min(header.len() as u64) as usize;
    file_object.seek(SeekFrom::Start(bytes_per_sector))?;
    file_object.read_exact(&mut header[..header_read])?;

    if &header[0..8] != GPT_SIGNATURE {
        return Err(StrataError::back_end("missing GPT signature"));
    }
    let header_size = LittleEndian::read_u32(&header[12..16]);
    if header_size < MINIMUM_HEADER_SIZE || header_size as usize > header_read {
        return Err(StrataError::back_end("invalid GPT header size"));
    }
    let header_crc = LittleEndian::read_u32(&header[16..20]);
    let mut checked = header[..header_size as usize].to_vec();
    checked[16..20].fill(0);
    if crc32fast::hash(&checked) != header_crc {
        return Err(StrataError::back_end("GPT header checksum mismatch"));
    }

    let entries_lba = LittleEndian::read_u64(&header[72..80]);
    let number_of_entries = LittleEndian::read_u32(&header[80..84]);
    let entry_size = LittleEndian::read_u32(&header[84..88]);
    let entries_crc = LittleEndian::read_u32(&header[88..92]);

    if entry_size < MINIMUM_ENTRY_SIZE || entry_size % 8 != 0 {
        return Err(StrataError::back_end("invalid GPT entry size"));
    }
    if number_of_entries == 0 || number_of_entries > MAXIMUM_ENTRIES {
        return Err(StrataError::back_end("invalid GPT entry count"));
    }

    let table_offset = entries_lba
        .checked_mul(bytes_per_sector)
        .ok_or_else(|| StrataError::back_end("GPT entry array offset overflow"))?;
    let table_size = u64::from(number_of_entries) * u64::from(entry_size);
    if table_offset
        .checked_add(table_size)
        .map(|end| end > stream_size)
        .unwrap_or(true)
    {
        return Err(StrataError::back_end("GPT entry array exceeds the stream"));
    }

    let mut table = vec![0u8; table_size as usize];
    file_object.seek(SeekFrom::Start(table_offset))?;
    file_object.read_exact(&mut table)?;
    if crc32fast::hash(&table) != entries_crc {
        return Err(StrataError::back_end("GPT entry array checksum mismatch"));
    }

    let mut entries = Vec::new();
    for (index, chunk) in table.chunks_exact(entry_size as usize).enumerate() {
        if chunk[..16].iter().all(|byte| *byte == 0) {
            continue;
        }
        let mut guid = [0u8; 16];
        guid.copy_from_slice(&chunk[16..32]);
        let identifier = Uuid::from_bytes_le(guid).to_string();

        let first_lba = LittleEndian::read_u64(&chunk[32..40]);
        let last_lba = LittleEndian::read_u64(&chunk[40..48]);
        if last_lba < first_lba {
            warn!(index, "GPT entry has last LBA before first LBA, skipping");
            continue;
        }
        let offset = first_lba.checked_mul(bytes_per_sector);
        let size = last_lba
            .checked_sub(first_lba)
            .and_then(|sectors| sectors.checked_add(1))
            .and_then(|sectors| sectors.checked_mul(bytes_per_sector));
        let (Some(offset), Some(size)) = (offset, size) else {
            warn!(index, "GPT entry exceeds the addressable range, skipping");
            continue;
        };
        entries.push(PartitionTableEntry {
            offset,
            size,
            identifier: Some(identifier),
            is_allocated: true,
        });
    }
    Ok(entries)
}

// ============================================================================
// Resolver Helper
// ============================================================================

/// Resolver helper for `GPT` path specifications.
pub struct GptResolverHelper;

impl ResolverHelper for GptResolverHelper {
    fn type_indicator(&self) -> &'static str {
        TYPE_INDICATOR_GPT
    }

    fn new_file_system(
        &self,
        resolver: &Resolver,
        context: &mut ResolverContext,
        path_spec: &Arc<PathSpec>,
    ) -> StrataResult<Box<dyn FileSystem>> {
        let parent = path_spec.parent().ok_or_else(|| {
            StrataError::path_spec_for(
                "GPT path specification requires a parent",
                path_spec.comparable(),
            )
        })?;
        let parent_handle = resolver.open_file_object(parent, context)?;
        let entries = {
            let mut stream = parent_handle.borrow_mut();
            read_table(stream.as_mut())?
        };
        Ok(Box::new(PartitionFileSystem::new(
            PartitionVolume::new(TYPE_INDICATOR_GPT, Some("gpt"), parent_handle, entries),
            Arc::clone(path_spec),
        )))
    }
}

// ============================================================================
// Analyzer Helper
// ============================================================================

/// Analyzer helper detecting GPT volume systems.
pub struct GptAnalyzerHelper;

impl AnalyzerHelper for GptAnalyzerHelper {
    fn type_indicator(&self) -> &'static str {
        TYPE_INDICATOR_GPT
    }

    fn format_categories(&self) -> &'static [FormatCategory] {
        &[FormatCategory::VolumeSystem]
    }

    fn format_specification(&self) -> Option<FormatSpecification> {
        Some(
            FormatSpecification::new(TYPE_INDICATOR_GPT)
                .with_signature(Signature::bounded(512, *GPT_SIGNATURE))
                .with_signature(Signature::bounded(4096, *GPT_SIGNATURE)),
        )
    }

    fn analyze_file_object(
        &self,
        file_object: &mut dyn FileObject,
    ) -> StrataResult<Option<&'static str>> {
        match read_table(file_object) {
            Ok(_) => Ok(Some(TYPE_INDICATOR_GPT)),
            Err(_) => Ok(None),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::fake::FakeFileObject;

    pub(crate) const PARTITION_1_GUID: &str = "1e25588c-27a9-4094-868c-2f257021f87b";
    pub(crate) const PARTITION_2_GUID: &str = "53d86ccf-3188-4b54-90d8-81866426b70a";

    /// Build a minimal valid GPT image: two 65536-byte partitions at
    /// offsets 1048576 and 2097152, 512-byte sectors.
    pub(crate) fn build_gpt_image() -> Vec<u8> {
        const SECTOR: usize = 512;
        let mut image = vec![0u8; 3 * 1024 * 1024];

        // Protective MBR.
        image[446 + 4] = 0xee;
        LittleEndian::write_u32(&mut image[446 + 8..446 + 12], 1);
        LittleEndian::write_u32(&mut image[446 + 12..446 + 16], 0xffff_ffff);
        image[510] = 0x55;
        image[511] = 0xaa;

        // Partition entry array at LBA 2.
        let mut table = vec![0u8; 128 * 128];
        let linux_type = Uuid::parse_str("0fc63daf-8483-4772-8e79-3d69d8477de4").unwrap();
        for (index, (guid, first_lba)) in [
            (PARTITION_1_GUID, 2048u64),
            (PARTITION_2_GUID, 4096u64),
        ]
        .iter()
        .enumerate()
        {
            let entry = &mut table[index * 128..(index + 1) * 128];
            entry[..16].copy_from_slice(&linux_type.to_bytes_le());
            entry[16..32].copy_from_slice(&Uuid::parse_str(guid).unwrap().to_bytes_le());
            LittleEndian::write_u64(&mut entry[32..40], *first_lba);
            // 65536 bytes = 128 sectors.
            LittleEndian::write_u64(&mut entry[40..48], first_lba + 127);
        }
        let table_offset = 2 * SECTOR;
        image[table_offset..table_offset + table.len()].copy_from_slice(&table);

        // Header at LBA 1.
        let mut header = vec![0u8; 92];
        header[..8].copy_from_slice(GPT_SIGNATURE);
        LittleEndian::write_u32(&mut header[8..12], 0x0001_0000);
        LittleEndian::write_u32(&mut header[12..16], 92);
        LittleEndian::write_u64(&mut header[24..32], 1);
        LittleEndian::write_u64(&mut header[40..48], 34);
        LittleEndian::write_u64(&mut header[48..56], 6109);
        LittleEndian::write_u64(&mut header[72..80], 2);
        LittleEndian::write_u32(&mut header[80..84], 128);
        LittleEndian::write_u32(&mut header[84..88], 128);
        LittleEndian::write_u32(&mut header[88..92], crc32fast::hash(&table));
        let header_crc = crc32fast::hash(&header);
        LittleEndian::write_u32(&mut header[16..20], header_crc);
        image[SECTOR..SECTOR + header.len()].copy_from_slice(&header);

        image
    }

    #[test]
    fn parses_a_valid_table() {
        let mut stream = FakeFileObject::new(build_gpt_image());
        let entries = read_table(&mut stream).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].offset, 1_048_576);
        assert_eq!(entries[0].size, 65_536);
        assert_eq!(entries[0].identifier.as_deref(), Some(PARTITION_1_GUID));
        assert_eq!(entries[1].offset, 2_097_152);
        assert_eq!(entries[1].identifier.as_deref(), Some(PARTITION_2_GUID));
    }

    #[test]
    fn corrupted_header_checksum_is_rejected() {
        let mut image = build_gpt_image();
        image[512 + 40] ^= 0xff;
        let mut stream = FakeFileObject::new(image);
        assert!(read_table(&mut stream).is_err());
    }

    #[test]
    fn corrupted_entry_array_checksum_is_rejected() {
        let mut image = build_gpt_image();
        image[1024] ^= 0xff;
        let mut stream = FakeFileObject::new(image);
        assert!(read_table(&mut stream).is_err());
    }

    #[test]
    fn plain_stream_has_no_table() {
        let mut stream = FakeFileObject::new(vec![0u8; 8192]);
        assert!(read_table(&mut stream).is_err());
    }

    #[test]
    fn entry_with_overflowing_lbas_is_skipped() {
        let mut image = build_gpt_image();

        // Push the second entry's LBAs to the end of the addressable
        // range, then reseal the entry array and header checksums.
        const TABLE_OFFSET: usize = 1024;
        let entry = &mut image[TABLE_OFFSET + 128..TABLE_OFFSET + 256];
        LittleEndian::write_u64(&mut entry[32..40], u64::MAX - 1);
        LittleEndian::write_u64(&mut entry[40..48], u64::MAX);
        let table = image[TABLE_OFFSET..TABLE_OFFSET + 128 * 128].to_vec();
        LittleEndian::write_u32(&mut image[512 + 88..512 + 92], crc32fast::hash(&table));
        let mut header = image[512..512 + 92].to_vec();
        header[16..20].fill(0);
        LittleEndian::write_u32(&mut image[512 + 16..512 + 20], crc32fast::hash(&header));

        let mut stream = FakeFileObject::new(image);
        let entries = read_table(&mut stream).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].identifier.as_deref(), Some(PARTITION_1_GUID));
    }

    #[test]
    fn analyzer_probe_matches_only_valid_tables() {
        let helper = GptAnalyzerHelper;
        let mut stream = FakeFileObject::new(build_gpt_image());
        assert_eq!(
            helper.analyze_file_object(&mut stream).unwrap(),
            Some(TYPE_INDICATOR_GPT)
        );
        let mut stream = FakeFileObject::new(vec![0u8; 8192]);
        assert_eq!(helper.analyze_file_object(&mut stream).unwrap(), None);
    }
}
