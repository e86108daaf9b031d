//! Shared support for integration tests.
//!
//! Fixtures are synthetic disk images built in-process with deterministic
//! content, written to temporary files for OS-rooted stacks. No binary
//! fixtures live in the tree.

// Each integration test binary compiles this module; not every binary
// uses every helper.
#![allow(dead_code)]

use std::io::Write;
use std::sync::Arc;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use uuid::Uuid;

use strata::path::{AttributeValue, PathSpec, PathSpecFactory};
use strata::resolver::Resolver;

/// GUID of the first GPT test partition.
pub const GPT_PARTITION_1_GUID: &str = "1e25588c-27a9-4094-868c-2f257021f87b";
/// GUID of the second GPT test partition.
pub const GPT_PARTITION_2_GUID: &str = "53d86ccf-3188-4b54-90d8-81866426b70a";

/// Fill `region` with a repeating pattern seeded by `seed`.
pub fn fill_pattern(region: &mut [u8], seed: u8) {
    for (index, byte) in region.iter_mut().enumerate() {
        *byte = seed.wrapping_add((index % 251) as u8);
    }
}

// ============================================================================
// Image Builders
// ============================================================================

/// GPT image with two 65536-byte partitions at offsets 1048576 and
/// 2097152, 512-byte sectors, valid header and entry array CRCs, and a
/// protective MBR.
pub fn build_gpt_image() -> Vec<u8> {
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
        (GPT_PARTITION_1_GUID, 2048u64),
        (GPT_PARTITION_2_GUID, 4096u64),
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
    image[2 * SECTOR..2 * SECTOR + table.len()].copy_from_slice(&table);

    // Header at LBA 1.
    let mut header = vec![0u8; 92];
    header[..8].copy_from_slice(b"EFI PART");
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

    // Deterministic partition content.
    fill_pattern(&mut image[1_048_576..1_048_576 + 65_536], 0x11);
    fill_pattern(&mut image[2_097_152..2_097_152 + 65_536], 0x22);

    image
}

/// APM image: the map's own entry plus two partitions, the first 65536
/// bytes at sector 64.
pub fn build_apm_image() -> Vec<u8> {
    let mut image = vec![0u8; 512 * 512];

    // Driver descriptor record.
    image[0] = b'E';
    image[1] = b'R';
    BigEndian::write_u16(&mut image[2..4], 512);

    let mut write_entry = |sector: usize,
                           start_sector: u32,
                           sector_count: u32,
                           name: &str,
                           partition_type: &str,
                           status: u32| {
        let offset = sector * 512;
        let entry = &mut image[offset..offset + 512];
        entry[0] = b'P';
        entry[1] = b'M';
        BigEndian::write_u32(&mut entry[4..8], 3);
        BigEndian::write_u32(&mut entry[8..12], start_sector);
        BigEndian::write_u32(&mut entry[12..16], sector_count);
        entry[16..16 + name.len()].copy_from_slice(name.as_bytes());
        entry[48..48 + partition_type.len()].copy_from_slice(partition_type.as_bytes());
        BigEndian::write_u32(&mut entry[88..92], status);
    };

    write_entry(1, 1, 63, "Apple", "Apple_partition_map", 0x3);
    // 65536 bytes = 128 sectors.
    write_entry(2, 64, 128, "disk image", "Apple_HFS", 0x4000_0033);
    write_entry(3, 192, 128, "second", "Apple_HFS", 0x4000_0033);

    fill_pattern(&mut image[64 * 512..64 * 512 + 65_536], 0x33);
    fill_pattern(&mut image[192 * 512..192 * 512 + 65_536], 0x44);

    image
}

/// MBR image with two primary partitions.
pub fn build_mbr_image() -> Vec<u8> {
    let mut image = vec![0u8; 512 * 1024];

    let mut write_slot = |slot: usize, bootable: bool, start_lba: u32, sectors: u32| {
        let offset = 446 + slot * 16;
        image[offset] = if bootable { 0x80 } else { 0x00 };
        image[offset + 4] = 0x83;
        LittleEndian::write_u32(&mut image[offset + 8..offset + 12], start_lba);
        LittleEndian::write_u32(&mut image[offset + 12..offset + 16], sectors);
    };
    write_slot(0, true, 128, 128);
    write_slot(1, false, 256, 256);

    image[510] = 0x55;
    image[511] = 0xaa;

    fill_pattern(&mut image[128 * 512..256 * 512], 0x55);

    image
}

// ============================================================================
// Stack Helpers
// ============================================================================

/// Write an image to a temporary file; the file lives as long as the
/// returned guard.
pub fn write_temp_image(image: &[u8]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(image).expect("write image");
    file.flush().expect("flush image");
    file
}

/// A resolver with the built-in helpers, isolated from other tests.
pub fn test_resolver() -> Resolver {
    let resolver = Resolver::new();
    strata::formats::register_resolver_helpers(resolver.helpers()).expect("register helpers");
    resolver
}

/// `OS -> RAW` chain over a file on disk.
pub fn raw_spec(location: &str) -> Arc<PathSpec> {
    let factory = PathSpecFactory::global();
    let os = factory
        .new_path_spec("OS", &[("location", location.into())], None)
        .expect("OS spec");
    factory.new_path_spec("RAW", &[], Some(os)).expect("RAW spec")
}

/// A volume-system node on top of `OS -> RAW`.
pub fn volume_spec(
    location: &str,
    scheme: &str,
    attributes: &[(&str, AttributeValue)],
) -> Arc<PathSpec> {
    PathSpecFactory::global()
        .new_path_spec(scheme, attributes, Some(raw_spec(location)))
        .expect("volume spec")
}
