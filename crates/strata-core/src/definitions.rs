//! Canonical type indicator and format category definitions.
//!
//! Type indicators are short stable strings identifying one format layer
//! each; every path spec node and every registered helper names exactly one
//! of them. Format categories partition the indicators for analyzer
//! reporting.

use std::fmt;

use serde::Serialize;

// ============================================================================
// Type Indicators
// ============================================================================

pub const TYPE_INDICATOR_APFS: &str = "APFS";
pub const TYPE_INDICATOR_APFS_CONTAINER: &str = "APFS_CONTAINER";
pub const TYPE_INDICATOR_APM: &str = "APM";
pub const TYPE_INDICATOR_BDE: &str = "BDE";
pub const TYPE_INDICATOR_BZIP2: &str = "BZIP2";
pub const TYPE_INDICATOR_COMPRESSED_STREAM: &str = "COMPRESSED_STREAM";
pub const TYPE_INDICATOR_DATA_RANGE: &str = "DATA_RANGE";
pub const TYPE_INDICATOR_EWF: &str = "EWF";
pub const TYPE_INDICATOR_FAKE: &str = "FAKE";
pub const TYPE_INDICATOR_GPT: &str = "GPT";
pub const TYPE_INDICATOR_GZIP: &str = "GZIP";
pub const TYPE_INDICATOR_HFS: &str = "HFS";
pub const TYPE_INDICATOR_LVM: &str = "LVM";
pub const TYPE_INDICATOR_MBR: &str = "MBR";
pub const TYPE_INDICATOR_MOUNT: &str = "MOUNT";
pub const TYPE_INDICATOR_NTFS: &str = "NTFS";
pub const TYPE_INDICATOR_OS: &str = "OS";
pub const TYPE_INDICATOR_QCOW: &str = "QCOW";
pub const TYPE_INDICATOR_RAW: &str = "RAW";
pub const TYPE_INDICATOR_TAR: &str = "TAR";
pub const TYPE_INDICATOR_TSK: &str = "TSK";
pub const TYPE_INDICATOR_TSK_PARTITION: &str = "TSK_PARTITION";
pub const TYPE_INDICATOR_VHDI: &str = "VHDI";
pub const TYPE_INDICATOR_VMDK: &str = "VMDK";
pub const TYPE_INDICATOR_XZ: &str = "XZ";
pub const TYPE_INDICATOR_ZIP: &str = "ZIP";

// ============================================================================
// Format Categories
// ============================================================================

/// Format category of a detectable format.
///
/// The analyzer groups its results by category so a caller can choose one
/// archive, one volume system, and so on, independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FormatCategory {
    Archive,
    CompressedStream,
    StorageMediaImage,
    VolumeSystem,
    #[serde(rename = "filesystem")]
    FileSystem,
}

impl FormatCategory {
    /// Stable string form of this category.
    pub fn as_str(&self) -> &'static str {
        match self {
            FormatCategory::Archive => "archive",
            FormatCategory::CompressedStream => "compressed-stream",
            FormatCategory::StorageMediaImage => "storage-media-image",
            FormatCategory::VolumeSystem => "volume-system",
            FormatCategory::FileSystem => "filesystem",
        }
    }

    /// All categories, in reporting order.
    pub fn all() -> &'static [FormatCategory] {
        &[
            FormatCategory::Archive,
            FormatCategory::CompressedStream,
            FormatCategory::StorageMediaImage,
            FormatCategory::VolumeSystem,
            FormatCategory::FileSystem,
        ]
    }
}

impl fmt::Display for FormatCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_string_forms_are_stable() {
        assert_eq!(FormatCategory::Archive.as_str(), "archive");
        assert_eq!(FormatCategory::CompressedStream.as_str(), "compressed-stream");
        assert_eq!(
            FormatCategory::StorageMediaImage.as_str(),
            "storage-media-image"
        );
        assert_eq!(FormatCategory::VolumeSystem.as_str(), "volume-system");
        assert_eq!(FormatCategory::FileSystem.as_str(), "filesystem");
    }

    #[test]
    fn all_lists_every_category_once() {
        let all = FormatCategory::all();
        assert_eq!(all.len(), 5);
        for category in all {
            assert_eq!(all.iter().filter(|c| *c == category).count(), 1);
        }
    }

    #[test]
    fn display_matches_as_str() {
        assert_eq!(
            format!("{}", FormatCategory::VolumeSystem),
            FormatCategory::VolumeSystem.as_str()
        );
    }
}
