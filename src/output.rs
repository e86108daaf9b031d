//! JSON response types for the `strata` CLI.
//!
//! Every command emits exactly one response object on stdout in `--json`
//! mode; errors are emitted in the same shape so callers can always parse
//! stdout.

use std::io;

use serde::Serialize;

use strata_core::analyzer::FormatAnalysis;

/// Version of the JSON response schema.
pub const SCHEMA_VERSION: &str = "1";

// ============================================================================
// Responses
// ============================================================================

/// Response of `strata analyze`.
#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub status: String,
    pub schema_version: String,
    pub path: String,
    pub analysis: FormatAnalysis,
}

impl AnalyzeResponse {
    pub fn new(path: impl Into<String>, analysis: FormatAnalysis) -> Self {
        AnalyzeResponse {
            status: "ok".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            path: path.into(),
            analysis,
        }
    }
}

/// One partition row of `strata list`.
#[derive(Debug, Serialize)]
pub struct PartitionInfo {
    pub name: String,
    pub size: u64,
}

/// Response of `strata list`.
#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub status: String,
    pub schema_version: String,
    pub path: String,
    pub scheme: String,
    pub partitions: Vec<PartitionInfo>,
}

impl ListResponse {
    pub fn new(
        path: impl Into<String>,
        scheme: impl Into<String>,
        partitions: Vec<PartitionInfo>,
    ) -> Self {
        ListResponse {
            status: "ok".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            path: path.into(),
            scheme: scheme.into(),
            partitions,
        }
    }
}

/// Response of `strata hash`.
#[derive(Debug, Serialize)]
pub struct HashResponse {
    pub status: String,
    pub schema_version: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partition: Option<String>,
    pub sha256: String,
    pub bytes: u64,
}

impl HashResponse {
    pub fn new(
        path: impl Into<String>,
        partition: Option<String>,
        sha256: impl Into<String>,
        bytes: u64,
    ) -> Self {
        HashResponse {
            status: "ok".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            path: path.into(),
            partition,
            sha256: sha256.into(),
            bytes,
        }
    }
}

/// Error response emitted in `--json` mode.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: String,
    pub schema_version: String,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        ErrorResponse {
            status: "error".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            error: error.into(),
        }
    }
}

/// Serialize a response as pretty JSON followed by a newline.
pub fn emit_response<T: Serialize>(response: &T, writer: &mut impl io::Write) -> io::Result<()> {
    let json = serde_json::to_string_pretty(response)?;
    writeln!(writer, "{}", json)
}

// ============================================================================
// Tests
// ============================================================================
