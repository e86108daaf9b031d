//! Built-in format back-ends for strata.
//!
//! Each module contributes a resolver helper and, where the format is
//! detectable by signature, an analyzer helper:
//! - `os`: local files (root layer)
//! - `raw`: single-segment storage media images
//! - `data_range`: sub-range views
//! - `gzip`: gzip compressed streams
//! - `gpt`, `apm`, `mbr`: partition-scheme volume systems
//! - `fake`: in-memory filesystem test double (no resolver helper)

use std::sync::Arc;

use strata_core::analyzer::Analyzer;
use strata_core::error::StrataResult;
use strata_core::resolver::ResolverHelperManager;

pub mod apm;
pub mod data_range;
pub mod fake;
pub mod gpt;
pub mod gzip;
pub mod mbr;
pub mod os;
pub mod raw;

mod partition;

/// Register every built-in resolver helper.
pub fn register_resolver_helpers(manager: &ResolverHelperManager) -> StrataResult<()> {
    manager.register(Arc::new(os::OsResolverHelper))?;
    manager.register(Arc::new(raw::RawResolverHelper))?;
    manager.register(Arc::new(data_range::DataRangeResolverHelper))?;
    manager.register(Arc::new(gzip::GzipResolverHelper))?;
    manager.register(Arc::new(gpt::GptResolverHelper))?;
    manager.register(Arc::new(apm::ApmResolverHelper))?;
    manager.register(Arc::new(mbr::MbrResolverHelper))?;
    Ok(())
}

/// Register every built-in analyzer helper.
pub fn register_analyzer_helpers(analyzer: &Analyzer) -> StrataResult<()> {
    analyzer.register(Arc::new(gzip::GzipAnalyzerHelper))?;
    analyzer.register(Arc::new(gpt::GptAnalyzerHelper))?;
    analyzer.register(Arc::new(apm::ApmAnalyzerHelper))?;
    analyzer.register(Arc::new(mbr::MbrAnalyzerHelper))?;
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
