//! Analyzer helpers: per-format probes.
//!
//! An analyzer helper pairs a declarative [`FormatSpecification`] with a
//! probe that performs deeper validation (magic plus checksum plus header
//! fields). The analyzer runs the probe only after a signature hit, except
//! for helpers without signatures, which are probed unconditionally.

use crate::analyzer::specification::FormatSpecification;
use crate::definitions::FormatCategory;
use crate::error::StrataResult;
use crate::vfs::FileObject;

/// Per-format probe consulted by the analyzer.
pub trait AnalyzerHelper: Send + Sync {
    /// Type indicator this helper detects.
    fn type_indicator(&self) -> &'static str;

    /// Format categories of this helper; the first entry is the primary
    /// category under which analysis results are reported.
    fn format_categories(&self) -> &'static [FormatCategory];

    /// Declarative signatures, when the format has any.
    fn format_specification(&self) -> Option<FormatSpecification> {
        None
    }

    /// Probe the stream; returns the type indicator on a match, `None`
    /// otherwise. The stream is positioned at offset 0 on entry. I/O
    /// failures surface as `BackEnd` errors and are skipped by the
    /// analyzer, never propagated to its caller.
    fn analyze_file_object(
        &self,
        file_object: &mut dyn FileObject,
    ) -> StrataResult<Option<&'static str>>;

    /// Whether this helper participates in analysis.
    fn is_enabled(&self) -> bool {
        true
    }
}
