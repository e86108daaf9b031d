//! The format analyzer: scans a byte stream and reports which formats it
//! contains.
//!
//! Detection runs in two stages. A single pass over a bounded prefix
//! window checks every registered signature (bounded signatures at their
//! exact offsets, scanable ones anywhere in the window); each hit is then
//! confirmed by the owning helper's probe, which may validate checksums
//! and header fields. Helpers without signatures are probed
//! unconditionally. Results are grouped by format category and ordered by
//! signature specificity.

use std::cmp::Reverse;
use std::sync::{Arc, RwLock};

use serde::Serialize;
use tracing::{debug, warn};

use crate::definitions::FormatCategory;
use crate::error::{StrataError, StrataResult};
use crate::vfs::file_object::SeekFrom;
use crate::vfs::FileObject;

pub mod helper;
pub mod specification;

pub use helper::AnalyzerHelper;
pub use specification::{FormatSpecification, Signature};

/// Prefix read for bounded-signature scanning.
pub const SCAN_WINDOW_SIZE: usize = 16 * 1024;

/// Prefix read when any registered helper carries scanable signatures.
pub const EXTENDED_SCAN_WINDOW_SIZE: usize = 1024 * 1024;

// ============================================================================
// Analysis Result
// ============================================================================

/// Type indicators matched under one format category.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryMatches {
    pub category: FormatCategory,
    pub type_indicators: Vec<String>,
}

/// Result of analyzing one byte stream.
///
/// Groups are reported in category order; within a group, type indicators
/// are ordered by signature specificity. A type indicator never appears
/// under more than one category.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FormatAnalysis {
    groups: Vec<CategoryMatches>,
}

impl FormatAnalysis {
    /// The non-empty category groups, in category order.
    pub fn groups(&self) -> &[CategoryMatches] {
        &self.groups
    }

    /// The type indicators matched under `category`.
    pub fn type_indicators(&self, category: FormatCategory) -> &[String] {
        self.groups
            .iter()
            .find(|group| group.category == category)
            .map(|group| group.type_indicators.as_slice())
            .unwrap_or(&[])
    }

    /// Whether any format matched.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Whether `type_indicator` matched under any category.
    pub fn contains(&self, type_indicator: &str) -> bool {
        self.groups
            .iter()
            .any(|group| group.type_indicators.iter().any(|ti| ti == type_indicator))
    }
}

// ============================================================================
// Analyzer
// ============================================================================

/// Signature specificity rank: bounded before scanable before
/// signature-less, longer patterns before shorter, registration order as
/// the tie-break.
type Specificity = (u8, Reverse<usize>, usize);

/// Registry of analyzer helpers and the scanning engine over them.
#[derive(Default)]
pub struct Analyzer {
    helpers: RwLock<Vec<Arc<dyn AnalyzerHelper>>>,
}

impl Analyzer {
    /// Create an analyzer with no registered helpers.
    pub fn new() -> Self {
        Analyzer::default()
    }

    /// Register a helper; registration order is the ordering tie-break.
    pub fn register(&self, helper: Arc<dyn AnalyzerHelper>) -> StrataResult<()> {
        let mut helpers = self.helpers.write().expect("analyzer lock poisoned");
        if helpers
            .iter()
            .any(|registered| registered.type_indicator() == helper.type_indicator())
        {
            return Err(StrataError::AlreadyRegistered {
                type_indicator: helper.type_indicator().to_string(),
            });
        }
        helpers.push(helper);
        Ok(())
    }

    /// Deregister the helper for a type indicator.
    pub fn deregister(&self, type_indicator: &str) -> StrataResult<()> {
        let mut helpers = self.helpers.write().expect("analyzer lock poisoned");
        let position = helpers
            .iter()
            .position(|helper| helper.type_indicator() == type_indicator)
            .ok_or_else(|| StrataError::NotRegistered {
                type_indicator: type_indicator.to_string(),
            })?;
        helpers.remove(position);
        Ok(())
    }

    /// Whether a helper is registered for a type indicator.
    pub fn is_registered(&self, type_indicator: &str) -> bool {
        self.helpers
            .read()
            .expect("analyzer lock poisoned")
            .iter()
            .any(|helper| helper.type_indicator() == type_indicator)
    }

    /// Analyze a stream and report the matching formats per category.
    pub fn analyze(&self, file_object: &mut dyn FileObject) -> StrataResult<FormatAnalysis> {
        let helpers: Vec<Arc<dyn AnalyzerHelper>> = self
            .helpers
            .read()
            .expect("analyzer lock poisoned")
            .iter()
            .filter(|helper| helper.is_enabled())
            .cloned()
            .collect();

        let stream_size = file_object.size()?;
        let specifications: Vec<Option<FormatSpecification>> = helpers
            .iter()
            .map(|helper| helper.format_specification())
            .collect();

        let any_scanable = specifications.iter().flatten().any(|specification| {
            specification
                .signatures()
                .iter()
                .any(|signature| !signature.is_bounded())
        });
        let window_size = if any_scanable {
            EXTENDED_SCAN_WINDOW_SIZE
        } else {
            SCAN_WINDOW_SIZE
        };
        let window_size = window_size.min(stream_size as usize);

        let mut window = vec![0u8; window_size];
        file_object.seek(SeekFrom::Start(0))?;
        file_object.read_exact(&mut window)?;

        // Stage 1: signature hits select the candidates.
        let mut candidates: Vec<(usize, Specificity)> = Vec::new();
        for (index, specification) in specifications.iter().enumerate() {
            let signatures = specification
                .as_ref()
                .map(|specification| specification.signatures())
                .unwrap_or(&[]);
            if signatures.is_empty() {
                // Fallback path: no signatures, probe unconditionally.
                candidates.push((index, (2, Reverse(0), index)));
                continue;
            }
            let mut best: Option<(u8, usize)> = None;
            for signature in signatures {
                let hit = match signature.offset() {
                    Some(offset) => self.check_bounded(
                        file_object,
                        &window,
                        stream_size,
                        offset,
                        signature.pattern(),
                    )?,
                    None => memchr::memmem::find(&window, signature.pattern()).is_some(),
                };
                if hit {
                    let rank = if signature.is_bounded() { 0 } else { 1 };
                    let length = signature.pattern().len();
                    best = Some(match best {
                        Some((best_rank, best_length)) => {
                            (best_rank.min(rank), best_length.max(length))
                        }
                        None => (rank, length),
                    });
                }
            }
            if let Some((rank, length)) = best {
                candidates.push((index, (rank, Reverse(length), index)));
            }
        }

        // Stage 2: the owning helper's probe confirms each candidate.
        let mut matches: Vec<(FormatCategory, &'static str, Specificity)> = Vec::new();
        for (index, specificity) in candidates {
            let helper = &helpers[index];
            file_object.seek(SeekFrom::Start(0))?;
            match helper.analyze_file_object(file_object) {
                Ok(Some(type_indicator)) => {
                    debug!(type_indicator, "analyzer probe matched");
                    let category = helper
                        .format_categories()
                        .first()
                        .copied()
                        .unwrap_or(FormatCategory::StorageMediaImage);
                    matches.push((category, type_indicator, specificity));
                }
                Ok(None) => {}
                Err(error @ StrataError::BackEnd { .. }) => {
                    warn!(
                        type_indicator = helper.type_indicator(),
                        %error,
                        "analyzer probe failed, skipping"
                    );
                }
                Err(error) => return Err(error),
            }
        }

        file_object.seek(SeekFrom::Start(0))?;

        // Group by primary category, ordered by specificity.
        let mut groups = Vec::new();
        for category in FormatCategory::all() {
            let mut in_category: Vec<(&Specificity, &'static str)> = matches
                .iter()
                .filter(|(c, _, _)| c == category)
                .map(|(_, type_indicator, specificity)| (specificity, *type_indicator))
                .collect();
            in_category.sort();
            if !in_category.is_empty() {
                groups.push(CategoryMatches {
                    category: *category,
                    type_indicators: in_category
                        .into_iter()
                        .map(|(_, type_indicator)| type_indicator.to_string())
                        .collect(),
                });
            }
        }
        Ok(FormatAnalysis { groups })
    }

    /// Analyze a stream and return the indicators for one category.
    pub fn get_type_indicators(
        &self,
        category: FormatCategory,
        file_object: &mut dyn FileObject,
    ) -> StrataResult<Vec<String>> {
        Ok(self.analyze(file_object)?.type_indicators(category).to_vec())
    }

    /// Check a bounded signature, reading past the window when needed.
    /// Streams smaller than the signature's span skip it silently.
    fn check_bounded(
        &self,
        file_object: &mut dyn FileObject,
        window: &[u8],
        stream_size: u64,
        offset: u64,
        pattern: &[u8],
    ) -> StrataResult<bool> {
        let Some(end) = offset.checked_add(pattern.len() as u64) else {
            return Ok(false);
        };
        if end > stream_size {
            return Ok(false);
        }
        if end <= window.len() as u64 {
            let start = offset as usize;
            return Ok(&window[start..start + pattern.len()] == pattern);
        }
        let mut buffer = vec![0u8; pattern.len()];
        file_object.seek(SeekFrom::Start(offset))?;
        file_object.read_exact(&mut buffer)?;
        Ok(buffer == pattern)
    }
}

// ============================================================================
// Tests
// ============================================================================
