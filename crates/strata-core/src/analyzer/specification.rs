//! Declarative format specifications used by the analyzer.
//!
//! A specification carries the byte signatures that make a format
//! detectable, plus optional descriptive metadata. Signatures are either
//! bounded (must appear at an absolute offset) or scanable (may appear
//! anywhere within the analyzer's scan window).

// ============================================================================
// Signature
// ============================================================================

/// One byte signature of a format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pattern: Vec<u8>,
    offset: Option<u64>,
}

impl Signature {
    /// A signature bounded to an absolute stream offset.
    pub fn bounded(offset: u64, pattern: impl Into<Vec<u8>>) -> Self {
        Signature {
            pattern: pattern.into(),
            offset: Some(offset),
        }
    }

    /// A signature that may appear anywhere in the scan window.
    pub fn scanable(pattern: impl Into<Vec<u8>>) -> Self {
        Signature {
            pattern: pattern.into(),
            offset: None,
        }
    }

    /// The byte pattern.
    pub fn pattern(&self) -> &[u8] {
        &self.pattern
    }

    /// The absolute offset for a bounded signature, `None` when scanable.
    pub fn offset(&self) -> Option<u64> {
        self.offset
    }

    /// Whether this signature is bounded to an absolute offset.
    pub fn is_bounded(&self) -> bool {
        self.offset.is_some()
    }
}

// ============================================================================
// Format Specification
// ============================================================================

/// Declarative description of one detectable format.
#[derive(Debug, Clone, Default)]
pub struct FormatSpecification {
    identifier: String,
    signatures: Vec<Signature>,
    mime_types: Vec<String>,
    universal_type_identifiers: Vec<String>,
}

impl FormatSpecification {
    /// Create a specification for `identifier` (equal to the type
    /// indicator of the format).
    pub fn new(identifier: impl Into<String>) -> Self {
        FormatSpecification {
            identifier: identifier.into(),
            ..FormatSpecification::default()
        }
    }

    /// Add a signature.
    pub fn with_signature(mut self, signature: Signature) -> Self {
        self.signatures.push(signature);
        self
    }

    /// Add a MIME type.
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_types.push(mime_type.into());
        self
    }

    /// Add a universal type identifier.
    pub fn with_universal_type_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.universal_type_identifiers.push(identifier.into());
        self
    }

    /// The format identifier.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// The signatures, in declaration order.
    pub fn signatures(&self) -> &[Signature] {
        &self.signatures
    }

    /// The MIME types.
    pub fn mime_types(&self) -> &[String] {
        &self.mime_types
    }

    /// The universal type identifiers.
    pub fn universal_type_identifiers(&self) -> &[String] {
        &self.universal_type_identifiers
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_signature_reports_its_offset() {
        let signature = Signature::bounded(512, *b"EFI PART");
        assert!(signature.is_bounded());
        assert_eq!(signature.offset(), Some(512));
        assert_eq!(signature.pattern(), b"EFI PART");
    }

    #[test]
    fn scanable_signature_has_no_offset() {
        let signature = Signature::scanable(*b"ustar");
        assert!(!signature.is_bounded());
        assert_eq!(signature.offset(), None);
    }

    #[test]
    fn specification_builder_accumulates() {
        let specification = FormatSpecification::new("GZIP")
            .with_signature(Signature::bounded(0, vec![0x1f, 0x8b, 0x08]))
            .with_mime_type("application/gzip")
            .with_universal_type_identifier("org.gnu.gnu-zip-archive");
        assert_eq!(specification.identifier(), "GZIP");
        assert_eq!(specification.signatures().len(), 1);
        assert_eq!(specification.mime_types(), ["application/gzip"]);
        assert_eq!(
            specification.universal_type_identifiers(),
            ["org.gnu.gnu-zip-archive"]
        );
    }
}
