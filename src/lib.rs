//! Strata: a layered virtual filesystem over storage media.
//!
//! One composable path specification names any object inside a stack of
//! formats (raw images, partition schemes, compressed streams,
//! filesystems); the resolver opens it through a common file-object
//! interface without the consumer knowing where the format boundaries
//! are.

// Core infrastructure - re-exported from strata-core
pub use strata_core::analyzer;
pub use strata_core::definitions;
pub use strata_core::error;
pub use strata_core::mount;
pub use strata_core::path;
pub use strata_core::resolver;
pub use strata_core::vfs;

// Built-in format back-ends
pub use strata_formats as formats;

// CLI response types
pub mod output;

use std::sync::OnceLock;

use strata_core::analyzer::Analyzer;
use strata_core::resolver::Resolver;

/// The process-wide resolver with every built-in helper registered.
///
/// Tests that need isolation construct their own [`Resolver`] instead of
/// going through this instance.
pub fn default_resolver() -> &'static Resolver {
    static DEFAULT: OnceLock<Resolver> = OnceLock::new();
    DEFAULT.get_or_init(|| {
        let resolver = Resolver::new();
        strata_formats::register_resolver_helpers(resolver.helpers())
            .expect("built-in helpers register once");
        resolver
    })
}

/// The process-wide analyzer with every built-in helper registered.
pub fn default_analyzer() -> &'static Analyzer {
    static DEFAULT: OnceLock<Analyzer> = OnceLock::new();
    DEFAULT.get_or_init(|| {
        let analyzer = Analyzer::new();
        strata_formats::register_analyzer_helpers(&analyzer)
            .expect("built-in helpers register once");
        analyzer
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_resolver_knows_the_builtins() {
        let resolver = default_resolver();
        for indicator in ["OS", "RAW", "GPT", "APM", "MBR", "GZIP", "DATA_RANGE"] {
            assert!(resolver.helpers().is_registered(indicator));
        }
    }

    #[test]
    fn default_analyzer_knows_the_builtins() {
        let analyzer = default_analyzer();
        for indicator in ["GZIP", "GPT", "APM", "MBR"] {
            assert!(analyzer.is_registered(indicator));
        }
    }
}
