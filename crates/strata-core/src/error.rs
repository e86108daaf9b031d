//! Error types for the layered VFS.
//!
//! This module provides a unified error type (`StrataError`) covering the
//! closed error taxonomy of the core: malformed path specifications,
//! back-end refusals, access failures, unsupported operations, cache
//! saturation, mount point problems, missing credentials, and cooperative
//! cancellation, plus the registry lifecycle failures raised when helpers
//! or path spec types are registered twice or deregistered while absent.
//!
//! ## Design
//!
//! - **Unified type**: `StrataError` is the single error type crossing the
//!   resolver boundary; back-ends never leak raw I/O errors.
//! - **Normalization**: `From<io::Error>` folds I/O failures into the
//!   `BackEnd` kind (permission failures into `Access`).
//! - **Context**: variants that concern a specific path specification carry
//!   its comparable string so user-visible messages can name the location.

use std::io;

use thiserror::Error;

// ============================================================================
// Unified Error Type
// ============================================================================

/// Unified error type for the layered VFS.
///
/// The set of kinds is closed; helpers map library- and I/O-level failures
/// into one of these before returning. The resolver propagates all kinds
/// unchanged to the caller, and nothing is retried automatically.
#[derive(Debug, Error)]
pub enum StrataError {
    /// Malformed path specification (missing required attribute, invalid
    /// parent, unknown type indicator).
    #[error("invalid path specification: {message}")]
    PathSpec {
        message: String,
        comparable: Option<String>,
    },

    /// The underlying format library refused the stream; includes analyzer
    /// probe failures.
    #[error("back-end error: {message}")]
    BackEnd {
        message: String,
        comparable: Option<String>,
    },

    /// Permission denied or missing credential.
    #[error("access denied: {message}")]
    Access { message: String },

    /// Operation not implemented for this format.
    #[error("not supported: {message}")]
    NotSupported { message: String },

    /// The context cache is bounded and saturated.
    #[error("resolver cache full: {message}")]
    CacheFull { message: String },

    /// Unresolved or duplicate mount binding.
    #[error("mount point error: {message}")]
    MountPoint { message: String },

    /// Missing decryption key for an encrypted layer.
    #[error("key chain error: {message}")]
    KeyChain { message: String },

    /// Cooperative cancellation.
    #[error("aborted by user")]
    UserAbort,

    /// A registry already holds an entry for this type indicator.
    #[error("type indicator already registered: {type_indicator}")]
    AlreadyRegistered { type_indicator: String },

    /// A registry holds no entry for this type indicator.
    #[error("type indicator not registered: {type_indicator}")]
    NotRegistered { type_indicator: String },
}

/// Result type for VFS operations.
pub type StrataResult<T> = Result<T, StrataError>;

// ============================================================================
// Convenience Constructors
// ============================================================================

impl StrataError {
    /// Create a path specification error.
    pub fn path_spec(message: impl Into<String>) -> Self {
        StrataError::PathSpec {
            message: message.into(),
            comparable: None,
        }
    }

    /// Create a path specification error naming the offending spec.
    pub fn path_spec_for(message: impl Into<String>, comparable: impl Into<String>) -> Self {
        StrataError::PathSpec {
            message: message.into(),
            comparable: Some(comparable.into()),
        }
    }

    /// Create a back-end error.
    pub fn back_end(message: impl Into<String>) -> Self {
        StrataError::BackEnd {
            message: message.into(),
            comparable: None,
        }
    }

    /// Create a back-end error naming the offending spec.
    pub fn back_end_for(message: impl Into<String>, comparable: impl Into<String>) -> Self {
        StrataError::BackEnd {
            message: message.into(),
            comparable: Some(comparable.into()),
        }
    }

    /// Create an access error.
    pub fn access(message: impl Into<String>) -> Self {
        StrataError::Access {
            message: message.into(),
        }
    }

    /// Create a not-supported error.
    pub fn not_supported(message: impl Into<String>) -> Self {
        StrataError::NotSupported {
            message: message.into(),
        }
    }

    /// Create a cache-full error.
    pub fn cache_full(message: impl Into<String>) -> Self {
        StrataError::CacheFull {
            message: message.into(),
        }
    }

    /// Create a mount point error.
    pub fn mount_point(message: impl Into<String>) -> Self {
        StrataError::MountPoint {
            message: message.into(),
        }
    }

    /// Create a key chain error.
    pub fn key_chain(message: impl Into<String>) -> Self {
        StrataError::KeyChain {
            message: message.into(),
        }
    }

    /// The comparable of the path spec this error concerns, if recorded.
    pub fn comparable(&self) -> Option<&str> {
        match self {
            StrataError::PathSpec { comparable, .. } | StrataError::BackEnd { comparable, .. } => {
                comparable.as_deref()
            }
            _ => None,
        }
    }
}

// ============================================================================
// I/O Normalization
// ============================================================================

impl From<io::Error> for StrataError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => StrataError::Access {
                message: err.to_string(),
            },
            _ => StrataError::BackEnd {
                message: format!("IO error: {}", err),
                comparable: None,
            },
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
