//! Core infrastructure for strata.
//!
//! This crate provides the format-agnostic machinery of the layered VFS:
//! - Path specifications and their factory
//! - The resolver, resolver context, and resolver helper registry
//! - The format analyzer and its signature index
//! - Mount point bindings
//! - The `FileObject` / `FileSystem` / `FileEntry` contracts
//! - Canonical type indicator and format category definitions
//! - Error types

pub mod analyzer;
pub mod definitions;
pub mod error;
pub mod mount;
pub mod path;
pub mod resolver;
pub mod vfs;
