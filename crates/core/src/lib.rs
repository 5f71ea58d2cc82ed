//! Core domain types and shared logic for packyard.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Package coordinates and the blob layout
//! - Publish credentials and version records
//! - Content hashing
//! - Configuration

pub mod config;
pub mod error;
pub mod hash;
pub mod package;

pub use error::{Error, Result};
pub use hash::{ContentHash, ContentHasher};
pub use package::{
    ErrorKind, PackageVersionKey, PackageVersionRecord, PublishCredential, VersionState,
};

/// Default multipart part size: 20 MiB
pub const DEFAULT_PART_SIZE: usize = 20 * 1024 * 1024;

/// Default number of parts uploaded at once.
pub const DEFAULT_CONCURRENT_PARTS: usize = 5;
