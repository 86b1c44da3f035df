//! Core domain types and shared logic for the updraft update server.
//!
//! This crate defines the data model used across all other crates:
//! - Content hashing and update identifiers
//! - Random-access reading of zip-packed release bundles
//! - The `metadata.json` bundle manifest
//! - Release records and their storage key layout

pub mod archive;
pub mod config;
pub mod error;
pub mod hash;
pub mod manifest;
pub mod release;

pub use archive::{BundleArchive, EntryReader};
pub use error::{Error, Result};
pub use hash::{ContentHash, UpdateId};
pub use manifest::{AssetEntry, BundleManifest, Platform, PlatformMetadata};
pub use release::{Release, ReleaseKey};

/// Assets larger than this are logged as oversized when served: 4 MiB.
pub const OVERSIZED_ASSET_BYTES: u64 = 4 * 1024 * 1024;

/// Chunk size for streaming entries out of an archive: 64 KiB.
pub const STREAM_CHUNK_SIZE: usize = 64 * 1024;
