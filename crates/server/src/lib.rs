//! HTTP server for updraft over-the-air updates.
//!
//! This crate provides:
//! - The release engine (ingestion, active release resolution, rollback, asset lookup)
//! - Device endpoints (update manifest, asset download)
//! - Release management endpoints (upload, listings, rollback, download tracking)

pub mod error;
pub mod handlers;
pub mod metrics;
pub mod releases;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
