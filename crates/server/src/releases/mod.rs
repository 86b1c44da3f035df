//! Release engine: ingestion, active-release resolution with rollback, and
//! asset lookup inside release archives.

mod assets;
mod error;
mod ingest;
mod resolver;

pub use assets::{AssetResolver, LoadedBundle, ResolvedAsset, content_type_for_extension};
pub use error::{ReleaseError, ReleaseResult};
pub use ingest::{IngestPipeline, Upload};
pub use resolver::{ReleaseResolver, RollbackOutcome, RuntimeSummary};
