//! Repository traits for ledger operations.

pub mod releases;
pub mod rollbacks;
pub mod tracking;

pub use releases::ReleaseRepo;
pub use rollbacks::RollbackRepo;
pub use tracking::TrackingRepo;
