//! HTTP request handlers.

pub mod assets;
pub mod common;
pub mod health;
pub mod manifest;
pub mod releases;
pub mod tracking;
pub mod upload;

pub use assets::*;
pub use health::*;
pub use manifest::*;
pub use releases::*;
pub use tracking::*;
pub use upload::*;
