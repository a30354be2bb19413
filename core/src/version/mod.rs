//! Append-only log of whole-report versions.

mod manager;

pub use manager::{DocumentVersion, VersionHistory, VersionManager, VersionMeta, VersionTrigger};
