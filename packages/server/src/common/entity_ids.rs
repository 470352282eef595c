//! Typed ID aliases for persisted entities.

pub use super::id::Id;

/// Marker type for backup job records.
pub struct BackupJob;

/// Marker type for monitored sites.
pub struct Site;

pub type BackupJobId = Id<BackupJob>;
pub type SiteId = Id<Site>;
