//! Storage Stack (§4.3): LVM thin pool + XFS + project quotas + reflink
//! snapshots, on top of `mvirt-zfs`'s shell-out-and-sqlite pattern.

pub mod lvm;
pub mod manager;
pub mod pool_stats;
pub mod store;
pub mod xfs;

pub use lvm::ThinPool;
pub use manager::{PoolStats, StorageManager};
