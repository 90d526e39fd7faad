//! Shared advisory-lock abstraction. `arca-api` implements this with a
//! process-local keyed mutex table; `arca-csi-controller` implements it with
//! a Kubernetes Lease (§4.7 "Distributed lock").

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// An acquired lock; releases on drop in each implementation, but callers
/// should prefer calling `release` explicitly so release failures surface.
#[async_trait]
pub trait LockGuard: Send {
    async fn release(self: Box<Self>) -> Result<()>;
}

#[async_trait]
pub trait LockManager: Send + Sync {
    /// Acquire a lock keyed by `key`, held for at most `ttl` unless renewed.
    /// Blocks until acquired or `wait` elapses.
    async fn acquire(
        &self,
        key: &str,
        ttl: Duration,
        wait: Duration,
    ) -> Result<Box<dyn LockGuard>>;
}
