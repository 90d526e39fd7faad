//! Shared resource contract: every stage of a group (block device, mount,
//! netns, NFS daemon) exposes the same `start/stop/monitor/validate` shape
//! as the group itself (§4.1–§4.2), so the group driver can treat them
//! uniformly.

use async_trait::async_trait;

use arca_common::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceStatus {
    Started,
    Stopped,
    Failed,
    Transitioning,
}

#[async_trait]
pub trait GroupResource: Send + Sync {
    fn name(&self) -> &str;
    fn validate(&self) -> Result<()>;
    async fn start(&self) -> Result<()>;
    async fn stop(&self) -> Result<()>;
    async fn monitor(&self) -> Result<ResourceStatus>;
}
