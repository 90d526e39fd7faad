pub mod block_device;
pub mod group;
pub mod host;
pub mod mount_resource;
pub mod netns_resource;
pub mod nfs_resource;
pub mod resource;

pub use group::SvmResourceGroup;
pub use host::{CrmResourceHost, GroupResourceSpec, LocalResourceHost, ResourceHost};
pub use resource::{GroupResource, ResourceStatus};
