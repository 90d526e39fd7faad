//! Network namespace stage of a resource group, delegating the actual work
//! to the Tenant Network Isolator contract (§4.2).

use async_trait::async_trait;

use arca_common::error::Result;
use arca_net::{IsolationParams, IsolationStatus};

use crate::resource::{GroupResource, ResourceStatus};

pub struct NetnsResource {
    name: String,
    params: IsolationParams,
}

impl NetnsResource {
    pub fn new(name: impl Into<String>, params: IsolationParams) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }
}

#[async_trait]
impl GroupResource for NetnsResource {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self) -> Result<()> {
        arca_net::validate(&self.params)
    }

    async fn start(&self) -> Result<()> {
        arca_net::start(&self.params).await
    }

    async fn stop(&self) -> Result<()> {
        arca_net::stop(&self.params).await
    }

    async fn monitor(&self) -> Result<ResourceStatus> {
        let status: IsolationStatus = arca_net::monitor(&self.params).await?;
        Ok(
            if status.netns_present
                && status.interface_up
                && status.vip_assigned
                && status.default_route_present
            {
                ResourceStatus::Started
            } else if !status.netns_present {
                ResourceStatus::Stopped
            } else {
                ResourceStatus::Transitioning
            },
        )
    }
}
