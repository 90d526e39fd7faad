//! Runtime configuration (§6 "Configuration options recognized", CSI subset).

use std::net::Ipv4Addr;
use std::time::Duration;

use arca_common::model::IpPoolRange;

#[derive(Debug, Clone)]
pub struct ArcaClientConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub auth_token: Option<String>,
}

impl ArcaClientConfig {
    pub fn from_env(base_url: String, timeout: Duration, auth_token: Option<String>) -> Self {
        let auth_token = std::env::var("ARCA_AUTH_TOKEN").ok().or(auth_token);
        Self {
            base_url,
            timeout,
            auth_token,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub pools: Vec<IpPoolRange>,
    pub mtu: u32,
}

#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub endpoint: String,
    pub node_id: String,
}

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub arca: ArcaClientConfig,
    pub network: NetworkConfig,
    pub driver: DriverConfig,
    pub lock_namespace: String,
}

/// Parses `cidr:first_ip:last_ip:vlan_id:gateway,...` pool tuples.
pub fn parse_pools(spec: &str) -> anyhow::Result<Vec<IpPoolRange>> {
    spec.split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|entry| {
            let parts: Vec<&str> = entry.trim().split(':').collect();
            anyhow::ensure!(parts.len() == 5, "pool entry must be cidr:first_ip:last_ip:vlan_id:gateway, got {entry}");
            Ok(IpPoolRange {
                cidr: parts[0].to_string(),
                first_ip: parts[1].parse::<Ipv4Addr>()?,
                last_ip: parts[2].parse::<Ipv4Addr>()?,
                vlan_id: parts[3].parse()?,
                gateway: parts[4].parse::<Ipv4Addr>()?,
            })
        })
        .collect()
}
