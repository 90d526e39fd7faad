//! IP allocator (§4.7 "IP allocator"): a pool counter selects a starting pool
//! round-robin per call; within a pool, enumerate VIPs already in use for the
//! pool's `vlan_id` via REST and pick the lowest free host, or a random offset
//! within the pool on a conflict retry. IPv4 only, network/broadcast excluded.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};

use rand::Rng;

use arca_common::error::{ArcaError, Result};
use arca_common::model::IpPoolRange;

use crate::rest_client::ArcaClient;

pub struct Allocation {
    pub vlan_id: u16,
    pub ip_cidr: String,
    pub gateway: Ipv4Addr,
}

pub struct IpAllocator {
    pools: Vec<IpPoolRange>,
    next_pool: AtomicUsize,
}

impl IpAllocator {
    pub fn new(pools: Vec<IpPoolRange>) -> Self {
        Self {
            pools,
            next_pool: AtomicUsize::new(0),
        }
    }

    /// `retry` is true when called after a reported `NetworkConflict`, which
    /// starts the host scan at a random offset instead of the lowest free.
    pub async fn allocate(&self, rest: &ArcaClient, retry: bool) -> Result<Allocation> {
        if self.pools.is_empty() {
            return Err(ArcaError::CapacityExhausted("no IP pools configured".into()));
        }

        let start = self.next_pool.fetch_add(1, Ordering::Relaxed) % self.pools.len();
        let svms = rest.list_svms().await?;

        for offset in 0..self.pools.len() {
            let pool = &self.pools[(start + offset) % self.pools.len()];
            let hosts = usable_hosts(pool);
            if hosts.is_empty() {
                continue;
            }

            let in_use: std::collections::HashSet<Ipv4Addr> = svms
                .iter()
                .filter(|s| s.vlan_id == pool.vlan_id)
                .filter_map(|s| s.vip.parse::<Ipv4Addr>().ok())
                .collect();

            let ordered: Vec<Ipv4Addr> = if retry {
                let skip = rand::thread_rng().gen_range(0..hosts.len());
                hosts.iter().cycle().skip(skip).take(hosts.len()).copied().collect()
            } else {
                hosts.clone()
            };

            if let Some(ip) = ordered.into_iter().find(|ip| !in_use.contains(ip)) {
                let prefix = prefix_len(pool);
                return Ok(Allocation {
                    vlan_id: pool.vlan_id,
                    ip_cidr: format!("{ip}/{prefix}"),
                    gateway: pool.gateway,
                });
            }
        }

        Err(ArcaError::CapacityExhausted("AllPoolsExhausted".into()))
    }
}

fn usable_hosts(pool: &IpPoolRange) -> Vec<Ipv4Addr> {
    let net: Option<ipnet::Ipv4Net> = pool.cidr.parse().ok();
    let first = u32::from(pool.first_ip);
    let last = u32::from(pool.last_ip);
    (first..=last)
        .map(Ipv4Addr::from)
        .filter(|ip| match &net {
            Some(n) => *ip != n.network() && *ip != n.broadcast(),
            None => true,
        })
        .collect()
}

fn prefix_len(pool: &IpPoolRange) -> u8 {
    pool.cidr
        .parse::<ipnet::Ipv4Net>()
        .map(|n| n.prefix_len())
        .unwrap_or(24)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> IpPoolRange {
        IpPoolRange {
            cidr: "192.168.10.0/24".to_string(),
            first_ip: "192.168.10.2".parse().unwrap(),
            last_ip: "192.168.10.3".parse().unwrap(),
            vlan_id: 100,
            gateway: "192.168.10.1".parse().unwrap(),
        }
    }

    #[test]
    fn usable_hosts_excludes_network_and_broadcast() {
        let p = IpPoolRange {
            cidr: "192.168.10.0/30".to_string(),
            first_ip: "192.168.10.0".parse().unwrap(),
            last_ip: "192.168.10.3".parse().unwrap(),
            ..pool()
        };
        let hosts = usable_hosts(&p);
        assert_eq!(hosts, vec!["192.168.10.1".parse::<Ipv4Addr>().unwrap(), "192.168.10.2".parse().unwrap()]);
    }

    #[test]
    fn prefix_len_from_cidr() {
        assert_eq!(prefix_len(&pool()), 24);
    }
}
