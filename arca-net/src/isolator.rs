//! Tenant Network Isolator resource contract (§4.2).

use std::net::Ipv4Addr;

use arca_common::error::{ArcaError, Result};
use arca_common::ids::validate_vlan_id;

use crate::netlink::{self, IsolationStatus};
use crate::netns;

#[derive(Debug, Clone)]
pub struct IsolationParams {
    pub ns: String,
    pub vlan_id: u16,
    pub parent_if: String,
    pub ip: Ipv4Addr,
    pub prefix: u8,
    pub gw: Ipv4Addr,
    pub mtu: u32,
}

/// `validate`: parameter legality only, no system calls (§4.2).
pub fn validate(params: &IsolationParams) -> Result<()> {
    validate_vlan_id(params.vlan_id)?;
    if params.prefix > 32 {
        return Err(ArcaError::validation(format!(
            "prefix {} out of range [0,32]",
            params.prefix
        )));
    }
    Ok(())
}

/// Idempotent start: ensures netns, VLAN sub-interface, VIP, default route,
/// and loopback are all up.
pub async fn start(params: &IsolationParams) -> Result<()> {
    validate(params)?;
    netns::ensure(&params.ns).await?;
    netlink::ensure_isolation(
        &params.ns,
        params.vlan_id,
        &params.parent_if,
        params.ip,
        params.prefix,
        params.gw,
        params.mtu,
    )
    .await
}

/// Tears down in reverse order and deletes the netns. Absence is success —
/// `netns::delete` already tolerates a missing namespace.
pub async fn stop(params: &IsolationParams) -> Result<()> {
    netns::delete(&params.ns).await
}

pub async fn monitor(params: &IsolationParams) -> Result<IsolationStatus> {
    netlink::monitor(&params.ns, params.vlan_id, &params.parent_if).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_params() -> IsolationParams {
        IsolationParams {
            ns: "tenant_a".into(),
            vlan_id: 100,
            parent_if: "bond0".into(),
            ip: "192.168.10.5".parse().unwrap(),
            prefix: 24,
            gw: "192.168.10.1".parse().unwrap(),
            mtu: 1500,
        }
    }

    #[test]
    fn validate_rejects_vlan_boundary_values() {
        let mut p = sample_params();
        p.vlan_id = 0;
        assert!(validate(&p).is_err());
        p.vlan_id = 4095;
        assert!(validate(&p).is_err());
        p.vlan_id = 1;
        assert!(validate(&p).is_ok());
        p.vlan_id = 4094;
        assert!(validate(&p).is_ok());
    }

    #[test]
    fn validate_rejects_prefix_out_of_range() {
        let mut p = sample_params();
        p.prefix = 33;
        assert!(validate(&p).is_err());
        p.prefix = 32;
        assert!(validate(&p).is_ok());
        p.prefix = 0;
        assert!(validate(&p).is_ok());
    }
}
