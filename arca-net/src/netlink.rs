//! VLAN sub-interface / VIP / default route management inside a network
//! namespace, via `rtnetlink`, following `mvirt-one`'s
//! `utils::network::netlink::NetlinkHandle` wrapper style.

use std::fs::File;
use std::net::Ipv4Addr;
use std::os::fd::AsRawFd;

use futures::TryStreamExt;
use nix::sched::{setns, CloneFlags};
use rtnetlink::Handle;

use arca_common::error::{ArcaError, Result};

use crate::netns;

/// Runs `f` with an rtnetlink `Handle` whose netlink socket lives inside
/// network namespace `ns`. `rtnetlink::new_connection` binds to whatever
/// namespace the calling thread is currently in, so this dedicates a plain
/// OS thread, `setns`-es it into `ns`, and drives a single-threaded runtime
/// there — the rest of the process (and its other tokio tasks) stay in the
/// default namespace.
async fn in_netns<F, Fut, T>(ns: &str, f: F) -> Result<T>
where
    F: FnOnce(Handle) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = Result<T>>,
    T: Send + 'static,
{
    let ns = ns.to_string();
    let (tx, rx) = tokio::sync::oneshot::channel();

    std::thread::spawn(move || {
        let result = (|| -> Result<T> {
            let ns_file = File::open(netns::ns_path(&ns)).map_err(|e| ArcaError::Other(e.into()))?;
            setns(ns_file.as_raw_fd(), CloneFlags::CLONE_NEWNET)
                .map_err(|e| ArcaError::Other(anyhow::anyhow!("setns({ns}) failed: {e}")))?;

            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| ArcaError::Other(e.into()))?;

            let local = tokio::task::LocalSet::new();
            rt.block_on(local.run_until(async move {
                let (connection, handle, _) = rtnetlink::new_connection()
                    .map_err(|e| ArcaError::Other(anyhow::anyhow!("rtnetlink connect: {e}")))?;
                tokio::task::spawn_local(connection);
                f(handle).await
            }))
        })();
        let _ = tx.send(result);
    });

    rx.await
        .map_err(|e| ArcaError::Other(anyhow::anyhow!("netns worker thread panicked: {e}")))?
}

async fn find_link_index(handle: &Handle, name: &str) -> Result<Option<u32>> {
    let mut links = handle.link().get().match_name(name.to_string()).execute();
    match links.try_next().await {
        Ok(Some(msg)) => Ok(Some(msg.header.index)),
        Ok(None) => Ok(None),
        Err(_) => Ok(None),
    }
}

/// Ensures the VLAN sub-interface `parent_if.vlan_id` exists inside `ns`
/// with `mtu`, the VIP is addressed with `prefix`, and the default route
/// via `gw` exists — idempotent (§4.2 "start").
pub async fn ensure_isolation(
    ns: &str,
    vlan_id: u16,
    parent_if: &str,
    ip: Ipv4Addr,
    prefix: u8,
    gw: Ipv4Addr,
    mtu: u32,
) -> Result<()> {
    let vlan_name = format!("{parent_if}.{vlan_id}");

    in_netns(ns, move |handle| async move {
        if find_link_index(&handle, &vlan_name).await?.is_none() {
            handle
                .link()
                .add()
                .vlan(vlan_name.clone(), 0, vlan_id as u16)
                .execute()
                .await
                .map_err(|e| ArcaError::Other(anyhow::anyhow!("vlan create failed: {e}")))?;
        }

        let index = find_link_index(&handle, &vlan_name)
            .await?
            .ok_or_else(|| ArcaError::Other(anyhow::anyhow!("vlan link missing after create")))?;

        handle
            .link()
            .set(index)
            .mtu(mtu)
            .up()
            .execute()
            .await
            .map_err(|e| ArcaError::Other(anyhow::anyhow!("link up failed: {e}")))?;

        let mut addrs = handle.address().get().set_link_index_filter(index).execute();
        let mut has_addr = false;
        while let Ok(Some(_)) = addrs.try_next().await {
            has_addr = true;
        }
        if !has_addr {
            handle
                .address()
                .add(index, std::net::IpAddr::V4(ip), prefix)
                .execute()
                .await
                .map_err(|e| ArcaError::Other(anyhow::anyhow!("address add failed: {e}")))?;
        }

        let mut routes = handle.route().get(rtnetlink::IpVersion::V4).execute();
        let mut has_default_route = false;
        while let Ok(Some(route)) = routes.try_next().await {
            if route.header.destination_prefix_length == 0 {
                has_default_route = true;
            }
        }
        if !has_default_route {
            handle
                .route()
                .add()
                .v4()
                .gateway(gw)
                .execute()
                .await
                .map_err(|e| ArcaError::Other(anyhow::anyhow!("route add failed: {e}")))?;
        }

        let loopback_index = find_link_index(&handle, "lo")
            .await?
            .ok_or_else(|| ArcaError::Other(anyhow::anyhow!("loopback missing")))?;
        handle
            .link()
            .set(loopback_index)
            .up()
            .execute()
            .await
            .map_err(|e| ArcaError::Other(anyhow::anyhow!("loopback up failed: {e}")))?;

        Ok(())
    })
    .await
}

pub struct IsolationStatus {
    pub netns_present: bool,
    pub interface_up: bool,
    pub vip_assigned: bool,
    pub default_route_present: bool,
}

/// `monitor` (§4.2): checks each condition without mutating anything.
pub async fn monitor(ns: &str, vlan_id: u16, parent_if: &str) -> Result<IsolationStatus> {
    if !netns::exists(ns).await? {
        return Ok(IsolationStatus {
            netns_present: false,
            interface_up: false,
            vip_assigned: false,
            default_route_present: false,
        });
    }

    let vlan_name = format!("{parent_if}.{vlan_id}");
    in_netns(ns, move |handle| async move {
        let index = find_link_index(&handle, &vlan_name).await?;
        let interface_up = index.is_some();

        let mut vip_assigned = false;
        if let Some(idx) = index {
            let mut addrs = handle.address().get().set_link_index_filter(idx).execute();
            if let Ok(Some(_)) = addrs.try_next().await {
                vip_assigned = true;
            }
        }

        let mut default_route_present = false;
        let mut routes = handle.route().get(rtnetlink::IpVersion::V4).execute();
        while let Ok(Some(route)) = routes.try_next().await {
            if route.header.destination_prefix_length == 0 {
                default_route_present = true;
            }
        }

        Ok(IsolationStatus {
            netns_present: true,
            interface_up,
            vip_assigned,
            default_route_present,
        })
    })
    .await
}
