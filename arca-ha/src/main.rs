//! Resource agent binary (§9 "Pacemaker resource agent as shell script"):
//! one program exposing `start`/`stop`/`monitor`/`validate-all`, invoked by
//! Pacemaker per primitive with resource parameters as `OCF_RESKEY_*`
//! environment variables, matching the OCF resource agent convention.

use std::env;
use std::process::ExitCode;

use arca_ha::block_device::BlockDeviceReplica;
use arca_ha::mount_resource::FilesystemMount;
use arca_ha::netns_resource::NetnsResource;
use arca_ha::nfs_resource::NfsDaemon;
use arca_ha::{GroupResource, ResourceStatus};
use arca_net::IsolationParams;
use tracing_subscriber::EnvFilter;

const OCF_SUCCESS: u8 = 0;
const OCF_ERR_GENERIC: u8 = 1;
const OCF_ERR_ARGS: u8 = 2;
const OCF_NOT_RUNNING: u8 = 7;

fn reskey(name: &str) -> Option<String> {
    env::var(format!("OCF_RESKEY_{name}")).ok()
}

fn build_resource() -> Result<Box<dyn GroupResource>, String> {
    let stage = reskey("stage").ok_or("OCF_RESKEY_stage is required")?;
    match stage.as_str() {
        "block_device" => {
            let resource_name = reskey("resource_name").ok_or("OCF_RESKEY_resource_name is required")?;
            Ok(Box::new(BlockDeviceReplica::new(resource_name)))
        }
        "mount" => {
            let device = reskey("device").ok_or("OCF_RESKEY_device is required")?;
            let mount_point = reskey("mount_point").ok_or("OCF_RESKEY_mount_point is required")?;
            Ok(Box::new(FilesystemMount::new(
                "mount",
                device,
                mount_point.into(),
            )))
        }
        "netns" => {
            let ns = reskey("netns").ok_or("OCF_RESKEY_netns is required")?;
            let vlan_id: u16 = reskey("vlan_id")
                .ok_or("OCF_RESKEY_vlan_id is required")?
                .parse()
                .map_err(|_| "OCF_RESKEY_vlan_id must be an integer".to_string())?;
            let parent_if = reskey("parent_if").ok_or("OCF_RESKEY_parent_if is required")?;
            let ip = reskey("ip")
                .ok_or("OCF_RESKEY_ip is required")?
                .parse()
                .map_err(|_| "OCF_RESKEY_ip must be an IPv4 address".to_string())?;
            let prefix: u8 = reskey("prefix")
                .ok_or("OCF_RESKEY_prefix is required")?
                .parse()
                .map_err(|_| "OCF_RESKEY_prefix must be an integer".to_string())?;
            let gw = reskey("gw")
                .ok_or("OCF_RESKEY_gw is required")?
                .parse()
                .map_err(|_| "OCF_RESKEY_gw must be an IPv4 address".to_string())?;
            let mtu: u32 = reskey("mtu").unwrap_or_else(|| "1500".to_string()).parse().unwrap_or(1500);
            Ok(Box::new(NetnsResource::new(
                ns.clone(),
                IsolationParams {
                    ns,
                    vlan_id,
                    parent_if,
                    ip,
                    prefix,
                    gw,
                    mtu,
                },
            )))
        }
        "nfs" => {
            let svm = reskey("svm").ok_or("OCF_RESKEY_svm is required")?;
            Ok(Box::new(NfsDaemon::new(svm)))
        }
        other => Err(format!("unknown OCF_RESKEY_stage {other:?}")),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("arca_ha=info".parse().unwrap()))
        .try_init();

    let action = match env::args().nth(1) {
        Some(a) => a,
        None => {
            eprintln!("usage: arca-ha-agent <start|stop|monitor|validate-all>");
            return ExitCode::from(OCF_ERR_ARGS);
        }
    };

    let resource = match build_resource() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(OCF_ERR_ARGS);
        }
    };

    match action.as_str() {
        "validate-all" => match resource.validate() {
            Ok(()) => ExitCode::from(OCF_SUCCESS),
            Err(e) => {
                eprintln!("{e}");
                ExitCode::from(OCF_ERR_ARGS)
            }
        },
        "start" => match resource.start().await {
            Ok(()) => ExitCode::from(OCF_SUCCESS),
            Err(e) => {
                eprintln!("{e}");
                ExitCode::from(OCF_ERR_GENERIC)
            }
        },
        "stop" => match resource.stop().await {
            Ok(()) => ExitCode::from(OCF_SUCCESS),
            Err(e) => {
                eprintln!("{e}");
                ExitCode::from(OCF_ERR_GENERIC)
            }
        },
        "monitor" => match resource.monitor().await {
            Ok(ResourceStatus::Started) => ExitCode::from(OCF_SUCCESS),
            Ok(ResourceStatus::Stopped) => ExitCode::from(OCF_NOT_RUNNING),
            Ok(ResourceStatus::Transitioning) => ExitCode::from(OCF_SUCCESS),
            Ok(ResourceStatus::Failed) => ExitCode::from(OCF_ERR_GENERIC),
            Err(e) => {
                eprintln!("{e}");
                ExitCode::from(OCF_ERR_GENERIC)
            }
        },
        other => {
            eprintln!("unknown action {other:?}");
            ExitCode::from(OCF_ERR_ARGS)
        }
    }
}
