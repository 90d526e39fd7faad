use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use arca_net::{monitor, start, stop, validate, IsolationParams};

#[derive(Parser)]
#[command(name = "arca-net")]
#[command(about = "Tenant network isolation: netns + VLAN sub-interface + VIP + default route")]
struct Args {
    ns: String,
    vlan_id: u16,
    parent_if: String,
    ip: std::net::Ipv4Addr,
    prefix: u8,
    gw: std::net::Ipv4Addr,

    #[arg(long, default_value_t = 1500)]
    mtu: u32,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    Start,
    Stop,
    Monitor,
    Validate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("arca_net=info".parse()?))
        .init();

    let args = Args::parse();
    let params = IsolationParams {
        ns: args.ns,
        vlan_id: args.vlan_id,
        parent_if: args.parent_if,
        ip: args.ip,
        prefix: args.prefix,
        gw: args.gw,
        mtu: args.mtu,
    };

    match args.command {
        Cmd::Start => {
            start(&params).await?;
            info!("isolation started");
        }
        Cmd::Stop => {
            stop(&params).await?;
            info!("isolation stopped");
        }
        Cmd::Monitor => {
            let status = monitor(&params).await?;
            info!(
                netns_present = status.netns_present,
                interface_up = status.interface_up,
                vip_assigned = status.vip_assigned,
                default_route_present = status.default_route_present,
                "status"
            );
        }
        Cmd::Validate => {
            validate(&params)?;
            info!("parameters valid");
        }
    }

    Ok(())
}
