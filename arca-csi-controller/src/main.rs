use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::UnixListener;
use tokio_stream::wrappers::UnixListenerStream;
use tonic::transport::Server;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use arca_csi_controller::config::{parse_pools, ArcaClientConfig};
use arca_csi_controller::controller::ControllerService;
use arca_csi_controller::csi::controller_server::ControllerServer;
use arca_csi_controller::csi::identity_server::IdentityServer;
use arca_csi_controller::identity::IdentityService;
use arca_csi_controller::ip_pool::IpAllocator;
use arca_csi_controller::lock::K8sLeaseLockManager;
use arca_csi_controller::rest_client::ArcaClient;
use arca_csi_controller::store::MetadataStore;

#[derive(Parser, Debug)]
#[command(name = "arca-csi-controller", version, about)]
struct Args {
    /// CSI driver endpoint; kubelet's external-provisioner/-snapshotter/-resizer
    /// sidecars connect here (§6 "driver `endpoint`").
    #[arg(long, default_value = "unix:///var/lib/csi/sockets/pluginproxy/csi.sock")]
    endpoint: String,

    /// REST control plane base URL (§6).
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    arca_base_url: String,

    /// REST request timeout.
    #[arg(long, default_value = "10")]
    arca_timeout_secs: u64,

    /// Bearer token for the REST surface; overridden by ARCA_AUTH_TOKEN.
    #[arg(long)]
    arca_auth_token: Option<String>,

    /// `cidr:first_ip:last_ip:vlan_id:gateway` tuples, comma-separated.
    #[arg(long)]
    network_pools: String,

    /// Namespace holding the coordination Leases used as the distributed lock.
    #[arg(long, default_value = "arca-system")]
    lock_namespace: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let identity = std::env::var("POD_NAME").unwrap_or_else(|_| format!("arca-csi-controller-{}", uuid::Uuid::new_v4()));

    let arca_cfg = ArcaClientConfig::from_env(
        args.arca_base_url,
        Duration::from_secs(args.arca_timeout_secs),
        args.arca_auth_token,
    );
    let rest = Arc::new(ArcaClient::new(&arca_cfg)?);

    let pools = parse_pools(&args.network_pools)?;
    let ip_allocator = Arc::new(IpAllocator::new(pools));

    let kube_client = kube::Client::try_default().await?;
    let store = Arc::new(MetadataStore::new(kube_client.clone()));
    let locks: Arc<dyn arca_common::lock::LockManager> = Arc::new(K8sLeaseLockManager::new(kube_client, args.lock_namespace, identity));

    let controller = ControllerService::new(rest, store, locks, ip_allocator);

    let socket_path = args.endpoint.strip_prefix("unix://").unwrap_or(&args.endpoint);
    if let Some(parent) = std::path::Path::new(socket_path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    let _ = std::fs::remove_file(socket_path);
    let listener = UnixListener::bind(socket_path)?;
    info!(endpoint = %args.endpoint, "starting arca-csi-controller");

    Server::builder()
        .add_service(IdentityServer::new(IdentityService))
        .add_service(ControllerServer::new(controller))
        .serve_with_incoming(UnixListenerStream::new(listener))
        .await?;

    Ok(())
}
