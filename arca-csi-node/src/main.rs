use clap::Parser;
use tokio::net::UnixListener;
use tokio_stream::wrappers::UnixListenerStream;
use tonic::transport::Server;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use arca_csi_node::csi::identity_server::IdentityServer;
use arca_csi_node::csi::node_server::NodeServer;
use arca_csi_node::identity::IdentityService;
use arca_csi_node::mount::MountManager;
use arca_csi_node::node::NodeService;
use arca_csi_node::node_state::NodeStateStore;

#[derive(Parser, Debug)]
#[command(name = "arca-csi-node", version, about)]
struct Args {
    /// CSI driver endpoint; kubelet connects here directly (§6 "driver `endpoint`").
    #[arg(long, default_value = "unix:///var/lib/csi/sockets/pluginproxy/csi.sock")]
    endpoint: String,

    /// Identity reported in NodeGetInfo; normally the Kubernetes node name.
    #[arg(long, env = "NODE_ID")]
    node_id: String,

    /// On-disk NodeState path (§6).
    #[arg(long, default_value = "/var/lib/csi-arca-storage/node-volumes.json")]
    state_file_path: String,

    /// Root under which one subdirectory per SVM holds the shared NFS mount.
    #[arg(long, default_value = "/var/lib/csi-arca-storage/mounts")]
    base_mount_path: String,

    #[arg(long, default_value = "256")]
    max_volumes_per_node: i64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let state = NodeStateStore::load(&args.state_file_path);
    let mounts = MountManager::new(&args.base_mount_path);

    reconcile_mounts_on_startup(&mounts, &state).await;

    let node = NodeService::new(args.node_id, args.max_volumes_per_node, mounts, state);

    let socket_path = args.endpoint.strip_prefix("unix://").unwrap_or(&args.endpoint);
    if let Some(parent) = std::path::Path::new(socket_path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    let _ = std::fs::remove_file(socket_path);
    let listener = UnixListener::bind(socket_path)?;
    info!(endpoint = %args.endpoint, "starting arca-csi-node");

    Server::builder()
        .add_service(IdentityServer::new(IdentityService))
        .add_service(NodeServer::new(node))
        .serve_with_incoming(UnixListenerStream::new(listener))
        .await?;

    Ok(())
}

/// Reattaches the shared SVM mount for every distinct SVM referenced by a
/// surviving NodeState entry, so a node-plugin restart does not strand
/// already-published volumes without their backing mount (§4.8 "Startup
/// reconciliation").
async fn reconcile_mounts_on_startup(mounts: &MountManager, state: &NodeStateStore) {
    let snapshot = state.snapshot().await;
    let mut seen = std::collections::HashSet::new();
    for entry in snapshot.volumes.values() {
        if !seen.insert(entry.svm.clone()) {
            continue;
        }
        if let Err(e) = mounts.ensure_svm_mount(&entry.svm, entry.vip).await {
            warn!(svm = %entry.svm, error = %e, "failed to reattach shared SVM mount on startup");
        } else {
            info!(svm = %entry.svm, "reattached shared SVM mount on startup");
        }
    }
}
