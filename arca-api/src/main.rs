use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use arca_exporter::ExporterProtocolConfig;
use arca_ha::host::{CrmResourceHost, ResourceHost};
use arca_storage::lvm::ThinPool;
use arca_storage::StorageManager;

use arca_api::orchestrator::OrchestratorConfig;
use arca_api::rest::{create_router, AppState};
use arca_api::{ApiAuditLogger, Orchestrator, Store};

#[derive(Parser)]
#[command(name = "arca-api")]
#[command(about = "ARCA storage-node REST control plane")]
struct Args {
    /// Listen address for the REST API
    #[arg(short, long, default_value = "[::]:8080")]
    listen: String,

    /// Data directory for the control plane's own sqlite database
    #[arg(short, long, default_value = "/var/lib/arca/api")]
    data_dir: PathBuf,

    /// Root of all per-SVM export trees
    #[arg(long, default_value = "/srv/arca/exports")]
    export_root: PathBuf,

    /// Directory the exporter's rendered configs are written into
    #[arg(long, default_value = "/etc/arca/exports.d")]
    exporter_config_dir: PathBuf,

    /// Template version tag embedded in rendered exporter configs
    #[arg(long, default_value = "v1")]
    template_version: String,

    /// LVM volume group backing the thin pool
    #[arg(long, default_value = "arca-vg")]
    vg_name: String,

    /// LVM thin pool name within the volume group
    #[arg(long, default_value = "arca-pool")]
    pool_name: String,

    /// Parent interface VLANs are carved from
    #[arg(long, default_value = "eth0")]
    parent_if: String,

    /// Size of the per-SVM root filesystem created at SVM-create time
    #[arg(long, default_value_t = 10u64 * 1024 * 1024 * 1024)]
    svm_root_size_bytes: u64,

    /// Enable NFSv3 alongside NFSv4
    #[arg(long)]
    nfsv3: bool,

    /// mountd port (only meaningful with --nfsv3)
    #[arg(long)]
    mountd_port: Option<u16>,

    /// NLM port (only meaningful with --nfsv3)
    #[arg(long)]
    nlm_port: Option<u16>,

    /// Log service endpoint for audit logging
    #[arg(long, default_value = "http://[::1]:50052")]
    log_endpoint: String,

    /// Run in development mode: in-memory audit sink, no Pacemaker calls
    #[arg(long)]
    dev: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("arca_api=info".parse()?))
        .init();

    let args = Args::parse();

    tokio::fs::create_dir_all(&args.data_dir).await?;
    tokio::fs::create_dir_all(&args.export_root).await?;
    tokio::fs::create_dir_all(&args.exporter_config_dir).await?;

    info!("Starting arca-api - REST: {}", args.listen);

    let database_url = format!("sqlite://{}?mode=rwc", args.data_dir.join("api.db").display());
    let store = Store::connect(&database_url).await?;

    let pool = ThinPool::new(args.vg_name.clone(), args.pool_name.clone());
    let storage_database_url = format!("sqlite://{}?mode=rwc", args.data_dir.join("storage.db").display());
    let storage = StorageManager::new(pool, &storage_database_url, args.export_root.clone()).await?;

    let audit = if args.dev {
        Arc::new(ApiAuditLogger::new_noop())
    } else {
        Arc::new(ApiAuditLogger::new(&args.log_endpoint))
    };

    let host: Arc<dyn ResourceHost> = Arc::new(CrmResourceHost::new());

    let config = OrchestratorConfig {
        parent_if: args.parent_if,
        export_root: args.export_root,
        exporter_config_dir: args.exporter_config_dir,
        template_version: args.template_version,
        protocol: ExporterProtocolConfig {
            nfsv3_enabled: args.nfsv3,
            mountd_port: args.mountd_port,
            nlm_port: args.nlm_port,
        },
        svm_root_size_bytes: args.svm_root_size_bytes,
        vg_name: args.vg_name,
    };

    let orchestrator = Orchestrator::new(store, storage, host, audit, config);
    let app_state = Arc::new(AppState { orchestrator });
    let router = create_router(app_state).layer(tower_http::trace::TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&args.listen).await?;
    info!("REST API listening on {}", args.listen);

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);
    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown_rx.changed().await.ok();
            })
            .await
    });

    let ctrl_c = signal::ctrl_c();
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = sigterm.recv() => info!("Received SIGTERM"),
    }

    let _ = shutdown_tx.send(true);
    let _ = server.await;

    info!("Shutdown complete");
    Ok(())
}
