use std::path::PathBuf;

use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use arca_common::model::Export;
use arca_exporter::{render, write_config, ExporterDaemon, ExporterProtocolConfig};

#[derive(Parser)]
#[command(name = "arca-exporter")]
#[command(about = "Per-SVM NFS exporter daemon supervisor")]
struct Args {
    svm: String,
    netns: String,

    #[arg(long, default_value = "/etc/ganesha")]
    config_dir: PathBuf,

    /// JSON file containing the current list of Export records for this SVM.
    #[arg(long)]
    exports_file: PathBuf,

    #[arg(long, default_value = "v1")]
    template_version: String,

    #[arg(long)]
    nfsv3_enabled: bool,

    #[arg(long)]
    mountd_port: Option<u16>,

    #[arg(long)]
    nlm_port: Option<u16>,
}

async fn load_exports(path: &PathBuf) -> anyhow::Result<Vec<Export>> {
    let bytes = tokio::fs::read(path).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("arca_exporter=info".parse()?))
        .init();

    let args = Args::parse();
    tokio::fs::create_dir_all(&args.config_dir).await?;

    let protocol = ExporterProtocolConfig {
        nfsv3_enabled: args.nfsv3_enabled,
        mountd_port: args.mountd_port,
        nlm_port: args.nlm_port,
    };

    let exports = load_exports(&args.exports_file).await?;
    let rendered = render(&args.template_version, &protocol, &exports);
    write_config(&args.config_dir, &args.svm, &rendered).await?;
    info!(svm = %args.svm, config_version = %rendered.config_version, "rendered initial config");

    let mut daemon = ExporterDaemon::new(args.svm.clone(), args.netns.clone(), args.config_dir.clone());
    daemon.start().await?;
    info!(svm = %args.svm, "exporter daemon started");

    let mut sighup = signal(SignalKind::hangup())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    loop {
        tokio::select! {
            _ = sighup.recv() => {
                match load_exports(&args.exports_file).await {
                    Ok(exports) => {
                        let rendered = render(&args.template_version, &protocol, &exports);
                        if let Err(e) = write_config(&args.config_dir, &args.svm, &rendered).await {
                            warn!(svm = %args.svm, error = %e, "failed to write reloaded config");
                            continue;
                        }
                        if let Err(e) = daemon.reload() {
                            warn!(svm = %args.svm, error = %e, "failed to signal reload");
                        } else {
                            info!(svm = %args.svm, config_version = %rendered.config_version, "reloaded config");
                        }
                    }
                    Err(e) => warn!(svm = %args.svm, error = %e, "failed to read exports file on reload"),
                }
            }
            _ = sigterm.recv() => {
                info!(svm = %args.svm, "shutting down");
                daemon.stop().await?;
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                info!(svm = %args.svm, "shutting down");
                daemon.stop().await?;
                break;
            }
        }
    }

    Ok(())
}
