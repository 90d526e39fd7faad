use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use arca_storage::{StorageManager, ThinPool};

#[derive(Parser)]
#[command(name = "arca-storage")]
#[command(about = "Storage Stack operations: thin LV + XFS + project quotas")]
struct Args {
    #[arg(long, default_value = "arca")]
    vg: String,

    #[arg(long, default_value = "arca-thin")]
    pool: String,

    #[arg(long, default_value = "/exports")]
    export_root: String,

    #[arg(long, default_value = "sqlite:///var/lib/arca/storage.db")]
    database_url: String,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    CreateVolume {
        svm: String,
        volume: String,
        size_bytes: u64,
    },
    ResizeVolume {
        svm: String,
        volume: String,
        new_size_bytes: u64,
    },
    DeleteVolume {
        svm: String,
        volume: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("arca_storage=info".parse()?))
        .init();

    let args = Args::parse();
    let pool = ThinPool::new(args.vg, args.pool);
    let manager = StorageManager::new(pool, &args.database_url, args.export_root).await?;

    match args.command {
        Cmd::CreateVolume { svm, volume, size_bytes } => {
            let path = manager.create_volume(&svm, &volume, size_bytes).await?;
            info!(?path, "volume created");
        }
        Cmd::ResizeVolume { svm, volume, new_size_bytes } => {
            let grew = manager.resize_volume(&svm, &volume, new_size_bytes).await?;
            info!(grew, "resize complete");
        }
        Cmd::DeleteVolume { svm, volume } => {
            manager.delete_volume(&svm, &volume).await?;
            info!("volume deleted");
        }
    }

    Ok(())
}
