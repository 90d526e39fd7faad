use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{transport::Server, Request, Response, Status};
use tracing::info;

use arca_log::proto::{GetVersionRequest, VersionInfo};
use arca_log::storage::LogManager;
use arca_log::{LogEntry, LogRequest, LogResponse, LogService, LogServiceServer, QueryRequest};

mod batcher;
use batcher::Batcher;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "[::1]:50052")]
    listen: String,

    #[arg(short, long, default_value = "/var/lib/arca/log")]
    data_dir: PathBuf,
}

pub struct ArcaLogService {
    manager: Arc<LogManager>,
    batcher: Arc<Batcher>,
}

#[tonic::async_trait]
impl LogService for ArcaLogService {
    async fn get_version(
        &self,
        _request: Request<GetVersionRequest>,
    ) -> Result<Response<VersionInfo>, Status> {
        Ok(Response::new(VersionInfo {
            version: env!("CARGO_PKG_VERSION").to_string(),
        }))
    }

    async fn log(&self, request: Request<LogRequest>) -> Result<Response<LogResponse>, Status> {
        let req = request.into_inner();
        let entry = req
            .entry
            .ok_or_else(|| Status::invalid_argument("missing entry"))?;
        self.batcher.submit(entry);
        Ok(Response::new(LogResponse { id: String::new() }))
    }

    type QueryStream = ReceiverStream<Result<LogEntry, Status>>;

    async fn query(
        &self,
        request: Request<QueryRequest>,
    ) -> Result<Response<Self::QueryStream>, Status> {
        let req = request.into_inner();
        let (tx, rx) = mpsc::channel(64);
        let manager = self.manager.clone();

        tokio::spawn(async move {
            let limit = if req.limit == 0 { 100 } else { req.limit as usize };
            match manager.query(req.object_id, req.start_time_ns, req.end_time_ns, limit) {
                Ok(logs) => {
                    for log in logs {
                        if tx.send(Ok(log)).await.is_err() {
                            break;
                        }
                    }
                }
                Err(e) => {
                    let _ = tx
                        .send(Err(Status::internal(format!("query failed: {e}"))))
                        .await;
                }
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    std::fs::create_dir_all(&args.data_dir)?;
    info!("opening log storage at {:?}", args.data_dir);

    let manager = Arc::new(LogManager::new(&args.data_dir)?);
    let batcher = Arc::new(Batcher::new(manager.clone()));

    let addr = args.listen.parse()?;
    let service = ArcaLogService { manager, batcher };

    info!("arca-log listening on {}", addr);

    Server::builder()
        .add_service(LogServiceServer::new(service))
        .serve(addr)
        .await?;

    Ok(())
}
