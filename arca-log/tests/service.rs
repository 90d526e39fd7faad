use std::sync::Arc;
use std::time::Duration;
use tonic::transport::Server;

use arca_log::storage::LogManager;
use arca_log::{LogEntry, LogLevel, LogRequest, LogService, LogServiceClient, LogServiceServer};

struct TestService {
    manager: Arc<LogManager>,
}

#[tonic::async_trait]
impl LogService for TestService {
    async fn get_version(
        &self,
        _request: tonic::Request<arca_log::proto::GetVersionRequest>,
    ) -> Result<tonic::Response<arca_log::proto::VersionInfo>, tonic::Status> {
        Ok(tonic::Response::new(arca_log::proto::VersionInfo {
            version: "test".into(),
        }))
    }

    async fn log(
        &self,
        request: tonic::Request<LogRequest>,
    ) -> Result<tonic::Response<arca_log::LogResponse>, tonic::Status> {
        let entry = request.into_inner().entry.unwrap();
        self.manager
            .append_batch(vec![LogEntry {
                id: ulid::Ulid::new().to_string(),
                timestamp_ns: 1,
                ..entry
            }])
            .unwrap();
        Ok(tonic::Response::new(arca_log::LogResponse {
            id: String::new(),
        }))
    }

    type QueryStream = tokio_stream::wrappers::ReceiverStream<Result<LogEntry, tonic::Status>>;

    async fn query(
        &self,
        _request: tonic::Request<arca_log::QueryRequest>,
    ) -> Result<tonic::Response<Self::QueryStream>, tonic::Status> {
        unimplemented!("not exercised by this test")
    }
}

#[tokio::test]
async fn client_can_log_and_version() {
    let dir = tempfile::tempdir().unwrap();
    let manager = Arc::new(LogManager::new(dir.path()).unwrap());
    let port = portpicker::pick_unused_port().unwrap();
    let addr = format!("[::1]:{port}").parse().unwrap();

    tokio::spawn(
        Server::builder()
            .add_service(LogServiceServer::new(TestService { manager: manager.clone() }))
            .serve(addr),
    );
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut client = LogServiceClient::connect(format!("http://[::1]:{port}"))
        .await
        .unwrap();

    let version = client
        .get_version(arca_log::proto::GetVersionRequest {})
        .await
        .unwrap();
    assert_eq!(version.into_inner().version, "test");

    client
        .log(LogRequest {
            entry: Some(LogEntry {
                id: String::new(),
                timestamp_ns: 0,
                message: "svm created".into(),
                level: LogLevel::Audit as i32,
                component: "api".into(),
                related_object_ids: vec!["tenant_a".into()],
            }),
        })
        .await
        .unwrap();

    let stored = manager.query(None, None, None, 10).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].message, "svm created");
}
