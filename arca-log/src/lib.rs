//! arca-log client library: the shared audit-logging sink used by every
//! ARCA component.
//!
//! # Example
//! ```ignore
//! use arca_log::{AuditLogger, LogLevel, create_audit_logger};
//!
//! let audit = create_audit_logger("http://[::1]:50052", "api");
//! audit.log(LogLevel::Audit, "svm created", vec![svm_name]).await;
//! ```

pub mod proto {
    tonic::include_proto!("arca.log");
}

mod audit;
pub mod storage;

pub use proto::log_service_client::LogServiceClient;
pub use proto::log_service_server::{LogService, LogServiceServer};
pub use proto::{LogEntry, LogLevel, LogRequest, LogResponse, QueryRequest};

pub use audit::{create_audit_logger, AuditLogger};
