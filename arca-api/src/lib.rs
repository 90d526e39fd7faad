//! REST control plane for SVMs, Volumes, Exports, Directories, Snapshots and
//! Quotas on the ARCA NFS storage cluster (§4.6). `Orchestrator` implements
//! the reconcile-on-write pattern: validate, acquire a resource-scoped
//! advisory lock, perform ordered side effects, and persist state only after
//! every side effect has succeeded.

pub mod audit;
pub mod error;
pub mod locks;
pub mod orchestrator;
pub mod response;
pub mod rest;
pub mod store;

pub use audit::ApiAuditLogger;
pub use error::ApiError;
pub use orchestrator::{Orchestrator, OrchestratorConfig};
pub use rest::{create_router, AppState};
pub use store::Store;
