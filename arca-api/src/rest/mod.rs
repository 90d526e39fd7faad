pub mod directories;
pub mod exports;
pub mod quotas;
pub mod routes;
pub mod snapshots;
pub mod svms;
pub mod volumes;

use std::sync::Arc;

use crate::orchestrator::Orchestrator;

pub struct AppState {
    pub orchestrator: Orchestrator,
}

pub type SharedState = Arc<AppState>;

pub use routes::create_router;
