pub mod csi;
pub mod identity;
pub mod mount;
pub mod node;
pub mod node_state;

use arca_common::error::{ArcaError, ErrorKind};
use tonic::Status;

pub(crate) fn to_status(err: ArcaError) -> Status {
    match err.kind() {
        ErrorKind::Validation => Status::invalid_argument(err.to_string()),
        ErrorKind::NotFound => Status::not_found(err.to_string()),
        ErrorKind::AlreadyExists => Status::already_exists(err.to_string()),
        ErrorKind::NetworkConflict => Status::aborted(err.to_string()),
        ErrorKind::CapacityExhausted => Status::resource_exhausted(err.to_string()),
        ErrorKind::Transient | ErrorKind::Unavailable => Status::unavailable(err.to_string()),
        ErrorKind::StateMachine | ErrorKind::Corruption => Status::failed_precondition(err.to_string()),
    }
}
