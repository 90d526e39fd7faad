pub mod isolator;
pub mod netlink;
pub mod netns;

pub use isolator::{start, stop, monitor, validate, IsolationParams};
pub use netlink::IsolationStatus;
