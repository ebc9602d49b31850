//! Host page implementations

mod snapshot;

pub use snapshot::{HostBehavior, SnapshotHost};
