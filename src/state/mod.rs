pub mod snapshot_store;
pub mod tracking;

pub use snapshot_store::SnapshotStore;
pub use tracking::TrackingStore;
