pub mod gateway;
pub mod markers;
pub mod normalize;
pub mod signer;

pub use gateway::{in_tracked_order, CatalogGateway};
