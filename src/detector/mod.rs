pub mod change;
pub mod classifier;

pub use change::ChangeDetector;
