pub mod executor;
pub mod model;
pub mod registry;
pub mod scan;
pub mod traits;

#[cfg(test)]
pub(crate) mod testutil;

// Re-export common types for convenience
pub use executor::*;
pub use model::*;
pub use registry::*;
pub use scan::{ArchiveScanner, ScanConfig, ScanError, ScanOutcome, ScanStats};
pub use traits::*;
