//! Single-archive scanning.
//!
//! - **Container**: zip access via [`container::ContainerReader`]
//! - **Class files**: constant-pool parsing via [`classfile::ConstantPoolReader`]
//! - **Extraction**: per-class [`SymbolRecord`](crate::model::SymbolRecord)s
//! - **Reconciliation**: provides, requires and package edges
//! - **Manifest**: version resolution and canonical manifest lines
//! - **Pipeline**: the [`pipeline::ArchiveScanner`] entry point

pub mod classfile;
pub mod config;
pub mod container;
pub mod extract;
pub mod manifest;
pub mod pipeline;
pub mod reconcile;

pub use classfile::{ClassParseError, ConstantPoolReader, ParsedClass};
pub use config::{ConfigError, ScanConfig};
pub use container::{ArchiveMember, ContainerError, ContainerReader};
pub use extract::{extract_symbols, MemberError};
pub use manifest::{Attributes, Manifest, ManifestError, ManifestSummary};
pub use pipeline::{ArchiveScanner, ScanError, ScanOutcome, ScanStats};
pub use reconcile::{package_of, Reconciled, Reconciler};
