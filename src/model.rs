use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::scan::reconcile::Reconciled;

/// Where an archive lives on disk and which version its manifest claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub path: PathBuf,
    pub version: Option<String>,
}

impl Location {
    pub fn new(path: impl Into<PathBuf>, version: Option<String>) -> Self {
        Self {
            path: path.into(),
            version,
        }
    }
}

/// Symbols extracted from a single compiled class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolRecord {
    pub qualified_name: String,
    pub serial_marker: Option<i64>,
    pub references: BTreeSet<String>,
}

/// Dependency fingerprint of one scanned archive.
///
/// All collections are ordered, so two scans of the same file compare equal
/// and serialize identically regardless of member order inside the zip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Archive {
    name: String,
    manifest_lines: Vec<String>,
    requires: BTreeSet<String>,
    provides: BTreeMap<String, Option<i64>>,
    package_dependencies: BTreeMap<String, BTreeSet<String>>,
    location: Location,
}

impl Archive {
    /// Composes the final record from the scan's parts.
    pub fn assemble(
        name: impl Into<String>,
        manifest_lines: Vec<String>,
        reconciled: Reconciled,
        location: Location,
    ) -> Self {
        Self {
            name: name.into(),
            manifest_lines,
            requires: reconciled.requires,
            provides: reconciled.provides,
            package_dependencies: reconciled.package_dependencies,
            location,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn manifest_lines(&self) -> &[String] {
        &self.manifest_lines
    }

    pub fn requires(&self) -> &BTreeSet<String> {
        &self.requires
    }

    /// Provided class names mapped to their `serialVersionUID`, if declared.
    pub fn provides(&self) -> &BTreeMap<String, Option<i64>> {
        &self.provides
    }

    pub fn package_dependencies(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.package_dependencies
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn path(&self) -> &Path {
        &self.location.path
    }

    pub fn version(&self) -> Option<&str> {
        self.location.version.as_deref()
    }

    pub fn does_provide(&self, symbol: &str) -> bool {
        self.provides.contains_key(symbol)
    }
}
