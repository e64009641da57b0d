//! Single-archive scan pipeline.
//!
//! [`ArchiveScanner`] runs the stages of one scan in order:
//! 1. **Container**: open the zip and enumerate class members
//! 2. **Extraction**: parse each class into a [`SymbolRecord`](crate::model::SymbolRecord)
//! 3. **Reconciliation**: fold records into provides, requires and package edges
//! 4. **Manifest**: resolve the version and manifest lines
//! 5. **Assembly**: build the immutable [`Archive`]
//!
//! The open container is owned by the scan call, so its file handle is
//! released on every return path.

use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::model::{Archive, Location};
use crate::registry::ProvidesRegistry;
use crate::scan::classfile::ConstantPoolReader;
use crate::scan::config::ScanConfig;
use crate::scan::container::{ContainerError, ContainerReader};
use crate::scan::extract::{extract_symbols, MemberError};
use crate::scan::manifest::summarize;
use crate::scan::reconcile::Reconciler;
use crate::traits::{ClassFormatReader, KnownArchives};

// ============================================================================
// Scan Types
// ============================================================================

/// Errors that end a scan without producing an archive.
#[derive(Error, Debug)]
pub enum ScanError {
    /// The file is not a zip container. Expected for most probed files.
    #[error("not an archive: {0}")]
    NotAContainer(#[source] ContainerError),

    /// The container opened but could not be read to the end.
    #[error("scan of '{path}' failed: {source}")]
    Unexpected {
        path: PathBuf,
        #[source]
        source: ContainerError,
    },
}

/// Counters for one scan.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanStats {
    /// Class members encountered
    pub classes_seen: usize,

    /// Class members that produced a symbol record
    pub classes_scanned: usize,

    /// Class members skipped because they could not be read or parsed
    pub members_skipped: usize,

    /// Wall time of the scan (milliseconds)
    pub duration_ms: u64,
}

#[derive(Debug)]
pub struct ScanOutcome {
    pub archive: Archive,
    pub stats: ScanStats,
}

// ============================================================================
// Scanner
// ============================================================================

/// Scans one archive at a time.
///
/// The scanner holds no per-scan state and is `Send + Sync` whenever its
/// class reader is, so one instance can serve many concurrent scans.
///
/// # Example
///
/// ```ignore
/// use jar_fingerprint::{ArchiveScanner, ProvidesRegistry};
/// use std::path::Path;
///
/// let registry = ProvidesRegistry::new();
/// let scanner = ArchiveScanner::new();
/// if let Some(archive) = scanner.scan(Path::new("lib/commons-io.jar"), Some(&registry), None) {
///     println!("{} provides {} classes", archive.name(), archive.provides().len());
/// }
/// ```
#[derive(Debug, Clone)]
pub struct ArchiveScanner<R = ConstantPoolReader>
where
    R: ClassFormatReader,
{
    /// Class-format reader used for every class member
    reader: R,

    config: ScanConfig,
}

impl ArchiveScanner<ConstantPoolReader> {
    /// Creates a scanner with the bundled constant-pool reader and default
    /// configuration.
    pub fn new() -> Self {
        Self::with_reader(ConstantPoolReader)
    }
}

impl Default for ArchiveScanner<ConstantPoolReader> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> ArchiveScanner<R>
where
    R: ClassFormatReader,
{
    pub fn with_reader(reader: R) -> Self {
        Self {
            reader,
            config: ScanConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ScanConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Scans `path`, mapping every failure to `None`.
    ///
    /// Non-archives are skipped silently; any other failure is logged at
    /// `error` level.
    pub fn scan(
        &self,
        path: &Path,
        registry: Option<&ProvidesRegistry>,
        known: Option<&dyn KnownArchives>,
    ) -> Option<Archive> {
        match self.try_scan(path, registry, known) {
            Ok(outcome) => Some(outcome.archive),
            Err(ScanError::NotAContainer(reason)) => {
                debug!(path = %path.display(), reason = %reason, "Not an archive");
                None
            }
            Err(err) => {
                error!(path = %path.display(), error = %err, "Archive scan failed");
                None
            }
        }
    }

    /// Scans `path` and reports statistics alongside the archive.
    ///
    /// `registry` is only written after every member has been read, so a
    /// failed scan leaves it untouched. `known` is consulted read-only.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::NotAContainer`] if `path` is not a zip archive,
    /// and [`ScanError::Unexpected`] if the container file itself gives out
    /// mid-scan.
    /// Unparseable classes are not errors; they are counted in
    /// [`ScanStats::members_skipped`].
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn try_scan(
        &self,
        path: &Path,
        registry: Option<&ProvidesRegistry>,
        known: Option<&dyn KnownArchives>,
    ) -> Result<ScanOutcome, ScanError> {
        let start = Instant::now();

        let canonical = path.canonicalize().map_err(|e| {
            ScanError::NotAContainer(ContainerError::NotAnArchive {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
        })?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| canonical.display().to_string());

        let mut container = ContainerReader::open(&canonical, self.config.max_member_bytes)
            .map_err(ScanError::NotAContainer)?;

        // ====================================================================
        // Extraction and reconciliation
        // ====================================================================

        let mut reconciler = Reconciler::new(known);
        let mut classes_seen = 0;
        let suffix = self.config.class_suffix.as_str();

        for member in container.members(|member| member.ends_with(suffix)) {
            classes_seen += 1;
            let outcome = match member {
                Ok(member) => extract_symbols(&self.reader, &member.name, &member.bytes),
                Err(err) if err.is_member_local() => Err(MemberError::Container(err)),
                Err(err) => {
                    return Err(ScanError::Unexpected {
                        path: canonical,
                        source: err,
                    })
                }
            };
            reconciler.absorb(outcome);
        }

        // ====================================================================
        // Manifest
        // ====================================================================

        let manifest = container
            .manifest(&self.config.manifest_name)
            .unwrap_or_else(|err| {
                warn!(error = %err, "Cannot read manifest");
                None
            });
        drop(container);
        let summary = summarize(manifest.as_deref());

        // ====================================================================
        // Assembly
        // ====================================================================

        let classes_scanned = reconciler.records();
        let members_skipped = reconciler.skipped();
        let reconciled = reconciler.finish(&name, registry);

        let archive = Archive::assemble(
            name,
            summary.lines,
            reconciled,
            Location::new(canonical, summary.version),
        );

        let stats = ScanStats {
            classes_seen,
            classes_scanned,
            members_skipped,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            archive = archive.name(),
            classes = stats.classes_scanned,
            skipped = stats.members_skipped,
            provides = archive.provides().len(),
            requires = archive.requires().len(),
            version = archive.version().unwrap_or("-"),
            "Archive scanned"
        );

        Ok(ScanOutcome { archive, stats })
    }
}

// ============================================================================
// Tests
// ============================================================================
