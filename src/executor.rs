use crate::model::Archive;
use crate::registry::ProvidesRegistry;
use crate::scan::pipeline::ArchiveScanner;
use crate::traits::{ClassFormatReader, KnownArchives};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, instrument, warn};

/// Runs single-archive scans concurrently on the blocking pool.
///
/// Scans share one [`ProvidesRegistry`]; each scan stays sequential.
pub struct ScanExecutor {
    semaphore: Arc<Semaphore>,
}

impl ScanExecutor {
    pub fn new(concurrency_limit: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(concurrency_limit.max(1))),
        }
    }

    /// Scans every path and returns the archives that scanned, in input order.
    ///
    /// `known` must be fully populated before the call; it is only read.
    #[instrument(skip_all, fields(archives = paths.len()))]
    pub async fn scan_all<R>(
        &self,
        scanner: Arc<ArchiveScanner<R>>,
        paths: Vec<PathBuf>,
        registry: Option<Arc<ProvidesRegistry>>,
        known: Option<Arc<Vec<Archive>>>,
    ) -> Vec<Archive>
    where
        R: ClassFormatReader + 'static,
    {
        let mut handles = Vec::with_capacity(paths.len());

        for path in paths {
            let semaphore = Arc::clone(&self.semaphore);
            let scanner = Arc::clone(&scanner);
            let registry = registry.clone();
            let known = known.clone();

            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                tokio::task::spawn_blocking(move || {
                    let known = known.as_deref().map(|k| k as &dyn KnownArchives);
                    scanner.scan(&path, registry.as_deref(), known)
                })
                .await
                .unwrap_or_else(|e| {
                    warn!(error = %e, "Scan task failed");
                    None
                })
            }));
        }

        let mut archives = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(Some(archive)) => archives.push(archive),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Scan task failed"),
            }
        }

        info!(scanned = archives.len(), "Finished scanning archives");
        archives
    }
}
