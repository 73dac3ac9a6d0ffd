//! Catalog watcher - keeps the library in step with its manifest file
//!
//! Edits found on reload are staged on an auto-committing transaction, so
//! they reach clients on the configured interval or once enough of them
//! pile up. Long-polling clients are woken by those commits.

use crate::error::{Result, ServerError};
use crate::manifest::{Manifest, ManifestSummary};
use crate::services::FileSongSource;
use notify::{EventKind, RecursiveMode};
use notify_debouncer_full::{new_debouncer, DebounceEventResult};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tuneshare_catalog::{AutoCommitConfig, AutoCommitTransaction, Library};

/// Default debounce duration in milliseconds
const DEFAULT_DEBOUNCE_MS: u64 = 500;

pub struct CatalogWatcher {
    manifest: PathBuf,
    library: Library,
    songs: Arc<FileSongSource>,
    edits: AutoCommitTransaction,
    debounce: Duration,
}

impl CatalogWatcher {
    /// Create a watcher for `manifest`; needs a running tokio runtime
    pub fn new(
        manifest: impl Into<PathBuf>,
        library: Library,
        songs: Arc<FileSongSource>,
        config: AutoCommitConfig,
    ) -> Result<Self> {
        let edits = library.auto_commit(config)?;
        Ok(Self {
            manifest: manifest.into(),
            library,
            songs,
            edits,
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
        })
    }

    /// Set how long file events settle before a reload
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// The transaction reloads stage their edits on
    pub fn edits(&self) -> &AutoCommitTransaction {
        &self.edits
    }

    /// Re-read the manifest and stage the differences
    pub async fn reload(&self) -> Result<ManifestSummary> {
        let manifest = Manifest::load(&self.manifest).await?;

        // the snapshot must include the previous reload's edits
        self.edits.commit()?;

        let mut edits = self.edits.clone();
        let summary = manifest.sync(&self.library, &self.songs, &mut edits).await?;

        tracing::info!(
            pending = self.edits.pending(),
            added = summary.songs,
            updated = summary.updated,
            removed = summary.removed,
            skipped = summary.skipped,
            "Catalog manifest reloaded"
        );
        Ok(summary)
    }

    /// Reload on every change to the manifest file until `cancel` fires,
    /// then commit what is left
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let file_name = self
            .manifest
            .file_name()
            .map(|name| name.to_os_string())
            .ok_or_else(|| {
                ServerError::Watcher(format!("manifest path {:?} has no file name", self.manifest))
            })?;
        // editors replace files, so the directory is watched
        let dir = match self.manifest.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (changed_tx, mut changed_rx) = mpsc::channel(1);
        let mut debouncer = new_debouncer(
            self.debounce,
            None,
            move |result: DebounceEventResult| match result {
                Ok(events) => {
                    let touched = events.iter().any(|event| {
                        matches!(event.event.kind, EventKind::Create(_) | EventKind::Modify(_))
                            && event
                                .event
                                .paths
                                .iter()
                                .any(|p| p.file_name() == Some(file_name.as_os_str()))
                    });
                    if touched {
                        // a full channel already holds a pending reload
                        let _ = changed_tx.try_send(());
                    }
                }
                Err(errors) => {
                    for error in errors {
                        tracing::error!("Watcher error: {:?}", error);
                    }
                }
            },
        )
        .map_err(|e| ServerError::Watcher(format!("Failed to create debouncer: {}", e)))?;

        debouncer
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| ServerError::Watcher(format!("Failed to watch {}: {}", dir.display(), e)))?;
        tracing::info!(manifest = %self.manifest.display(), "Watching catalog manifest");

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                changed = changed_rx.recv() => {
                    if changed.is_none() {
                        break;
                    }
                    if let Err(e) = self.reload().await {
                        tracing::warn!(error = %e, "Catalog manifest reload failed");
                    }
                }
            }
        }

        drop(debouncer);
        let outcome = self.edits.close()?;
        tracing::debug!(revision = outcome.revision, "Catalog watcher stopped");
        Ok(())
    }
}

impl std::fmt::Debug for CatalogWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogWatcher")
            .field("manifest", &self.manifest)
            .field("debounce", &self.debounce)
            .field("edits", &self.edits)
            .finish_non_exhaustive()
    }
}
