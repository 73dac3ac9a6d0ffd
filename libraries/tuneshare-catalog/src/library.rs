//! The library: the single source of committed catalog state
//!
//! Readers take an `Arc<Catalog>` snapshot; the read lock is held only for
//! the `Arc` clone. Writers go through [`Library::commit_operations`], which
//! serializes commits on a mutex, builds the next snapshot off to the side
//! and swaps it in before publishing the new revision.

use crate::auto_commit::{AutoCommitConfig, AutoCommitTransaction};
use crate::catalog::Catalog;
use crate::error::Result;
use crate::operation::Operation;
use crate::transaction::{CommitOutcome, Immediate, Transaction};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Shared handle to a revisioned catalog
#[derive(Clone)]
pub struct Library {
    inner: Arc<LibraryInner>,
}

struct LibraryInner {
    current: RwLock<Arc<Catalog>>,
    commit_lock: Mutex<()>,
    revision_tx: watch::Sender<u32>,
}

impl Library {
    /// Create an empty library at the initial revision
    pub fn new(name: impl Into<String>) -> Self {
        let catalog = Catalog::new(name);
        let (revision_tx, _) = watch::channel(catalog.revision());
        Self {
            inner: Arc::new(LibraryInner {
                current: RwLock::new(Arc::new(catalog)),
                commit_lock: Mutex::new(()),
                revision_tx,
            }),
        }
    }

    /// Current committed snapshot
    pub fn snapshot(&self) -> Arc<Catalog> {
        Arc::clone(&self.inner.current.read())
    }

    pub fn revision(&self) -> u32 {
        self.inner.current.read().revision()
    }

    pub fn name(&self) -> String {
        self.inner.current.read().name().to_owned()
    }

    /// Receiver that observes every published revision
    pub fn subscribe(&self) -> watch::Receiver<u32> {
        self.inner.revision_tx.subscribe()
    }

    /// Start an explicit transaction
    pub fn transaction(&self) -> Transaction {
        Transaction::new(self.clone())
    }

    /// Staging target that commits each operation on its own
    pub fn immediate(&self) -> Immediate {
        Immediate::new(self.clone())
    }

    /// Start an auto-committing transaction on the current tokio runtime
    pub fn auto_commit(&self, config: AutoCommitConfig) -> Result<AutoCommitTransaction> {
        AutoCommitTransaction::new(self.clone(), config)
    }

    /// Whether two handles refer to the same library
    pub fn ptr_eq(&self, other: &Library) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Commit a batch atomically.
    ///
    /// Either every operation is applied and at most one new revision is
    /// published, or an error is returned and the committed state is unchanged.
    pub(crate) fn commit_operations(&self, ops: Vec<Operation>) -> Result<CommitOutcome> {
        let _guard = self.inner.commit_lock.lock();

        let mut next = self.snapshot();
        let staged = ops.len();
        let applied = Arc::make_mut(&mut next).apply_all(ops).map_err(|e| {
            tracing::warn!(error = %e, staged, "Commit failed, discarding staged operations");
            e
        })?;

        let revision = next.revision();
        if applied == 0 {
            tracing::debug!(revision, staged, "Commit had no effect");
            return Ok(CommitOutcome {
                revision,
                changed: false,
                applied,
            });
        }

        *self.inner.current.write() = next;
        self.inner.revision_tx.send_replace(revision);
        tracing::debug!(revision, staged, applied, "Committed catalog revision");

        Ok(CommitOutcome {
            revision,
            changed: true,
            applied,
        })
    }
}

impl fmt::Debug for Library {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Library")
            .field("revision", &self.revision())
            .finish_non_exhaustive()
    }
}
