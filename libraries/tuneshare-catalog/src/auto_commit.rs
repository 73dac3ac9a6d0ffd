//! Auto-committing transactions
//!
//! Staged operations collect in a shared pending list. They are committed
//! when the list reaches the configured threshold, on every tick of a
//! background interval, or explicitly. Whichever path wins takes the whole
//! pending list under the flush lock, so each operation is committed once.
//!
//! Lock order: `flush` before `pending`.

use crate::error::{CatalogError, Result};
use crate::library::Library;
use crate::operation::{Mutate, Operation};
use crate::transaction::{CommitOutcome, TransactionState};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoCommitConfig {
    /// Commit pending work this often
    pub interval: Duration,
    /// Commit as soon as this many operations are pending
    pub threshold: usize,
}

impl Default for AutoCommitConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            threshold: 256,
        }
    }
}

/// Cloneable handle to an auto-committing transaction
#[derive(Clone)]
pub struct AutoCommitTransaction {
    inner: Arc<Inner>,
}

struct Inner {
    library: Library,
    threshold: usize,
    pending: Mutex<Vec<Operation>>,
    flush: Mutex<()>,
    closed: AtomicBool,
    timer: CancellationToken,
}

impl AutoCommitTransaction {
    pub(crate) fn new(library: Library, config: AutoCommitConfig) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| CatalogError::NoRuntime)?;
        let inner = Arc::new(Inner {
            library,
            threshold: config.threshold.max(1),
            pending: Mutex::new(Vec::new()),
            flush: Mutex::new(()),
            closed: AtomicBool::new(false),
            timer: CancellationToken::new(),
        });

        runtime.spawn(run_timer(
            Arc::downgrade(&inner),
            inner.timer.clone(),
            config.interval,
        ));

        Ok(Self { inner })
    }

    pub fn state(&self) -> TransactionState {
        if self.inner.closed.load(Ordering::Acquire) {
            TransactionState::Committed
        } else {
            TransactionState::Open
        }
    }

    /// Number of operations waiting for the next commit
    pub fn pending(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Commit everything pending now
    pub fn commit(&self) -> Result<CommitOutcome> {
        self.ensure_open()?;
        self.inner.flush()
    }

    /// Discard everything pending; the transaction stays open
    pub fn rollback(&self) -> Result<usize> {
        self.ensure_open()?;
        let _flush = self.inner.flush.lock();
        let discarded = std::mem::take(&mut *self.inner.pending.lock()).len();
        tracing::debug!(discarded, "Auto-commit transaction rolled back pending work");
        Ok(discarded)
    }

    /// Commit remaining work and stop the timer
    pub fn close(&self) -> Result<CommitOutcome> {
        let _flush = self.inner.flush.lock();
        let ops = {
            let mut pending = self.inner.pending.lock();
            self.ensure_open()?;
            self.inner.closed.store(true, Ordering::Release);
            std::mem::take(&mut *pending)
        };
        self.inner.timer.cancel();
        self.inner.commit(ops)
    }

    /// Stage an operation, committing inline once the threshold is reached
    pub fn push(&self, op: Operation) -> Result<()> {
        let due = {
            let mut pending = self.inner.pending.lock();
            self.ensure_open()?;
            pending.push(op);
            pending.len() >= self.inner.threshold
        };
        if due {
            self.inner.flush()?;
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state() {
            TransactionState::Open => Ok(()),
            state => Err(CatalogError::TransactionClosed(state)),
        }
    }
}

impl Mutate for AutoCommitTransaction {
    fn stage(&mut self, op: Operation) -> Result<()> {
        self.push(op)
    }
}

impl std::fmt::Debug for AutoCommitTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoCommitTransaction")
            .field("state", &self.state())
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

impl Inner {
    fn flush(&self) -> Result<CommitOutcome> {
        let _flush = self.flush.lock();
        let ops = std::mem::take(&mut *self.pending.lock());
        self.commit(ops)
    }

    fn commit(&self, ops: Vec<Operation>) -> Result<CommitOutcome> {
        if ops.is_empty() {
            return Ok(CommitOutcome {
                revision: self.library.revision(),
                changed: false,
                applied: 0,
            });
        }
        self.library.commit_operations(ops)
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.timer.cancel();
        let dropped = self.pending.get_mut().len();
        if dropped > 0 {
            tracing::debug!(dropped, "Auto-commit transaction dropped with pending work");
        }
    }
}

async fn run_timer(inner: Weak<Inner>, cancel: CancellationToken, period: Duration) {
    let period = period.max(Duration::from_millis(1));
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let Some(inner) = inner.upgrade() else { break };
                if let Err(e) = inner.flush() {
                    tracing::warn!(error = %e, "Auto-commit failed");
                }
            }
        }
    }

    tracing::trace!("Auto-commit timer stopped");
}
