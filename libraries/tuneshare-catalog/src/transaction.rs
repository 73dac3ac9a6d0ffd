//! Explicit transactions and immediate staging

use crate::error::{CatalogError, Result};
use crate::library::Library;
use crate::operation::{Mutate, Operation};

/// Lifecycle of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Open,
    Committed,
    RolledBack,
}

/// Result of a commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitOutcome {
    /// Library revision after the commit
    pub revision: u32,
    /// Whether the revision advanced
    pub changed: bool,
    /// Operations that had an effect
    pub applied: usize,
}

/// A batch of operations committed atomically.
///
/// Dropping an open transaction rolls it back.
#[derive(Debug)]
pub struct Transaction {
    library: Library,
    staged: Vec<Operation>,
    state: TransactionState,
}

impl Transaction {
    pub(crate) fn new(library: Library) -> Self {
        Self {
            library,
            staged: Vec::new(),
            state: TransactionState::Open,
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == TransactionState::Open
    }

    /// Number of staged operations
    pub fn len(&self) -> usize {
        self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    pub fn library(&self) -> &Library {
        &self.library
    }

    /// Apply every staged operation as one revision.
    ///
    /// On error the staged operations are discarded and the transaction is
    /// rolled back.
    pub fn commit(&mut self) -> Result<CommitOutcome> {
        self.ensure_open()?;
        let staged = std::mem::take(&mut self.staged);
        match self.library.commit_operations(staged) {
            Ok(outcome) => {
                self.state = TransactionState::Committed;
                Ok(outcome)
            }
            Err(e) => {
                self.state = TransactionState::RolledBack;
                Err(e)
            }
        }
    }

    /// Discard every staged operation
    pub fn rollback(&mut self) -> Result<()> {
        self.ensure_open()?;
        let discarded = self.staged.len();
        self.staged.clear();
        self.state = TransactionState::RolledBack;
        tracing::debug!(discarded, "Transaction rolled back");
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state {
            TransactionState::Open => Ok(()),
            state => Err(CatalogError::TransactionClosed(state)),
        }
    }
}

impl Mutate for Transaction {
    fn stage(&mut self, op: Operation) -> Result<()> {
        self.ensure_open()?;
        self.staged.push(op);
        Ok(())
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.state == TransactionState::Open && !self.staged.is_empty() {
            tracing::debug!(
                discarded = self.staged.len(),
                "Open transaction dropped, rolling back"
            );
        }
    }
}

/// Commits every staged operation on its own
#[derive(Debug)]
pub struct Immediate {
    library: Library,
    last: Option<CommitOutcome>,
}

impl Immediate {
    pub(crate) fn new(library: Library) -> Self {
        Self { library, last: None }
    }

    /// Outcome of the most recent commit
    pub fn last_outcome(&self) -> Option<CommitOutcome> {
        self.last
    }
}

impl Mutate for Immediate {
    fn stage(&mut self, op: Operation) -> Result<()> {
        self.last = Some(self.library.commit_operations(vec![op])?);
        Ok(())
    }
}
