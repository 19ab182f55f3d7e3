//! Transactions and snapshot visibility for catalog entries.
//!
//! Every registry version records the id of the transaction that wrote it.
//! A version is visible to a transaction when the transaction wrote it
//! itself, or when the writer committed at or before the reader's start
//! timestamp. Rolled-back writers are simply never visible, so no undo work
//! is needed on abort.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::Error;

/// Transaction identifier.
pub type TxId = u64;

/// Position on the logical commit clock.
pub type Timestamp = u64;

/// Writer id used for bootstrap entries; always committed at timestamp 0.
pub const SYSTEM_TXID: TxId = 0;

/// Lifecycle state of a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxnStatus {
    InProgress,
    Committed { commit_ts: Timestamp },
    Aborted,
}

/// Allocates transactions and tracks their outcome.
#[derive(Debug)]
pub struct TransactionManager {
    next_txid: AtomicU64,
    clock: AtomicU64,
    // orders snapshot reads against commit stamping
    commit_lock: Mutex<()>,
    // never evicted so versions can't reference an unknown writer
    statuses: DashMap<TxId, TxnStatus>,
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionManager {
    /// Create a manager with only the system transaction registered.
    pub fn new() -> Self {
        let statuses = DashMap::new();
        statuses.insert(SYSTEM_TXID, TxnStatus::Committed { commit_ts: 0 });
        Self {
            next_txid: AtomicU64::new(SYSTEM_TXID),
            clock: AtomicU64::new(0),
            commit_lock: Mutex::new(()),
            statuses,
        }
    }

    /// Start a new transaction whose snapshot is the current commit clock.
    pub fn begin(self: &Arc<Self>) -> Transaction {
        let id = self.next_txid.fetch_add(1, Ordering::SeqCst) + 1;
        self.statuses.insert(id, TxnStatus::InProgress);
        let start_ts = {
            let _guard = self.commit_lock.lock();
            self.clock.load(Ordering::SeqCst)
        };
        debug!(txid = id, start_ts, "transaction started");
        Transaction {
            id,
            start_ts,
            invalidated: AtomicBool::new(false),
            manager: Arc::clone(self),
        }
    }

    /// Commit a transaction, returning its commit timestamp.
    ///
    /// A transaction invalidated by an earlier failure is rolled back instead
    /// and the call returns an error.
    pub fn commit(&self, tx: &Transaction) -> Result<Timestamp, Error> {
        self.ensure_active(tx)?;
        if tx.is_invalidated() {
            self.statuses.insert(tx.id, TxnStatus::Aborted);
            debug!(txid = tx.id, "invalidated transaction rolled back on commit");
            return Err(Error::Transaction(format!(
                "transaction {} was aborted by an earlier error and has been rolled back",
                tx.id
            )));
        }
        let commit_ts = {
            let _guard = self.commit_lock.lock();
            let commit_ts = self.clock.fetch_add(1, Ordering::SeqCst) + 1;
            self.statuses.insert(tx.id, TxnStatus::Committed { commit_ts });
            commit_ts
        };
        debug!(txid = tx.id, commit_ts, "transaction committed");
        Ok(commit_ts)
    }

    /// Roll back a transaction. Its versions become permanently invisible.
    pub fn rollback(&self, tx: &Transaction) -> Result<(), Error> {
        self.ensure_active(tx)?;
        self.statuses.insert(tx.id, TxnStatus::Aborted);
        debug!(txid = tx.id, "transaction rolled back");
        Ok(())
    }

    /// Status of a transaction id, if known.
    pub fn status(&self, txid: TxId) -> Option<TxnStatus> {
        self.statuses.get(&txid).map(|entry| *entry)
    }

    /// Whether the writer was rolled back.
    pub fn is_aborted(&self, txid: TxId) -> bool {
        matches!(self.status(txid), Some(TxnStatus::Aborted))
    }

    fn ensure_active(&self, tx: &Transaction) -> Result<(), Error> {
        match self.status(tx.id) {
            Some(TxnStatus::InProgress) => Ok(()),
            Some(status) => Err(Error::Transaction(format!(
                "transaction {} is no longer active ({status:?})",
                tx.id
            ))),
            None => Err(Error::Transaction(format!("unknown transaction {}", tx.id))),
        }
    }
}

/// A transaction handle carrying its snapshot identity.
pub struct Transaction {
    id: TxId,
    start_ts: Timestamp,
    invalidated: AtomicBool,
    manager: Arc<TransactionManager>,
}

impl Transaction {
    /// Transaction id, stamped on every version this transaction writes.
    pub fn id(&self) -> TxId {
        self.id
    }

    /// Commit clock value the snapshot was taken at.
    pub fn start_ts(&self) -> Timestamp {
        self.start_ts
    }

    /// The manager that issued this transaction.
    pub fn manager(&self) -> &Arc<TransactionManager> {
        &self.manager
    }

    /// Whether the transaction is still in progress.
    pub fn is_active(&self) -> bool {
        matches!(self.manager.status(self.id), Some(TxnStatus::InProgress))
    }

    /// Mark the transaction as failed; it can only be rolled back from now on.
    pub fn invalidate(&self) {
        self.invalidated.store(true, Ordering::SeqCst);
    }

    /// Whether an earlier operation failed inside this transaction.
    pub fn is_invalidated(&self) -> bool {
        self.invalidated.load(Ordering::SeqCst)
    }

    /// Whether a version written by `writer` belongs to this snapshot.
    pub fn sees(&self, writer: TxId) -> bool {
        if writer == self.id {
            return true;
        }
        match self.manager.status(writer) {
            Some(TxnStatus::Committed { commit_ts }) => commit_ts <= self.start_ts,
            _ => false,
        }
    }

    /// Whether overwriting a version written by `writer` would race another
    /// transaction: the writer is neither us, nor visible, nor rolled back.
    pub(crate) fn conflicts_with(&self, writer: TxId) -> bool {
        !self.sees(writer) && !self.manager.is_aborted(writer)
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("start_ts", &self.start_ts)
            .field("invalidated", &self.is_invalidated())
            .finish()
    }
}
