//! Transaction mempool for pending transactions.
//!
//! The mempool stores transactions waiting to be included in a block. It
//! lives in the `Mempool` store of the database, so pending transactions
//! survive a restart and leave the pool in the same atomic commit that
//! applies their block.

use powchain_core::{Hash, Transaction};
use powchain_storage::{BatchOp, Storage, StorageError, Store};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Errors that can occur during mempool operations.
#[derive(Debug, Error)]
pub enum MempoolError {
    #[error("transaction {0} already in mempool")]
    DuplicateTransaction(Hash),

    #[error("mempool is full (capacity: {0})")]
    MempoolFull(usize),

    #[error("transaction {0} not found in mempool")]
    TransactionNotFound(Hash),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type Result<T> = std::result::Result<T, MempoolError>;

/// Configuration for the mempool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MempoolConfig {
    /// Maximum number of transactions in the mempool.
    pub max_transactions: usize,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            max_transactions: 10_000,
        }
    }
}

/// Transaction mempool backed by storage.
pub struct Mempool<'a> {
    storage: &'a Storage,
    config: MempoolConfig,
}

impl<'a> Mempool<'a> {
    /// Create a mempool over the given storage.
    pub fn new(storage: &'a Storage, config: MempoolConfig) -> Self {
        Self { storage, config }
    }

    /// Get the number of transactions in the mempool.
    pub fn len(&self) -> usize {
        self.storage.len(Store::Mempool)
    }

    /// Check if the mempool is empty.
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty(Store::Mempool)
    }

    /// Check if a transaction is in the mempool.
    pub fn contains(&self, tx_hash: &Hash) -> Result<bool> {
        Ok(self
            .storage
            .contains(Store::Mempool, Storage::hash_key(tx_hash))?)
    }

    /// Get a transaction from the mempool.
    pub fn get(&self, tx_hash: &Hash) -> Result<Option<Transaction>> {
        Ok(self.storage.get(Store::Mempool, Storage::hash_key(tx_hash))?)
    }

    /// Add a transaction to the mempool.
    pub fn add(&self, tx: &Transaction) -> Result<()> {
        if self.contains(&tx.hash)? {
            return Err(MempoolError::DuplicateTransaction(tx.hash));
        }

        if self.len() >= self.config.max_transactions {
            return Err(MempoolError::MempoolFull(self.config.max_transactions));
        }

        self.storage
            .put(Store::Mempool, Storage::hash_key(&tx.hash), tx)?;
        debug!(tx = %tx.hash, "added transaction to mempool");
        Ok(())
    }

    /// Remove a transaction from the mempool.
    pub fn remove(&self, tx_hash: &Hash) -> Result<Transaction> {
        let tx = self
            .get(tx_hash)?
            .ok_or(MempoolError::TransactionNotFound(*tx_hash))?;
        self.storage
            .delete(Store::Mempool, Storage::hash_key(tx_hash))?;
        Ok(tx)
    }

    /// Fetch several transactions, failing on the first one missing.
    pub fn get_many(&self, tx_hashes: &[Hash]) -> Result<Vec<Transaction>> {
        tx_hashes
            .iter()
            .map(|hash| {
                self.get(hash)?
                    .ok_or(MempoolError::TransactionNotFound(*hash))
            })
            .collect()
    }

    /// Get up to `limit` pending transactions.
    pub fn get_pending(&self, limit: usize) -> Result<Vec<Transaction>> {
        let mut pending: Vec<Transaction> = self.storage.scan_all(Store::Mempool)?;
        pending.truncate(limit);
        Ok(pending)
    }

    /// Remove operation for use in an atomic commit.
    pub fn remove_op(tx_hash: &Hash) -> BatchOp {
        BatchOp::remove(Store::Mempool, Storage::hash_key(tx_hash))
    }
}
