//! Transaction record storage.
//!
//! Records are written when their block is applied. Spending an output either
//! tombstones it in place or, once every output is spent, removes the record.

use crate::db::{BatchOp, Result, Storage, Store};
use powchain_core::{Hash, Transaction};

/// Manages the stored transaction records.
pub struct TxStore<'a> {
    storage: &'a Storage,
}

impl<'a> TxStore<'a> {
    /// Create a new TxStore wrapping the given storage.
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    /// Store a transaction under its hash.
    pub fn put(&self, tx: &Transaction) -> Result<()> {
        self.storage
            .put(Store::Transactions, Storage::hash_key(&tx.hash), tx)
    }

    /// Get a transaction by hash.
    pub fn get(&self, hash: &Hash) -> Result<Option<Transaction>> {
        self.storage.get(Store::Transactions, Storage::hash_key(hash))
    }

    /// Check if a transaction record exists.
    pub fn contains(&self, hash: &Hash) -> Result<bool> {
        self.storage
            .contains(Store::Transactions, Storage::hash_key(hash))
    }

    /// Insert operation for a transaction record.
    pub fn insert_op(tx: &Transaction) -> Result<BatchOp> {
        BatchOp::insert(Store::Transactions, Storage::hash_key(&tx.hash), tx)
    }

    /// Remove operation for a transaction record.
    pub fn remove_op(hash: &Hash) -> BatchOp {
        BatchOp::remove(Store::Transactions, Storage::hash_key(hash))
    }
}
