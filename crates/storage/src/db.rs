//! sled database wrapper with serialization helpers.

use powchain_core::Hash;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{ConflictableTransactionError, TransactionError, Transactional};
use sled::{Db, Tree};
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Storage errors.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Key not found in {store}: {key}")]
    NotFound { store: Store, key: String },

    #[error("Batch commit aborted")]
    Aborted,
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// The named stores of the database, one sled tree each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Store {
    /// Transaction records by hash.
    Transactions,
    /// Block headers by `curHash`.
    Headers,
    /// Stripped block bodies by `curHash`.
    Bodies,
    /// Pending transactions by hash.
    Mempool,
}

impl Store {
    pub const ALL: [Store; 4] = [
        Store::Transactions,
        Store::Headers,
        Store::Bodies,
        Store::Mempool,
    ];

    fn tree_name(self) -> &'static str {
        match self {
            Store::Transactions => "transactions",
            Store::Headers => "headers",
            Store::Bodies => "bodies",
            Store::Mempool => "mempool",
        }
    }
}

impl fmt::Display for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tree_name())
    }
}

/// Wrapper around sled database with serialization helpers.
pub struct Storage {
    db: Db,
    transactions: Tree,
    headers: Tree,
    bodies: Tree,
    mempool: Tree,
}

impl Storage {
    /// Open a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_db(sled::open(path)?)
    }

    /// Open an in-memory database (for testing).
    pub fn open_temporary() -> Result<Self> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: Db) -> Result<Self> {
        Ok(Self {
            transactions: db.open_tree(Store::Transactions.tree_name())?,
            headers: db.open_tree(Store::Headers.tree_name())?,
            bodies: db.open_tree(Store::Bodies.tree_name())?,
            mempool: db.open_tree(Store::Mempool.tree_name())?,
            db,
        })
    }

    fn tree(&self, store: Store) -> &Tree {
        match store {
            Store::Transactions => &self.transactions,
            Store::Headers => &self.headers,
            Store::Bodies => &self.bodies,
            Store::Mempool => &self.mempool,
        }
    }

    /// Store a serializable value.
    pub fn put<K, V>(&self, store: Store, key: K, value: &V) -> Result<()>
    where
        K: AsRef<[u8]>,
        V: Serialize,
    {
        let encoded = bincode::serialize(value)?;
        self.tree(store).insert(key, encoded)?;
        Ok(())
    }

    /// Retrieve and deserialize a value.
    pub fn get<K, V>(&self, store: Store, key: K) -> Result<Option<V>>
    where
        K: AsRef<[u8]>,
        V: DeserializeOwned,
    {
        match self.tree(store).get(key)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Retrieve a value, returning error if not found.
    pub fn get_or_err<K, V>(&self, store: Store, key: K) -> Result<V>
    where
        K: AsRef<[u8]>,
        V: DeserializeOwned,
    {
        self.get(store, key.as_ref())?
            .ok_or_else(|| StorageError::NotFound {
                store,
                key: String::from_utf8_lossy(key.as_ref()).into_owned(),
            })
    }

    /// Delete a key.
    pub fn delete<K: AsRef<[u8]>>(&self, store: Store, key: K) -> Result<()> {
        self.tree(store).remove(key)?;
        Ok(())
    }

    /// Check if a key exists.
    pub fn contains<K: AsRef<[u8]>>(&self, store: Store, key: K) -> Result<bool> {
        Ok(self.tree(store).contains_key(key)?)
    }

    /// Deserialize every value of a store, in key order.
    pub fn scan_all<V: DeserializeOwned>(&self, store: Store) -> Result<Vec<V>> {
        self.tree(store)
            .iter()
            .values()
            .map(|value| Ok(bincode::deserialize(&value?)?))
            .collect()
    }

    /// Number of entries in a store.
    pub fn len(&self, store: Store) -> usize {
        self.tree(store).len()
    }

    /// Whether a store has no entries.
    pub fn is_empty(&self, store: Store) -> bool {
        self.tree(store).is_empty()
    }

    /// Apply a batch of operations across all stores atomically.
    ///
    /// The batch runs inside one sled multi-tree transaction: either every
    /// operation becomes visible or none does.
    pub fn commit(&self, operations: Vec<BatchOp>) -> Result<()> {
        let result: std::result::Result<(), TransactionError<()>> = (
            &self.transactions,
            &self.headers,
            &self.bodies,
            &self.mempool,
        )
            .transaction(|(transactions, headers, bodies, mempool)| {
                for op in &operations {
                    let tree = match op.store() {
                        Store::Transactions => transactions,
                        Store::Headers => headers,
                        Store::Bodies => bodies,
                        Store::Mempool => mempool,
                    };
                    match op {
                        BatchOp::Insert { key, value, .. } => {
                            tree.insert(key.as_slice(), value.as_slice())?;
                        }
                        BatchOp::Remove { key, .. } => {
                            tree.remove(key.as_slice())?;
                        }
                    }
                }
                Ok::<(), ConflictableTransactionError<()>>(())
            });

        result.map_err(|err| match err {
            TransactionError::Abort(()) => StorageError::Aborted,
            TransactionError::Storage(err) => StorageError::Database(err),
        })
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    // =========================================================================
    // Key Construction Helpers
    // =========================================================================

    /// Key of a hash-addressed record: the lowercase hex of the hash.
    pub fn hash_key(hash: &Hash) -> Vec<u8> {
        hash.to_hex().into_bytes()
    }
}

/// Batch operation for atomic updates.
#[derive(Debug, Clone)]
pub enum BatchOp {
    Insert {
        store: Store,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    Remove {
        store: Store,
        key: Vec<u8>,
    },
}

impl BatchOp {
    /// Encode `value` into an insert operation.
    pub fn insert<V: Serialize>(store: Store, key: Vec<u8>, value: &V) -> Result<Self> {
        Ok(BatchOp::Insert {
            store,
            key,
            value: bincode::serialize(value)?,
        })
    }

    pub fn remove(store: Store, key: Vec<u8>) -> Self {
        BatchOp::Remove { store, key }
    }

    /// The store this operation targets.
    pub fn store(&self) -> Store {
        match self {
            BatchOp::Insert { store, .. } | BatchOp::Remove { store, .. } => *store,
        }
    }
}
