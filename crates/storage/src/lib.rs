//! Persistent storage layer for powchain.
//!
//! This crate provides the storage backend for the blockchain:
//! - Transaction records (unspent and partially spent)
//! - Block headers and stripped bodies
//! - The pending transaction pool
//! - Atomic commits spanning all of the above
//!
//! # Layout
//!
//! ```text
//!   Ledger / Mempool
//!         │  typed access            atomic block commit
//!         ▼                                   │
//!  ┌────────────┐ ┌────────────┐              │
//!  │  TxStore   │ │ ChainStore │   Vec<BatchOp>
//!  └─────┬──────┘ └─────┬──────┘              │
//!        ▼              ▼                     ▼
//!  ┌──────────────────────────────────────────────────┐
//!  │ Storage: one sled tree per Store                 │
//!  │  transactions │ headers │ bodies │ mempool       │
//!  │  keys: lowercase hex hash, values: bincode       │
//!  └──────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use powchain_storage::{ChainStore, Storage, TxStore};
//! use powchain_core::{Block, Hash, Transaction, Keypair};
//!
//! let storage = Storage::open("./blockchain_data").unwrap();
//!
//! let chain = ChainStore::new(&storage);
//! chain.put_header(&Block::genesis().header).unwrap();
//!
//! let txs = TxStore::new(&storage);
//! let reward = Transaction::coinbase(Keypair::generate().address(), 10, &Hash::ZERO).unwrap();
//! txs.put(&reward).unwrap();
//! ```

pub mod chain;
pub mod db;
pub mod state;

// Re-export commonly used types
pub use chain::ChainStore;
pub use db::{BatchOp, Result, Storage, StorageError, Store};
pub use state::TxStore;
