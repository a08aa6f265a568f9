//! Ledger orchestration for powchain.
//!
//! This crate brings together all components to run a single-node chain:
//! - **Ledger**: block application, unspent output queries, head resolution
//! - **Mempool**: persistent pool of pending transactions
//! - **Mining**: block assembly on top of the head plus proof-of-work search
//! - **Config**: chain parameters persisted as JSON
//!
//! # Example
//!
//! ```rust,no_run
//! use powchain_chain::{ChainConfig, Ledger};
//! use powchain_consensus::CancelToken;
//! use powchain_core::Keypair;
//! use powchain_storage::Storage;
//!
//! let storage = Storage::open("./blockchain_data").unwrap();
//!
//! let miner = Keypair::generate();
//! let config = ChainConfig {
//!     miner_address: Some(miner.address()),
//!     ..ChainConfig::default()
//! };
//! let ledger = Ledger::open(&storage, config).unwrap();
//!
//! // Mine an empty block on top of genesis.
//! let block = ledger.mine_block(&[], &CancelToken::new()).unwrap();
//! assert_eq!(ledger.head(), block.hash());
//! ```

pub mod config;
pub mod ledger;
pub mod mempool;

// Re-export commonly used types
pub use config::{ChainConfig, ConfigError};
pub use ledger::{Ledger, LedgerError};
pub use mempool::{Mempool, MempoolConfig, MempoolError};
