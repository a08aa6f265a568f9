//! Consensus rules for powchain.
//!
//! This crate provides:
//! - Transaction validation (hash, ownership signatures, balance)
//! - Block validation (parent link, proof of work, merkle root, coinbase)
//! - A multi-threaded, cancellable proof-of-work nonce search
//!
//! # Example
//!
//! ```rust,no_run
//! use powchain_consensus::{CancelToken, CpuMiner, NonceSearch, PowConfig};
//! use powchain_core::{Block, Hash, Keypair};
//!
//! let miner = Keypair::generate();
//! let mut block = Block::new(miner.address(), vec![], Hash::ZERO, 16, 10).unwrap();
//!
//! let search = CpuMiner::new(PowConfig::default());
//! let solution = search
//!     .search(&block.header.make_hash_input(), 16, &CancelToken::new())
//!     .unwrap();
//! block.seal(solution.nonce, solution.hash);
//! ```

pub mod pow;
pub mod validator;

// Re-export commonly used types
pub use pow::{BatchAllocator, CancelToken, CpuMiner, NonceSearch, PowConfig, PowError, Solution};
pub use validator::{
    BlockRules, BlockValidator, TransactionLookup, TransactionValidator, TxKind, ValidationError,
};
