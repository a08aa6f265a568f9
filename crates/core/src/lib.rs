//! Core blockchain primitives for powchain.
//!
//! This crate provides the fundamental types used throughout the blockchain:
//! - Hashing, hex encoding and the difficulty prefix check
//! - ECDSA keys, signatures and addresses
//! - UTXO transactions
//! - Blocks and block headers
//! - Merkle roots

pub mod block;
pub mod crypto;
pub mod hash;
pub mod merkle;
pub mod transaction;

// Re-export commonly used types at the crate root
pub use block::{hash_with_nonce, Block, BlockBody, BlockHeader, GENESIS_HASH};
pub use crypto::{Address, CryptoError, Keypair, PublicKey, Signature};
pub use hash::{
    check_prefix, decode_hex, encode_hex, leading_zero_bits, sha256, sha256_concat, Hash, H256,
};
pub use merkle::merkle_root;
pub use transaction::{
    Transaction, TransactionError, TxInput, TxOutput, UTxOutput, COINBASE_SENTINEL,
    PRIVILEGED_CHALLENGE, PRIVILEGED_SENTINEL,
};
