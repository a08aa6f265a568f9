//! Block header and body structures.

use crate::crypto::Address;
use crate::hash::Hash;
use crate::merkle::merkle_root;
use crate::transaction::{Result, Transaction};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// `curHash` of the genesis block and `prevHash` of the first mined block.
pub const GENESIS_HASH: Hash = Hash::ZERO;

/// The header of a block containing metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Proof-of-work hash of this header.
    #[serde(rename = "curHash")]
    pub cur_hash: Hash,
    /// Hash of the previous block.
    #[serde(rename = "prevHash")]
    pub prev_hash: Hash,
    /// Merkle root over `[coinbase, tx_1..tx_n]`.
    #[serde(rename = "dataHash")]
    pub data_hash: Hash,
    /// Number of leading zero bits `cur_hash` must have.
    pub difficulty: u8,
    pub nonce: u64,
    pub timestamp: DateTime<Utc>,
}

impl BlockHeader {
    /// `prevHash || dataHash || timestamp_ns_LE || difficulty`.
    ///
    /// The nonce is appended by the caller, so the same buffer is reused for
    /// every attempt of a nonce search.
    pub fn make_hash_input(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(32 + 32 + 8 + 1);
        buf.extend_from_slice(self.prev_hash.as_bytes());
        buf.extend_from_slice(self.data_hash.as_bytes());
        // Out-of-range timestamps are rejected by block validation.
        let nanos = self.timestamp_nanos().unwrap_or_default();
        buf.extend_from_slice(&nanos.to_le_bytes());
        buf.push(self.difficulty);
        buf
    }

    /// `SHA256(make_hash_input() || nonce_LE)`.
    pub fn make_hash(&self) -> Hash {
        hash_with_nonce(&self.make_hash_input(), self.nonce)
    }

    /// Nanoseconds since the Unix epoch, `None` outside the `i64` range
    /// (roughly years 1677 to 2262).
    pub fn timestamp_nanos(&self) -> Option<i64> {
        self.timestamp.timestamp_nanos_opt()
    }

    /// Whether `cur_hash` satisfies the header's difficulty.
    pub fn meets_difficulty(&self) -> bool {
        self.cur_hash.meets_difficulty(self.difficulty)
    }
}

/// Hash a nonce-less header input with a nonce.
pub fn hash_with_nonce(hash_input: &[u8], nonce: u64) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(hash_input);
    hasher.update(nonce.to_le_bytes());
    Hash(hasher.finalize().into())
}

/// The transactions of a block.
///
/// A block travelling between nodes embeds its transactions; a stored body
/// keeps only the hash references and points into the transaction store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockBody {
    #[serde(rename = "coinbaseTxHash", default)]
    pub coinbase_tx_hash: Option<Hash>,
    #[serde(rename = "txHashes", default)]
    pub tx_hashes: Vec<Hash>,
    #[serde(rename = "coinbaseTx", default)]
    pub coinbase_tx: Option<Transaction>,
    #[serde(default)]
    pub txs: Vec<Transaction>,
}

impl BlockBody {
    /// Whether the transaction payloads are embedded.
    pub fn has_payloads(&self) -> bool {
        self.coinbase_tx.is_some()
    }

    /// Merkle leaves in order: coinbase first, then ordinary transactions.
    pub fn leaf_hashes(&self) -> Vec<Hash> {
        if let Some(coinbase) = &self.coinbase_tx {
            std::iter::once(coinbase.hash)
                .chain(self.txs.iter().map(|tx| tx.hash))
                .collect()
        } else {
            self.coinbase_tx_hash
                .iter()
                .chain(self.tx_hashes.iter())
                .copied()
                .collect()
        }
    }

    /// Compact form for persistence: hash references only.
    pub fn stripped(&self) -> BlockBody {
        if !self.has_payloads() {
            return self.clone();
        }
        BlockBody {
            coinbase_tx_hash: self.coinbase_tx.as_ref().map(|tx| tx.hash),
            tx_hashes: self.txs.iter().map(|tx| tx.hash).collect(),
            coinbase_tx: None,
            txs: Vec::new(),
        }
    }

    /// Embedded transactions, coinbase first.
    pub fn transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.coinbase_tx.iter().chain(self.txs.iter())
    }

    /// Number of ordinary (non-coinbase) transactions.
    pub fn tx_count(&self) -> usize {
        if self.has_payloads() {
            self.txs.len()
        } else {
            self.tx_hashes.len()
        }
    }
}

/// A complete block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub body: BlockBody,
}

impl Block {
    /// Assemble a block skeleton paying `reward_per_tx` per included
    /// transaction to `miner`.
    ///
    /// `nonce` and `cur_hash` are left unset; see [`Block::seal`].
    pub fn new(
        miner: Address,
        txs: Vec<Transaction>,
        prev_hash: Hash,
        difficulty: u8,
        reward_per_tx: u64,
    ) -> Result<Self> {
        let reward = reward_per_tx.saturating_mul(txs.len() as u64);
        let coinbase = Transaction::coinbase(miner, reward, &prev_hash)?;

        let body = BlockBody {
            coinbase_tx_hash: Some(coinbase.hash),
            tx_hashes: txs.iter().map(|tx| tx.hash).collect(),
            coinbase_tx: Some(coinbase),
            txs,
        };

        let header = BlockHeader {
            cur_hash: Hash::ZERO,
            prev_hash,
            data_hash: merkle_root(&body.leaf_hashes()),
            difficulty,
            nonce: 0,
            timestamp: Utc::now(),
        };

        Ok(Self { header, body })
    }

    /// The root of every chain.
    pub fn genesis() -> Self {
        Self {
            header: BlockHeader {
                cur_hash: GENESIS_HASH,
                prev_hash: GENESIS_HASH,
                data_hash: Hash::ZERO,
                difficulty: 0,
                nonce: 0,
                timestamp: DateTime::<Utc>::UNIX_EPOCH,
            },
            body: BlockBody::default(),
        }
    }

    /// Get the block hash.
    pub fn hash(&self) -> Hash {
        self.header.cur_hash
    }

    /// Check if this is the genesis block.
    pub fn is_genesis(&self) -> bool {
        self.header.cur_hash == GENESIS_HASH
    }

    /// Fill in the proof-of-work result.
    pub fn seal(&mut self, nonce: u64, hash: Hash) {
        self.header.nonce = nonce;
        self.header.cur_hash = hash;
    }

    /// Recompute the merkle root from the body and compare it to the header.
    pub fn validate_data_hash(&self) -> bool {
        merkle_root(&self.body.leaf_hashes()) == self.header.data_hash
    }

    /// Wire form: embedded transactions without the redundant hash lists.
    pub fn without_references(mut self) -> Self {
        if self.body.has_payloads() {
            self.body.coinbase_tx_hash = None;
            self.body.tx_hashes.clear();
        }
        self
    }
}
