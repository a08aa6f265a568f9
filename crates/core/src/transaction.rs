//! UTXO transactions: inputs, outputs, building and hashing.

use crate::crypto::{Address, CryptoError, Keypair, Signature};
use crate::hash::{sha256_concat, Hash};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// `txHash` of the single input of a coinbase transaction.
pub const COINBASE_SENTINEL: Hash = Hash::ZERO;

/// `txHash` of the single input of a privileged (minting) transaction.
pub const PRIVILEGED_SENTINEL: Hash = Hash([0xFF; 32]);

/// Message signed by the privileged key to mint coins.
pub const PRIVILEGED_CHALLENGE: &[u8] = b"powchain:privileged-mint:v1";

/// Errors that can occur during transaction operations.
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("insufficient funds (required {required}, available {available})")]
    InsufficientFunds { required: u64, available: u64 },

    #[error("amount overflow")]
    AmountOverflow,

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

pub type Result<T> = std::result::Result<T, TransactionError>;

/// Reference to a specific output of a prior transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    #[serde(rename = "txHash")]
    pub tx_hash: Hash,
    #[serde(rename = "outIdx")]
    pub out_idx: u16,
    #[serde(rename = "sig")]
    pub signature: Signature,
}

impl TxInput {
    /// Bytes the owner signs to spend the referenced output.
    pub fn signing_bytes(tx_hash: &Hash, out_idx: u16) -> Vec<u8> {
        let mut data = Vec::with_capacity(34);
        data.extend_from_slice(tx_hash.as_bytes());
        data.extend_from_slice(&out_idx.to_le_bytes());
        data
    }

    /// The bytes this input's signature covers.
    pub fn data_bytes(&self) -> Vec<u8> {
        Self::signing_bytes(&self.tx_hash, self.out_idx)
    }
}

/// Value assigned to an owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub addr: Address,
    pub amount: u64,
}

impl TxOutput {
    pub fn new(addr: Address, amount: u64) -> Self {
        Self { addr, amount }
    }

    /// Whether this output was consumed while siblings remain unspent.
    pub fn is_spent(&self) -> bool {
        self.addr.is_tombstone()
    }
}

/// A currently unspent output owned by some address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UTxOutput {
    #[serde(rename = "txHash")]
    pub tx_hash: Hash,
    #[serde(rename = "outIdx")]
    pub out_idx: u16,
    pub amount: u64,
}

/// A transaction on the blockchain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: Hash,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

impl Transaction {
    /// Create a transaction and compute its hash.
    pub fn new(inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> Result<Self> {
        let mut tx = Self {
            hash: Hash::ZERO,
            inputs,
            outputs,
        };
        tx.hash = tx.make_hash()?;
        Ok(tx)
    }

    /// Spend `unspent` outputs owned by `keypair`, paying `amount` to `dest`
    /// and returning any surplus to the signer.
    pub fn build(
        unspent: &[UTxOutput],
        amount: u64,
        keypair: &Keypair,
        dest: Address,
    ) -> Result<Self> {
        let mut inputs = Vec::with_capacity(unspent.len());
        let mut sum: u64 = 0;

        for out in unspent {
            let data = TxInput::signing_bytes(&out.tx_hash, out.out_idx);
            inputs.push(TxInput {
                tx_hash: out.tx_hash,
                out_idx: out.out_idx,
                signature: keypair.sign(&data),
            });
            sum = sum
                .checked_add(out.amount)
                .ok_or(TransactionError::AmountOverflow)?;
        }

        if sum < amount {
            return Err(TransactionError::InsufficientFunds {
                required: amount,
                available: sum,
            });
        }

        let mut outputs = vec![TxOutput::new(dest, amount)];
        if sum > amount {
            outputs.push(TxOutput::new(keypair.address(), sum - amount));
        }

        Self::new(inputs, outputs)
    }

    /// Create the reward transaction of a block.
    ///
    /// `tag` is carried in the sentinel input's signature field so that
    /// coinbase hashes differ between blocks.
    pub fn coinbase(miner: Address, reward: u64, tag: &Hash) -> Result<Self> {
        let input = TxInput {
            tx_hash: COINBASE_SENTINEL,
            out_idx: 0,
            signature: Signature::from_bytes(tag.as_bytes().to_vec()),
        };
        Self::new(vec![input], vec![TxOutput::new(miner, reward)])
    }

    /// Mint `amount` to `dest` by signing the privileged challenge.
    ///
    /// Only accepted by validators configured with `keypair`'s public key.
    /// The signature is randomized, so repeated mints of the same amount to
    /// the same address still hash differently.
    pub fn privileged(keypair: &Keypair, dest: Address, amount: u64) -> Result<Self> {
        let input = TxInput {
            tx_hash: PRIVILEGED_SENTINEL,
            out_idx: 0,
            signature: keypair.sign_randomized(PRIVILEGED_CHALLENGE),
        };
        Self::new(vec![input], vec![TxOutput::new(dest, amount)])
    }

    /// SHA-256 over the encoded inputs followed by the encoded outputs.
    pub fn make_hash(&self) -> Result<Hash> {
        let inputs = bincode::serialize(&self.inputs)?;
        let outputs = bincode::serialize(&self.outputs)?;
        Ok(sha256_concat(&[&inputs, &outputs]))
    }

    /// Check the stored hash against the recomputed one.
    pub fn validate_hash(&self) -> bool {
        matches!(self.make_hash(), Ok(hash) if hash == self.hash)
    }

    /// Whether the first input carries the coinbase sentinel.
    pub fn is_coinbase(&self) -> bool {
        self.inputs
            .first()
            .is_some_and(|input| input.tx_hash == COINBASE_SENTINEL)
    }

    /// Sum of all output amounts, `None` on overflow.
    pub fn total_output(&self) -> Option<u64> {
        self.outputs
            .iter()
            .try_fold(0u64, |acc, out| acc.checked_add(out.amount))
    }

    /// Whether every output has been spent.
    pub fn is_fully_spent(&self) -> bool {
        self.outputs.iter().all(TxOutput::is_spent)
    }
}
