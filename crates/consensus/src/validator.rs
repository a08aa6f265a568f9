//! Transaction and block validation rules.
//!
//! This module validates transactions and blocks according to consensus rules.
//! Storage is reached only through [`TransactionLookup`], so the rules can be
//! checked against a database or an in-memory map alike.

use powchain_core::{
    check_prefix, Block, Hash, PublicKey, Transaction, PRIVILEGED_CHALLENGE,
};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::debug;

/// Errors that can occur during validation.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("transaction hash mismatch")]
    InvalidHash,

    #[error("transaction has no inputs")]
    EmptyInputs,

    #[error("output {tx_hash}:{out_idx} does not exist")]
    OutputNotFound { tx_hash: Hash, out_idx: u16 },

    #[error("output {tx_hash}:{out_idx} is already spent")]
    OutputSpent { tx_hash: Hash, out_idx: u16 },

    #[error("output paid to an empty address")]
    InvalidOutputAddress,

    #[error("input signature verification failed")]
    InvalidSignature,

    #[error("input total {inputs} does not match output total {outputs}")]
    AmountMismatch { inputs: u64, outputs: u64 },

    #[error("amount overflow")]
    AmountOverflow,

    #[error("block prev_hash mismatch (expected {expected}, got {got})")]
    StalePrevHash { expected: Hash, got: Hash },

    #[error("block difficulty mismatch (expected {expected}, got {got})")]
    DifficultyMismatch { expected: u8, got: u8 },

    #[error("block hash does not meet the difficulty target")]
    InvalidProofOfWork,

    #[error("block timestamp is outside the hashable range")]
    InvalidTimestamp,

    #[error("block hash does not match its header")]
    InvalidBlockHash,

    #[error("block merkle root verification failed")]
    InvalidDataHash,

    #[error("block does not embed its transactions")]
    MissingPayloads,

    #[error("block has no coinbase transaction")]
    MissingCoinbase,

    #[error("block has more than one coinbase transaction")]
    DuplicateCoinbase,

    #[error("coinbase transaction outside a block")]
    UnexpectedCoinbase,

    #[error("coinbase must have exactly one input and one output")]
    MalformedCoinbase,

    #[error("coinbase reward mismatch (expected {expected}, got {got})")]
    InvalidCoinbaseReward { expected: u64, got: u64 },

    #[error("output {tx_hash}:{out_idx} spent twice in one block")]
    DoubleSpend { tx_hash: Hash, out_idx: u16 },

    #[error("transaction {0} already exists")]
    DuplicateTransaction(Hash),

    #[error("transaction lookup failed: {0}")]
    Lookup(String),
}

pub type Result<T> = std::result::Result<T, ValidationError>;

/// Source of previously stored transactions.
pub trait TransactionLookup {
    fn find_transaction(&self, hash: &Hash) -> Result<Option<Transaction>>;
}

impl TransactionLookup for HashMap<Hash, Transaction> {
    fn find_transaction(&self, hash: &Hash) -> Result<Option<Transaction>> {
        Ok(self.get(hash).cloned())
    }
}

/// Stored transactions plus those accepted earlier in the block being
/// checked.
struct WithinBlock<'b, L: ?Sized> {
    stored: &'b L,
    earlier: HashMap<Hash, Transaction>,
}

impl<L: TransactionLookup + ?Sized> TransactionLookup for WithinBlock<'_, L> {
    fn find_transaction(&self, hash: &Hash) -> Result<Option<Transaction>> {
        match self.earlier.get(hash) {
            Some(tx) => Ok(Some(tx.clone())),
            None => self.stored.find_transaction(hash),
        }
    }
}

/// How a valid transaction was accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxKind {
    /// Spends existing outputs with matching signatures and amounts.
    Regular,
    /// Block reward; its amount is checked by the block rules.
    Coinbase,
    /// Minted by the configured privileged key.
    Privileged,
}

impl TxKind {
    pub fn is_coinbase(self) -> bool {
        self == TxKind::Coinbase
    }
}

/// Transaction validator.
pub struct TransactionValidator;

impl TransactionValidator {
    /// Validate a transaction against the stored outputs it spends.
    ///
    /// Checks run in order: hash, inputs present, output addresses, coinbase
    /// detection, privileged signature, then each input (existence, unspent,
    /// owner signature) and finally the input/output balance.
    pub fn validate_transaction<L: TransactionLookup + ?Sized>(
        tx: &Transaction,
        lookup: &L,
        privileged_key: Option<&PublicKey>,
    ) -> Result<TxKind> {
        if !tx.validate_hash() {
            return Err(ValidationError::InvalidHash);
        }

        let first = tx.inputs.first().ok_or(ValidationError::EmptyInputs)?;

        if tx.outputs.iter().any(|out| out.addr.is_tombstone()) {
            return Err(ValidationError::InvalidOutputAddress);
        }

        if tx.is_coinbase() {
            return Ok(TxKind::Coinbase);
        }

        if let Some(key) = privileged_key {
            if key.verify(PRIVILEGED_CHALLENGE, &first.signature).is_ok() {
                debug!(tx = %tx.hash, "accepted privileged transaction");
                return Ok(TxKind::Privileged);
            }
        }

        let mut input_total: u64 = 0;
        for input in &tx.inputs {
            let not_found = || ValidationError::OutputNotFound {
                tx_hash: input.tx_hash,
                out_idx: input.out_idx,
            };

            let prev = lookup
                .find_transaction(&input.tx_hash)?
                .ok_or_else(not_found)?;
            let output = prev
                .outputs
                .get(usize::from(input.out_idx))
                .ok_or_else(not_found)?;

            if output.is_spent() {
                return Err(ValidationError::OutputSpent {
                    tx_hash: input.tx_hash,
                    out_idx: input.out_idx,
                });
            }

            let owner = output
                .addr
                .to_public_key()
                .map_err(|_| ValidationError::InvalidSignature)?;
            owner
                .verify(&input.data_bytes(), &input.signature)
                .map_err(|_| ValidationError::InvalidSignature)?;

            input_total = input_total
                .checked_add(output.amount)
                .ok_or(ValidationError::AmountOverflow)?;
        }

        let output_total = tx.total_output().ok_or(ValidationError::AmountOverflow)?;
        if output_total != input_total {
            return Err(ValidationError::AmountMismatch {
                inputs: input_total,
                outputs: output_total,
            });
        }

        Ok(TxKind::Regular)
    }
}

/// Parameters a block is checked against.
#[derive(Debug, Clone, Copy)]
pub struct BlockRules<'a> {
    /// Hash the block must build on (the current head).
    pub expected_prev: Hash,
    pub difficulty: u8,
    pub reward_per_tx: u64,
    pub privileged_key: Option<&'a PublicKey>,
}

/// Block validator.
pub struct BlockValidator;

impl BlockValidator {
    /// Check the header: parent link, difficulty, proof of work, timestamp,
    /// hash.
    pub fn validate_header(block: &Block, rules: &BlockRules<'_>) -> Result<()> {
        let header = &block.header;

        if header.prev_hash != rules.expected_prev {
            return Err(ValidationError::StalePrevHash {
                expected: rules.expected_prev,
                got: header.prev_hash,
            });
        }

        if header.difficulty != rules.difficulty {
            return Err(ValidationError::DifficultyMismatch {
                expected: rules.difficulty,
                got: header.difficulty,
            });
        }

        if !check_prefix(header.cur_hash.as_bytes(), header.difficulty) {
            return Err(ValidationError::InvalidProofOfWork);
        }

        if header.timestamp_nanos().is_none() {
            return Err(ValidationError::InvalidTimestamp);
        }

        if header.make_hash() != header.cur_hash {
            return Err(ValidationError::InvalidBlockHash);
        }

        Ok(())
    }

    /// Check the body: merkle root, coinbase shape and reward, every
    /// transaction, no intra-block double spend, no replayed transaction.
    ///
    /// A transaction may spend outputs of transactions listed before it in
    /// the same block. Returns the kind of each ordinary transaction, in
    /// body order.
    pub fn validate_body<L: TransactionLookup + ?Sized>(
        block: &Block,
        lookup: &L,
        rules: &BlockRules<'_>,
    ) -> Result<Vec<TxKind>> {
        let body = &block.body;
        if !body.has_payloads() {
            return Err(ValidationError::MissingPayloads);
        }

        if !block.validate_data_hash() {
            return Err(ValidationError::InvalidDataHash);
        }

        let coinbase = body
            .coinbase_tx
            .as_ref()
            .filter(|tx| tx.is_coinbase())
            .ok_or(ValidationError::MissingCoinbase)?;
        Self::validate_coinbase(coinbase, body.txs.len(), rules.reward_per_tx)?;

        let mut view = WithinBlock {
            stored: lookup,
            earlier: HashMap::new(),
        };
        let mut spent = HashSet::new();
        let mut kinds = Vec::with_capacity(body.txs.len());

        for tx in &body.txs {
            if view.earlier.contains_key(&tx.hash) {
                return Err(ValidationError::DuplicateTransaction(tx.hash));
            }

            let kind =
                TransactionValidator::validate_transaction(tx, &view, rules.privileged_key)?;
            if kind.is_coinbase() {
                return Err(ValidationError::DuplicateCoinbase);
            }

            // Privileged inputs carry a sentinel, not a spendable output.
            if kind == TxKind::Regular {
                for input in &tx.inputs {
                    if !spent.insert((input.tx_hash, input.out_idx)) {
                        return Err(ValidationError::DoubleSpend {
                            tx_hash: input.tx_hash,
                            out_idx: input.out_idx,
                        });
                    }
                }
            }

            view.earlier.insert(tx.hash, tx.clone());
            kinds.push(kind);
        }

        for tx in body.transactions() {
            if lookup.find_transaction(&tx.hash)?.is_some() {
                return Err(ValidationError::DuplicateTransaction(tx.hash));
            }
        }

        Ok(kinds)
    }

    fn validate_coinbase(coinbase: &Transaction, tx_count: usize, reward_per_tx: u64) -> Result<()> {
        if !coinbase.validate_hash() {
            return Err(ValidationError::InvalidHash);
        }

        let [output] = coinbase.outputs.as_slice() else {
            return Err(ValidationError::MalformedCoinbase);
        };
        if coinbase.inputs.len() != 1 {
            return Err(ValidationError::MalformedCoinbase);
        }
        if output.addr.is_tombstone() {
            return Err(ValidationError::InvalidOutputAddress);
        }

        let expected = reward_per_tx
            .checked_mul(tx_count as u64)
            .ok_or(ValidationError::AmountOverflow)?;
        if output.amount != expected {
            return Err(ValidationError::InvalidCoinbaseReward {
                expected,
                got: output.amount,
            });
        }

        Ok(())
    }

    /// Full block validation (header + body).
    pub fn validate_full<L: TransactionLookup + ?Sized>(
        block: &Block,
        lookup: &L,
        rules: &BlockRules<'_>,
    ) -> Result<Vec<TxKind>> {
        Self::validate_header(block, rules)?;
        Self::validate_body(block, lookup, rules)
    }
}
