//! Ledger state machine.
//!
//! The ledger owns the chain head. Blocks are validated against the stored
//! transactions and, if accepted, written in a single atomic commit together
//! with every state change they cause. Only the ledger moves the head.

use crate::config::ChainConfig;
use crate::mempool::{Mempool, MempoolError};
use crossbeam::channel::Sender;
use parking_lot::RwLock;
use powchain_consensus::{
    BlockRules, BlockValidator, CancelToken, CpuMiner, NonceSearch, PowError, TransactionLookup,
    TransactionValidator, TxKind, ValidationError,
};
use powchain_core::{
    Address, Block, BlockBody, BlockHeader, CryptoError, Hash, Keypair, PublicKey, Transaction,
    TransactionError, UTxOutput, GENESIS_HASH, PRIVILEGED_SENTINEL,
};
use powchain_storage::{BatchOp, ChainStore, Storage, StorageError, TxStore};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("validation error: {0}")]
    Validation(ValidationError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("insufficient funds (required {required}, available {available})")]
    InsufficientFunds { required: u64, available: u64 },

    #[error("corrupt chain: {0}")]
    CorruptChain(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("mempool error: {0}")]
    Mempool(MempoolError),

    #[error("transaction error: {0}")]
    Transaction(TransactionError),

    #[error("proof of work error: {0}")]
    Pow(PowError),

    #[error("no miner address configured")]
    MissingMinerAddress,

    #[error("invalid privileged key: {0}")]
    InvalidPrivilegedKey(CryptoError),
}

impl From<ValidationError> for LedgerError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::OutputNotFound { .. } => LedgerError::NotFound(err.to_string()),
            other => LedgerError::Validation(other),
        }
    }
}

impl From<PowError> for LedgerError {
    fn from(err: PowError) -> Self {
        match err {
            PowError::Cancelled => LedgerError::Cancelled,
            other => LedgerError::Pow(other),
        }
    }
}

impl From<TransactionError> for LedgerError {
    fn from(err: TransactionError) -> Self {
        match err {
            TransactionError::InsufficientFunds {
                required,
                available,
            } => LedgerError::InsufficientFunds {
                required,
                available,
            },
            other => LedgerError::Transaction(other),
        }
    }
}

impl From<MempoolError> for LedgerError {
    fn from(err: MempoolError) -> Self {
        match err {
            MempoolError::TransactionNotFound(_) => LedgerError::NotFound(err.to_string()),
            MempoolError::Storage(err) => LedgerError::Storage(err),
            other => LedgerError::Mempool(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Validation view over the transaction store.
struct StoredTransactions<'s, 'a>(&'s TxStore<'a>);

impl TransactionLookup for StoredTransactions<'_, '_> {
    fn find_transaction(
        &self,
        hash: &Hash,
    ) -> powchain_consensus::validator::Result<Option<Transaction>> {
        self.0
            .get(hash)
            .map_err(|err| ValidationError::Lookup(err.to_string()))
    }
}

/// Stored transactions, then the pending pool.
struct WithPending<'s, 'a> {
    stored: StoredTransactions<'s, 'a>,
    mempool: &'s Mempool<'a>,
}

impl TransactionLookup for WithPending<'_, '_> {
    fn find_transaction(
        &self,
        hash: &Hash,
    ) -> powchain_consensus::validator::Result<Option<Transaction>> {
        if let Some(tx) = self.stored.find_transaction(hash)? {
            return Ok(Some(tx));
        }
        self.mempool
            .get(hash)
            .map_err(|err| ValidationError::Lookup(err.to_string()))
    }
}

/// Accumulates outputs owned by one address until their total reaches a
/// target.
struct OutputPicker<'c> {
    target: u64,
    claimed: &'c HashSet<(Hash, u16)>,
    found: Vec<UTxOutput>,
    total: u64,
}

impl<'c> OutputPicker<'c> {
    fn new(target: u64, claimed: &'c HashSet<(Hash, u16)>) -> Self {
        Self {
            target,
            claimed,
            found: Vec::new(),
            total: 0,
        }
    }

    fn done(&self) -> bool {
        self.total >= self.target
    }

    /// Take the unclaimed outputs of `tx` paid to `addr`. Returns true once
    /// the target is reached.
    fn take_from(&mut self, tx: &Transaction, addr: &Address) -> bool {
        for (idx, output) in tx.outputs.iter().enumerate() {
            if output.addr != *addr {
                continue;
            }
            let Ok(out_idx) = u16::try_from(idx) else {
                break;
            };
            if self.claimed.contains(&(tx.hash, out_idx)) {
                continue;
            }
            self.found.push(UTxOutput {
                tx_hash: tx.hash,
                out_idx,
                amount: output.amount,
            });
            self.total = self.total.saturating_add(output.amount);
            if self.done() {
                return true;
            }
        }
        false
    }

    fn finish(self) -> (Vec<UTxOutput>, u64) {
        (self.found, self.total)
    }
}

/// Outputs spent by any of `txs`.
fn spent_outputs(txs: &[Transaction]) -> HashSet<(Hash, u16)> {
    txs.iter()
        .flat_map(|tx| tx.inputs.iter())
        .map(|input| (input.tx_hash, input.out_idx))
        .collect()
}

/// Reorder `txs` so a transaction spending another one of the set comes
/// after it. Relative order is otherwise kept.
fn dependency_order(mut txs: Vec<Transaction>) -> Vec<Transaction> {
    let mut waiting: HashSet<Hash> = txs.iter().map(|tx| tx.hash).collect();
    let mut ordered = Vec::with_capacity(txs.len());

    while !txs.is_empty() {
        let (ready, blocked): (Vec<_>, Vec<_>) = txs.into_iter().partition(|tx| {
            tx.inputs
                .iter()
                .all(|input| !waiting.contains(&input.tx_hash))
        });
        if ready.is_empty() {
            ordered.extend(blocked);
            break;
        }
        for tx in &ready {
            waiting.remove(&tx.hash);
        }
        ordered.extend(ready);
        txs = blocked;
    }

    ordered
}

/// The ledger: chain head, stored transactions and the pending pool.
pub struct Ledger<'a> {
    storage: &'a Storage,
    chain: ChainStore<'a>,
    txs: TxStore<'a>,
    mempool: Mempool<'a>,
    config: ChainConfig,
    privileged_key: Option<PublicKey>,
    head: RwLock<Hash>,
}

impl<'a> Ledger<'a> {
    /// Open the ledger over `storage`.
    ///
    /// An empty header store is seeded with the genesis header. The head is
    /// then resolved from the stored headers.
    pub fn open(storage: &'a Storage, config: ChainConfig) -> Result<Self> {
        let privileged_key = config
            .privileged_key
            .as_ref()
            .map(Address::to_public_key)
            .transpose()
            .map_err(LedgerError::InvalidPrivilegedKey)?;

        let chain = ChainStore::new(storage);
        if chain.is_empty() {
            let genesis = Block::genesis();
            storage.commit(vec![
                ChainStore::header_op(&genesis.header)?,
                ChainStore::body_op(&genesis.hash(), &genesis.body)?,
            ])?;
            info!("initialized chain with genesis header");
        }

        let mut ledger = Self {
            storage,
            chain,
            txs: TxStore::new(storage),
            mempool: Mempool::new(storage, config.mempool.clone()),
            config,
            privileged_key,
            head: RwLock::new(GENESIS_HASH),
        };

        let head = ledger.resolve_chain_head()?;
        *ledger.head.get_mut() = head;
        info!(head = %head, "opened ledger");

        Ok(ledger)
    }

    /// Current chain head.
    pub fn head(&self) -> Hash {
        *self.head.read()
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// The pending transaction pool.
    pub fn mempool(&self) -> &Mempool<'a> {
        &self.mempool
    }

    /// Set the address paid by blocks this ledger mines.
    pub fn set_miner_address(&mut self, address: Address) {
        self.config.miner_address = Some(address);
    }

    fn rules(&self, expected_prev: Hash) -> BlockRules<'_> {
        BlockRules {
            expected_prev,
            difficulty: self.config.difficulty,
            reward_per_tx: self.config.reward_per_tx,
            privileged_key: self.privileged_key.as_ref(),
        }
    }

    // =========================================================================
    // Block Application
    // =========================================================================

    /// Validate `block` against the current head and apply it.
    ///
    /// On any failure neither storage nor the head changes.
    pub fn apply_block(&self, block: &Block) -> Result<()> {
        let mut head = self.head.write();

        let lookup = StoredTransactions(&self.txs);
        let kinds = match BlockValidator::validate_full(block, &lookup, &self.rules(*head)) {
            Ok(kinds) => kinds,
            Err(err) => {
                warn!(block = %block.hash(), error = %err, "rejected block");
                return Err(err.into());
            }
        };

        let ops = self.block_commit_ops(block, &kinds)?;
        self.storage.commit(ops)?;
        *head = block.hash();

        info!(
            block = %block.hash(),
            prev = %block.header.prev_hash,
            txs = block.body.tx_count(),
            "applied block"
        );
        Ok(())
    }

    /// Peer-supplied block; same rules as a locally mined one.
    pub fn import_block(&self, block: &Block) -> Result<()> {
        self.apply_block(block)
    }

    /// Every state change caused by an already validated block. `kinds`
    /// holds the accepted kind of each transaction in `block.body.txs`.
    fn block_commit_ops(&self, block: &Block, kinds: &[TxKind]) -> Result<Vec<BatchOp>> {
        let hash = block.hash();
        let mut ops = vec![
            ChainStore::header_op(&block.header)?,
            ChainStore::body_op(&hash, &block.body)?,
        ];

        // Records created by this block; later transactions of the block may
        // already spend them.
        let mut created: HashMap<Hash, Transaction> = block
            .body
            .transactions()
            .map(|tx| (tx.hash, tx.clone()))
            .collect();

        // Spent outputs: tombstone in place, or drop the record once every
        // output is gone.
        let mut touched: HashMap<Hash, Transaction> = HashMap::new();
        let mut consumed: HashSet<(Hash, u16)> = HashSet::new();
        for (tx, kind) in block.body.txs.iter().zip(kinds) {
            if *kind != TxKind::Regular {
                continue;
            }
            for input in &tx.inputs {
                consumed.insert((input.tx_hash, input.out_idx));
                let prev = match created.get_mut(&input.tx_hash) {
                    Some(prev) => prev,
                    None => match touched.entry(input.tx_hash) {
                        Entry::Occupied(entry) => entry.into_mut(),
                        Entry::Vacant(entry) => {
                            let stored = self.txs.get(&input.tx_hash)?.ok_or_else(|| {
                                LedgerError::CorruptChain(format!(
                                    "validated input {}:{} has no record",
                                    input.tx_hash, input.out_idx
                                ))
                            })?;
                            entry.insert(stored)
                        }
                    },
                };
                if let Some(output) = prev.outputs.get_mut(usize::from(input.out_idx)) {
                    output.addr = Address::TOMBSTONE;
                }
            }
        }
        for (prev_hash, prev) in &touched {
            if prev.is_fully_spent() {
                ops.push(TxStore::remove_op(prev_hash));
            } else {
                ops.push(TxStore::insert_op(prev)?);
            }
        }

        let included: HashSet<Hash> = block.body.txs.iter().map(|tx| tx.hash).collect();
        for tx_hash in &included {
            ops.push(Mempool::remove_op(tx_hash));
        }
        let stale = self.stale_pending(&included, &consumed)?;
        if !stale.is_empty() {
            debug!(block = %hash, count = stale.len(), "evicting conflicting pending transactions");
        }
        for tx_hash in &stale {
            ops.push(Mempool::remove_op(tx_hash));
        }

        for tx in block.body.transactions() {
            if let Some(record) = created.get(&tx.hash) {
                if !record.is_fully_spent() {
                    ops.push(TxStore::insert_op(record)?);
                }
            }
        }

        Ok(ops)
    }

    /// Pending transactions left unspendable once a block including
    /// `included` and spending `consumed` is applied, together with
    /// everything pending that builds on them.
    fn stale_pending(
        &self,
        included: &HashSet<Hash>,
        consumed: &HashSet<(Hash, u16)>,
    ) -> Result<HashSet<Hash>> {
        let mut pending: Vec<Transaction> = self
            .mempool
            .get_pending(usize::MAX)?
            .into_iter()
            .filter(|tx| !included.contains(&tx.hash))
            .collect();
        let mut stale = HashSet::new();

        loop {
            let (conflicting, rest): (Vec<_>, Vec<_>) = pending.into_iter().partition(|tx| {
                tx.inputs.iter().any(|input| {
                    consumed.contains(&(input.tx_hash, input.out_idx))
                        || stale.contains(&input.tx_hash)
                })
            });
            if conflicting.is_empty() {
                break;
            }
            stale.extend(conflicting.iter().map(|tx| tx.hash));
            pending = rest;
        }

        Ok(stale)
    }

    // =========================================================================
    // Chain Queries
    // =========================================================================

    /// Find the single chain tip among the stored headers.
    ///
    /// A tip is a non-genesis header no other header builds on. A store with
    /// only the genesis header resolves to it; any other count of tips means
    /// the store is corrupt.
    pub fn resolve_chain_head(&self) -> Result<Hash> {
        let headers = self.chain.all_headers()?;
        let referenced: HashSet<Hash> = headers.iter().map(|h| h.prev_hash).collect();

        let tips: Vec<Hash> = headers
            .iter()
            .map(|h| h.cur_hash)
            .filter(|hash| *hash != GENESIS_HASH && !referenced.contains(hash))
            .collect();

        match tips.as_slice() {
            [tip] => {
                self.check_reaches_genesis(*tip, &headers)?;
                Ok(*tip)
            }
            [] if headers.iter().any(|h| h.cur_hash == GENESIS_HASH) && headers.len() == 1 => {
                Ok(GENESIS_HASH)
            }
            [] => Err(LedgerError::CorruptChain(format!(
                "no chain tip among {} headers",
                headers.len()
            ))),
            many => Err(LedgerError::CorruptChain(format!(
                "{} competing chain tips",
                many.len()
            ))),
        }
    }

    /// Follow `prev_hash` links from `tip`; they must end at genesis.
    fn check_reaches_genesis(&self, tip: Hash, headers: &[BlockHeader]) -> Result<()> {
        let by_hash: HashMap<Hash, &BlockHeader> =
            headers.iter().map(|h| (h.cur_hash, h)).collect();

        let mut cursor = tip;
        for _ in 0..headers.len() {
            if cursor == GENESIS_HASH {
                return Ok(());
            }
            let header = by_hash.get(&cursor).ok_or_else(|| {
                LedgerError::CorruptChain(format!("chain tip {tip} is cut off at {cursor}"))
            })?;
            cursor = header.prev_hash;
        }

        if cursor == GENESIS_HASH {
            Ok(())
        } else {
            Err(LedgerError::CorruptChain(format!(
                "chain tip {tip} does not lead to genesis"
            )))
        }
    }

    /// Collect outputs owned by `addr`, newest blocks first, until their
    /// total reaches `target`.
    pub fn find_unspent_outputs_for(
        &self,
        addr: &Address,
        target: u64,
    ) -> Result<(Vec<UTxOutput>, u64)> {
        let unclaimed = HashSet::new();
        let mut picker = OutputPicker::new(target, &unclaimed);
        self.pick_chain_outputs(addr, &mut picker)?;
        Ok(picker.finish())
    }

    /// Outputs `addr` can put into a new pending transaction: unspent chain
    /// outputs first, then outputs of pending transactions, skipping any
    /// output the pending pool already spends.
    pub fn find_spendable_outputs_for(
        &self,
        addr: &Address,
        target: u64,
    ) -> Result<(Vec<UTxOutput>, u64)> {
        let pending = self.mempool.get_pending(usize::MAX)?;
        let claimed = spent_outputs(&pending);
        let mut picker = OutputPicker::new(target, &claimed);

        self.pick_chain_outputs(addr, &mut picker)?;
        for tx in &pending {
            if picker.done() || picker.take_from(tx, addr) {
                break;
            }
        }

        Ok(picker.finish())
    }

    fn pick_chain_outputs(&self, addr: &Address, picker: &mut OutputPicker<'_>) -> Result<()> {
        let head = self.head.read();
        if picker.done() {
            return Ok(());
        }

        let mut cursor = *head;
        while cursor != GENESIS_HASH {
            let header = self.require_header(&cursor)?;
            let body = self
                .chain
                .get_body(&cursor)?
                .ok_or_else(|| LedgerError::CorruptChain(format!("missing body {cursor}")))?;

            for tx_hash in body.coinbase_tx_hash.iter().chain(body.tx_hashes.iter()) {
                let Some(tx) = self.txs.get(tx_hash)? else {
                    continue;
                };
                if picker.take_from(&tx, addr) {
                    return Ok(());
                }
            }

            cursor = header.prev_hash;
        }

        Ok(())
    }

    /// Total of every unspent output owned by `addr`.
    pub fn balance(&self, addr: &Address) -> Result<u64> {
        Ok(self.find_unspent_outputs_for(addr, u64::MAX)?.1)
    }

    fn require_header(&self, hash: &Hash) -> Result<BlockHeader> {
        self.chain
            .get_header(hash)?
            .ok_or_else(|| LedgerError::CorruptChain(format!("missing header {hash}")))
    }

    pub fn get_header(&self, hash: &Hash) -> Result<Option<BlockHeader>> {
        Ok(self.chain.get_header(hash)?)
    }

    /// Stored (stripped) body of a block.
    pub fn get_body(&self, hash: &Hash) -> Result<Option<BlockBody>> {
        Ok(self.chain.get_body(hash)?)
    }

    /// Up to `limit` headers walking back from the head, newest first.
    pub fn recent_headers(&self, limit: usize) -> Result<Vec<BlockHeader>> {
        let head = self.head.read();
        let mut headers = Vec::new();
        let mut cursor = *head;

        while headers.len() < limit {
            let header = self.require_header(&cursor)?;
            let prev = header.prev_hash;
            let is_genesis = header.cur_hash == GENESIS_HASH;
            headers.push(header);
            if is_genesis {
                break;
            }
            cursor = prev;
        }

        Ok(headers)
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Validate a transaction against the current state and pool it.
    pub fn submit_transaction(&self, tx: &Transaction) -> Result<TxKind> {
        let _head = self.head.read();

        let lookup = WithPending {
            stored: StoredTransactions(&self.txs),
            mempool: &self.mempool,
        };
        let kind =
            TransactionValidator::validate_transaction(tx, &lookup, self.privileged_key.as_ref())
                .inspect_err(|err| warn!(tx = %tx.hash, error = %err, "rejected transaction"))?;
        if kind.is_coinbase() {
            return Err(ValidationError::UnexpectedCoinbase.into());
        }

        self.mempool.add(tx)?;
        debug!(tx = %tx.hash, ?kind, "accepted transaction");
        Ok(kind)
    }

    /// Pay `amount` from `keypair`'s outputs to `dest` and pool the result.
    ///
    /// The privileged key mints instead of spending outputs.
    pub fn create_transaction(
        &self,
        keypair: &Keypair,
        dest: Address,
        amount: u64,
    ) -> Result<Transaction> {
        let tx = if self.privileged_key.as_ref() == Some(&keypair.public_key) {
            Transaction::privileged(keypair, dest, amount)?
        } else {
            let (unspent, available) =
                self.find_spendable_outputs_for(&keypair.address(), amount)?;
            if available < amount {
                return Err(LedgerError::InsufficientFunds {
                    required: amount,
                    available,
                });
            }
            Transaction::build(&unspent, amount, keypair, dest)?
        };

        self.submit_transaction(&tx)?;
        Ok(tx)
    }

    /// Up to `limit` pending transactions that fit in one block together.
    ///
    /// A transaction comes after the pending transactions it spends and is
    /// skipped when one of them was left out, or when an earlier pick
    /// already spends one of its inputs.
    pub fn select_pending(&self, limit: usize) -> Result<Vec<Transaction>> {
        let pending = dependency_order(self.mempool.get_pending(usize::MAX)?);
        let pooled: HashSet<Hash> = pending.iter().map(|tx| tx.hash).collect();

        let mut picked: HashSet<Hash> = HashSet::new();
        let mut spent: HashSet<(Hash, u16)> = HashSet::new();
        let mut selected = Vec::new();

        for tx in pending {
            if selected.len() >= limit {
                break;
            }
            let fits = tx.inputs.iter().all(|input| {
                let parent_ok =
                    !pooled.contains(&input.tx_hash) || picked.contains(&input.tx_hash);
                parent_ok
                    && (input.tx_hash == PRIVILEGED_SENTINEL
                        || !spent.contains(&(input.tx_hash, input.out_idx)))
            });
            if !fits {
                debug!(tx = %tx.hash, "skipping pending transaction");
                continue;
            }

            spent.extend(
                tx.inputs
                    .iter()
                    .filter(|input| input.tx_hash != PRIVILEGED_SENTINEL)
                    .map(|input| (input.tx_hash, input.out_idx)),
            );
            picked.insert(tx.hash);
            selected.push(tx);
        }

        Ok(selected)
    }

    // =========================================================================
    // Mining
    // =========================================================================

    /// Mine the given pooled transactions on top of the head with the CPU
    /// miner and apply the result.
    pub fn mine_block(&self, tx_hashes: &[Hash], cancel: &CancelToken) -> Result<Block> {
        let miner = CpuMiner::new(self.config.pow.clone());
        self.mine_block_with(&miner, tx_hashes, cancel, None)
    }

    /// Same as [`Ledger::mine_block`] with a caller-chosen search backend.
    /// Sampled hashes are offered on `candidates` while the search runs.
    pub fn mine_block_with(
        &self,
        search: &dyn NonceSearch,
        tx_hashes: &[Hash],
        cancel: &CancelToken,
        candidates: Option<&Sender<Hash>>,
    ) -> Result<Block> {
        let miner = self
            .config
            .miner_address
            .clone()
            .ok_or(LedgerError::MissingMinerAddress)?;
        let txs = dependency_order(self.mempool.get_many(tx_hashes)?);

        let mut block = Block::new(
            miner,
            txs,
            self.head(),
            self.config.difficulty,
            self.config.reward_per_tx,
        )?;

        debug!(
            prev = %block.header.prev_hash,
            txs = block.body.tx_count(),
            difficulty = block.header.difficulty,
            "mining block"
        );
        let solution = search.search_with_candidates(
            &block.header.make_hash_input(),
            block.header.difficulty,
            cancel,
            candidates,
        )?;
        block.seal(solution.nonce, solution.hash);

        self.apply_block(&block)?;
        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use powchain_core::sha256;

    fn test_config(miner: Address) -> ChainConfig {
        let mut config = ChainConfig {
            difficulty: 4,
            miner_address: Some(miner),
            ..ChainConfig::default()
        };
        config.pow.workers = 2;
        config
    }

    #[test]
    fn test_open_seeds_genesis() {
        let storage = Storage::open_temporary().unwrap();
        let ledger = Ledger::open(&storage, ChainConfig::default()).unwrap();

        assert_eq!(ledger.head(), GENESIS_HASH);
        assert!(ledger.get_header(&GENESIS_HASH).unwrap().is_some());
        assert_eq!(ledger.recent_headers(10).unwrap().len(), 1);
    }

    #[test]
    fn test_reopen_keeps_head() {
        let storage = Storage::open_temporary().unwrap();
        let miner = Keypair::generate();

        let head = {
            let ledger = Ledger::open(&storage, test_config(miner.address())).unwrap();
            ledger.mine_block(&[], &CancelToken::new()).unwrap().hash()
        };

        let ledger = Ledger::open(&storage, test_config(miner.address())).unwrap();
        assert_eq!(ledger.head(), head);
    }

    #[test]
    fn test_mine_empty_block_pays_nothing() {
        let storage = Storage::open_temporary().unwrap();
        let miner = Keypair::generate();
        let ledger = Ledger::open(&storage, test_config(miner.address())).unwrap();

        let block = ledger.mine_block(&[], &CancelToken::new()).unwrap();

        assert_eq!(ledger.head(), block.hash());
        assert!(block.header.meets_difficulty());
        assert_eq!(ledger.balance(&miner.address()).unwrap(), 0);
    }

    #[test]
    fn test_mine_without_miner_address() {
        let storage = Storage::open_temporary().unwrap();
        let ledger = Ledger::open(&storage, ChainConfig::default()).unwrap();

        assert!(matches!(
            ledger.mine_block(&[], &CancelToken::new()),
            Err(LedgerError::MissingMinerAddress)
        ));
    }

    #[test]
    fn test_set_miner_address() {
        let storage = Storage::open_temporary().unwrap();
        let mut ledger = Ledger::open(&storage, ChainConfig::default()).unwrap();

        let miner = Keypair::generate().address();
        ledger.set_miner_address(miner.clone());
        assert_eq!(ledger.config().miner_address, Some(miner));
    }

    #[test]
    fn test_mine_unknown_transaction() {
        let storage = Storage::open_temporary().unwrap();
        let ledger =
            Ledger::open(&storage, test_config(Keypair::generate().address())).unwrap();

        assert!(matches!(
            ledger.mine_block(&[sha256(b"nope")], &CancelToken::new()),
            Err(LedgerError::NotFound(_))
        ));
    }

    #[test]
    fn test_cancelled_mining_leaves_head() {
        let storage = Storage::open_temporary().unwrap();
        let mut config = test_config(Keypair::generate().address());
        config.difficulty = 255;
        let ledger = Ledger::open(&storage, config).unwrap();

        let cancel = CancelToken::new();
        cancel.cancel();

        assert!(matches!(
            ledger.mine_block(&[], &cancel),
            Err(LedgerError::Cancelled)
        ));
        assert_eq!(ledger.head(), GENESIS_HASH);
    }

    #[test]
    fn test_insufficient_funds() {
        let storage = Storage::open_temporary().unwrap();
        let ledger =
            Ledger::open(&storage, test_config(Keypair::generate().address())).unwrap();

        let poor = Keypair::generate();
        assert!(matches!(
            ledger.create_transaction(&poor, Keypair::generate().address(), 5),
            Err(LedgerError::InsufficientFunds {
                required: 5,
                available: 0
            })
        ));
    }

    #[test]
    fn test_coinbase_submission_rejected() {
        let storage = Storage::open_temporary().unwrap();
        let ledger = Ledger::open(&storage, ChainConfig::default()).unwrap();

        let coinbase =
            Transaction::coinbase(Keypair::generate().address(), 10, &Hash::ZERO).unwrap();
        assert!(matches!(
            ledger.submit_transaction(&coinbase),
            Err(LedgerError::Validation(ValidationError::UnexpectedCoinbase))
        ));
        assert!(ledger.mempool().is_empty());
    }

    #[test]
    fn test_invalid_privileged_key() {
        let storage = Storage::open_temporary().unwrap();
        let config = ChainConfig {
            privileged_key: Some(Address::from_bytes(vec![1, 2, 3])),
            ..ChainConfig::default()
        };

        assert!(matches!(
            Ledger::open(&storage, config),
            Err(LedgerError::InvalidPrivilegedKey(_))
        ));
    }

    #[test]
    fn test_dependency_order_puts_parents_first() {
        let owner = Keypair::generate();
        let parent = Transaction::coinbase(owner.address(), 20, &Hash::ZERO).unwrap();
        let child = Transaction::build(
            &[UTxOutput {
                tx_hash: parent.hash,
                out_idx: 0,
                amount: 20,
            }],
            20,
            &owner,
            Keypair::generate().address(),
        )
        .unwrap();
        let loose = Transaction::coinbase(owner.address(), 5, &Hash([3; 32])).unwrap();

        let ordered = dependency_order(vec![child.clone(), loose.clone(), parent.clone()]);
        let hashes: Vec<Hash> = ordered.iter().map(|tx| tx.hash).collect();
        assert_eq!(hashes, vec![loose.hash, parent.hash, child.hash]);
    }

    #[test]
    fn test_spendable_outputs_skip_pending_claims() {
        let storage = Storage::open_temporary().unwrap();
        let admin = Keypair::generate();
        let mut config = test_config(Keypair::generate().address());
        config.privileged_key = Some(admin.address());
        let ledger = Ledger::open(&storage, config).unwrap();

        let alice = Keypair::generate();
        let mint = ledger.create_transaction(&admin, alice.address(), 50).unwrap();
        ledger.mine_block(&[mint.hash], &CancelToken::new()).unwrap();

        let (outputs, total) = ledger.find_spendable_outputs_for(&alice.address(), 10).unwrap();
        assert_eq!(outputs[0].tx_hash, mint.hash);
        assert_eq!(total, 50);

        let spend = ledger
            .create_transaction(&alice, Keypair::generate().address(), 10)
            .unwrap();
        let (outputs, total) = ledger.find_spendable_outputs_for(&alice.address(), 10).unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].tx_hash, spend.hash);
        assert_eq!(total, 40);

        // Chain balance is unchanged until the spend is mined.
        assert_eq!(ledger.balance(&alice.address()).unwrap(), 50);
    }

    #[test]
    fn test_error_mapping() {
        let not_found = ValidationError::OutputNotFound {
            tx_hash: Hash::ZERO,
            out_idx: 0,
        };
        assert!(matches!(
            LedgerError::from(not_found),
            LedgerError::NotFound(_)
        ));
        assert!(matches!(
            LedgerError::from(PowError::Cancelled),
            LedgerError::Cancelled
        ));
        assert!(matches!(
            LedgerError::from(PowError::NonceSpaceExhausted),
            LedgerError::Pow(PowError::NonceSpaceExhausted)
        ));
    }
}
