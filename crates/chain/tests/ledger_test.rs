use powchain_chain::{ChainConfig, Ledger, LedgerError};
use crossbeam::channel;
use powchain_consensus::{CancelToken, CpuMiner, ValidationError};
use powchain_core::{leading_zero_bits, Block, Hash, Keypair, Transaction, GENESIS_HASH};
use powchain_storage::{ChainStore, Storage};
use std::thread;
use std::time::Duration;

const DIFFICULTY: u8 = 8;

fn config(miner: &Keypair, admin: &Keypair) -> ChainConfig {
    let mut config = ChainConfig {
        difficulty: DIFFICULTY,
        reward_per_tx: 10,
        miner_address: Some(miner.address()),
        privileged_key: Some(admin.address()),
        ..ChainConfig::default()
    };
    config.pow.workers = 2;
    config
}

fn mine(ledger: &Ledger<'_>, txs: &[&Transaction]) -> Block {
    let hashes: Vec<_> = txs.iter().map(|tx| tx.hash).collect();
    ledger.mine_block(&hashes, &CancelToken::new()).unwrap()
}

/// Mint `amount` to `owner` and mine it into a block.
fn fund(ledger: &Ledger<'_>, admin: &Keypair, owner: &Keypair, amount: u64) {
    let mint = ledger
        .create_transaction(admin, owner.address(), amount)
        .unwrap();
    mine(ledger, &[&mint]);
}

#[test]
fn test_transfers_preserve_balances() {
    let storage = Storage::open_temporary().unwrap();
    let (miner, admin) = (Keypair::generate(), Keypair::generate());
    let ledger = Ledger::open(&storage, config(&miner, &admin)).unwrap();

    let alice = Keypair::generate();
    let bob = Keypair::generate();
    let carol = Keypair::generate();

    fund(&ledger, &admin, &alice, 100);
    assert_eq!(ledger.balance(&alice.address()).unwrap(), 100);

    // The second transfer pays from the first one's pending change.
    let to_bob = ledger
        .create_transaction(&alice, bob.address(), 30)
        .unwrap();
    let to_carol = ledger
        .create_transaction(&alice, carol.address(), 20)
        .unwrap();
    assert_eq!(to_bob.outputs.len(), 2);
    assert_eq!(to_carol.inputs[0].tx_hash, to_bob.hash);

    let block = mine(&ledger, &[&to_bob, &to_carol]);
    assert_eq!(block.body.tx_count(), 2);

    assert_eq!(ledger.balance(&alice.address()).unwrap(), 50);
    assert_eq!(ledger.balance(&bob.address()).unwrap(), 30);
    assert_eq!(ledger.balance(&carol.address()).unwrap(), 20);
    assert_eq!(ledger.balance(&miner.address()).unwrap(), 30);
    assert!(ledger.mempool().is_empty());
    assert_eq!(ledger.recent_headers(10).unwrap().len(), 3);
}

#[test]
fn test_chained_spends_share_a_block() {
    let storage = Storage::open_temporary().unwrap();
    let (miner, admin) = (Keypair::generate(), Keypair::generate());
    let ledger = Ledger::open(&storage, config(&miner, &admin)).unwrap();

    let alice = Keypair::generate();
    let bob = Keypair::generate();
    let carol = Keypair::generate();
    fund(&ledger, &admin, &alice, 100);

    let to_bob = ledger
        .create_transaction(&alice, bob.address(), 100)
        .unwrap();
    let to_carol = ledger
        .create_transaction(&bob, carol.address(), 40)
        .unwrap();

    // Listed child first; mining puts the parent ahead of it.
    let block = mine(&ledger, &[&to_carol, &to_bob]);
    assert_eq!(block.body.tx_hashes, vec![to_bob.hash, to_carol.hash]);

    assert_eq!(ledger.balance(&alice.address()).unwrap(), 0);
    assert_eq!(ledger.balance(&bob.address()).unwrap(), 60);
    assert_eq!(ledger.balance(&carol.address()).unwrap(), 40);

    // Spent inside the block, so its record was never stored.
    let replay = Transaction::build(
        &[powchain_core::UTxOutput {
            tx_hash: to_bob.hash,
            out_idx: 0,
            amount: 100,
        }],
        100,
        &bob,
        bob.address(),
    )
    .unwrap();
    assert!(matches!(
        ledger.submit_transaction(&replay),
        Err(LedgerError::NotFound(_))
    ));
}

#[test]
fn test_several_mints_in_one_block() {
    let storage = Storage::open_temporary().unwrap();
    let (miner, admin) = (Keypair::generate(), Keypair::generate());
    let ledger = Ledger::open(&storage, config(&miner, &admin)).unwrap();

    let (x, y) = (Keypair::generate(), Keypair::generate());
    let first = ledger.create_transaction(&admin, x.address(), 5).unwrap();
    let second = ledger.create_transaction(&admin, y.address(), 7).unwrap();

    let selected = ledger.select_pending(10).unwrap();
    assert_eq!(selected.len(), 2);

    mine(&ledger, &[&first, &second]);
    assert_eq!(ledger.balance(&x.address()).unwrap(), 5);
    assert_eq!(ledger.balance(&y.address()).unwrap(), 7);
    assert_eq!(ledger.balance(&miner.address()).unwrap(), 20);
}

#[test]
fn test_unspent_outputs_stop_at_target() {
    let storage = Storage::open_temporary().unwrap();
    let (miner, admin) = (Keypair::generate(), Keypair::generate());
    let ledger = Ledger::open(&storage, config(&miner, &admin)).unwrap();

    let alice = Keypair::generate();
    fund(&ledger, &admin, &alice, 40);
    fund(&ledger, &admin, &alice, 60);

    // Newest block first: the 60 output alone covers 50.
    let (outputs, total) = ledger
        .find_unspent_outputs_for(&alice.address(), 50)
        .unwrap();
    assert_eq!(outputs.len(), 1);
    assert_eq!(total, 60);

    let (outputs, total) = ledger
        .find_unspent_outputs_for(&alice.address(), 100)
        .unwrap();
    assert_eq!(outputs.len(), 2);
    assert_eq!(total, 100);
}

#[test]
fn test_double_spend_rejected_without_state_change() {
    let storage = Storage::open_temporary().unwrap();
    let (miner, admin) = (Keypair::generate(), Keypair::generate());
    let ledger = Ledger::open(&storage, config(&miner, &admin)).unwrap();

    let alice = Keypair::generate();
    let bob = Keypair::generate();
    let carol = Keypair::generate();
    fund(&ledger, &admin, &alice, 100);

    let (unspent, _) = ledger
        .find_unspent_outputs_for(&alice.address(), 100)
        .unwrap();
    let to_bob = Transaction::build(&unspent, 100, &alice, bob.address()).unwrap();
    let to_carol = Transaction::build(&unspent, 100, &alice, carol.address()).unwrap();
    ledger.submit_transaction(&to_bob).unwrap();
    ledger.submit_transaction(&to_carol).unwrap();

    let head = ledger.head();
    let result = ledger.mine_block(&[to_bob.hash, to_carol.hash], &CancelToken::new());
    assert!(matches!(
        result,
        Err(LedgerError::Validation(ValidationError::DoubleSpend { .. }))
    ));
    assert_eq!(ledger.head(), head);
    assert_eq!(ledger.balance(&alice.address()).unwrap(), 100);
    assert_eq!(ledger.mempool().len(), 2);

    mine(&ledger, &[&to_bob]);
    assert_eq!(ledger.balance(&bob.address()).unwrap(), 100);
    assert!(ledger.mempool().is_empty());

    // The losing spend left the pool with the block.
    assert!(matches!(
        ledger.mine_block(&[to_carol.hash], &CancelToken::new()),
        Err(LedgerError::NotFound(_))
    ));
    assert_eq!(ledger.balance(&carol.address()).unwrap(), 0);
}

#[test]
fn test_block_evicts_conflicting_pending() {
    let storage = Storage::open_temporary().unwrap();
    let (miner, admin) = (Keypair::generate(), Keypair::generate());
    let ledger = Ledger::open(&storage, config(&miner, &admin)).unwrap();

    let alice = Keypair::generate();
    let bob = Keypair::generate();
    let carol = Keypair::generate();
    fund(&ledger, &admin, &alice, 100);

    let (unspent, _) = ledger
        .find_unspent_outputs_for(&alice.address(), 100)
        .unwrap();
    let to_bob = Transaction::build(&unspent, 100, &alice, bob.address()).unwrap();
    let to_carol = Transaction::build(&unspent, 100, &alice, carol.address()).unwrap();
    ledger.submit_transaction(&to_bob).unwrap();
    ledger.submit_transaction(&to_carol).unwrap();
    let onward = ledger
        .create_transaction(&carol, Keypair::generate().address(), 40)
        .unwrap();
    let unrelated = ledger
        .create_transaction(&admin, Keypair::generate().address(), 1)
        .unwrap();
    assert_eq!(ledger.mempool().len(), 4);

    mine(&ledger, &[&to_bob]);

    assert!(!ledger.mempool().contains(&to_carol.hash).unwrap());
    assert!(!ledger.mempool().contains(&onward.hash).unwrap());
    assert!(ledger.mempool().contains(&unrelated.hash).unwrap());
    assert_eq!(ledger.mempool().len(), 1);
}

#[test]
fn test_default_selection_skips_conflicts() {
    let storage = Storage::open_temporary().unwrap();
    let (miner, admin) = (Keypair::generate(), Keypair::generate());
    let ledger = Ledger::open(&storage, config(&miner, &admin)).unwrap();

    let alice = Keypair::generate();
    let carol = Keypair::generate();
    fund(&ledger, &admin, &alice, 100);

    let (unspent, _) = ledger
        .find_unspent_outputs_for(&alice.address(), 100)
        .unwrap();
    let to_bob =
        Transaction::build(&unspent, 100, &alice, Keypair::generate().address()).unwrap();
    let to_carol = Transaction::build(&unspent, 100, &alice, carol.address()).unwrap();
    ledger.submit_transaction(&to_bob).unwrap();
    ledger.submit_transaction(&to_carol).unwrap();
    ledger
        .create_transaction(&carol, Keypair::generate().address(), 40)
        .unwrap();

    // One of the two conflicting spends wins; carol's onward payment rides
    // along only with hers.
    let selected = ledger.select_pending(10).unwrap();
    let spends_funding = selected
        .iter()
        .filter(|tx| tx.hash == to_bob.hash || tx.hash == to_carol.hash)
        .count();
    assert_eq!(spends_funding, 1);

    let refs: Vec<&Transaction> = selected.iter().collect();
    mine(&ledger, &refs);
    assert!(ledger.mempool().is_empty());
    assert_eq!(ledger.balance(&alice.address()).unwrap(), 0);
}

#[test]
fn test_partially_spent_outputs_are_tombstoned() {
    let storage = Storage::open_temporary().unwrap();
    let (miner, admin) = (Keypair::generate(), Keypair::generate());
    let ledger = Ledger::open(&storage, config(&miner, &admin)).unwrap();

    let alice = Keypair::generate();
    let bob = Keypair::generate();
    fund(&ledger, &admin, &alice, 100);

    let to_bob = ledger.create_transaction(&alice, bob.address(), 30).unwrap();
    mine(&ledger, &[&to_bob]);

    // Bob spends his output; alice's change in the same record remains.
    let back = ledger
        .create_transaction(&bob, alice.address(), 30)
        .unwrap();
    mine(&ledger, &[&back]);

    assert_eq!(ledger.balance(&bob.address()).unwrap(), 0);
    assert_eq!(ledger.balance(&alice.address()).unwrap(), 100);

    let replay = Transaction::build(
        &[powchain_core::UTxOutput {
            tx_hash: to_bob.hash,
            out_idx: 0,
            amount: 30,
        }],
        30,
        &bob,
        bob.address(),
    )
    .unwrap();
    assert!(matches!(
        ledger.submit_transaction(&replay),
        Err(LedgerError::Validation(ValidationError::OutputSpent { .. }))
    ));
}

#[test]
fn test_import_block_from_peer() {
    let (miner, admin) = (Keypair::generate(), Keypair::generate());

    let local_storage = Storage::open_temporary().unwrap();
    let local = Ledger::open(&local_storage, config(&miner, &admin)).unwrap();
    let peer_storage = Storage::open_temporary().unwrap();
    let peer = Ledger::open(&peer_storage, config(&miner, &admin)).unwrap();

    let alice = Keypair::generate();
    let mint = local
        .create_transaction(&admin, alice.address(), 75)
        .unwrap();
    let block = mine(&local, &[&mint]);

    let wire = serde_json::to_string(&block.clone().without_references()).unwrap();
    let received: Block = serde_json::from_str(&wire).unwrap();
    peer.import_block(&received).unwrap();

    assert_eq!(peer.head(), block.hash());
    assert_eq!(peer.balance(&alice.address()).unwrap(), 75);

    assert!(matches!(
        peer.import_block(&received),
        Err(LedgerError::Validation(ValidationError::StalePrevHash { .. }))
    ));
}

#[test]
fn test_tampered_block_rejected() {
    let (miner, admin) = (Keypair::generate(), Keypair::generate());

    let local_storage = Storage::open_temporary().unwrap();
    let local = Ledger::open(&local_storage, config(&miner, &admin)).unwrap();
    let peer_storage = Storage::open_temporary().unwrap();
    let peer = Ledger::open(&peer_storage, config(&miner, &admin)).unwrap();

    let mint = local
        .create_transaction(&admin, Keypair::generate().address(), 5)
        .unwrap();
    let block = mine(&local, &[&mint]);

    let mut forged = block.clone();
    forged.header.nonce = forged.header.nonce.wrapping_add(1);
    assert!(peer.import_block(&forged).is_err());

    let mut greedy = block.clone();
    greedy.body.txs[0].outputs[0].amount = 500;
    assert!(matches!(
        peer.import_block(&greedy),
        Err(LedgerError::Validation(ValidationError::InvalidHash))
            | Err(LedgerError::Validation(ValidationError::InvalidDataHash))
    ));

    assert_eq!(peer.head(), GENESIS_HASH);
    peer.import_block(&block).unwrap();
}

#[test]
fn test_head_resolution_linear_chain() {
    let storage = Storage::open_temporary().unwrap();
    let (miner, admin) = (Keypair::generate(), Keypair::generate());

    let last = {
        let ledger = Ledger::open(&storage, config(&miner, &admin)).unwrap();
        (0..3).map(|_| mine(&ledger, &[]).hash()).last().unwrap()
    };

    let ledger = Ledger::open(&storage, config(&miner, &admin)).unwrap();
    assert_eq!(ledger.resolve_chain_head().unwrap(), last);
    assert_eq!(ledger.head(), last);
}

#[test]
fn test_head_resolution_competing_tips() {
    let storage = Storage::open_temporary().unwrap();
    let (miner, admin) = (Keypair::generate(), Keypair::generate());
    drop(Ledger::open(&storage, config(&miner, &admin)).unwrap());

    // Two blocks both claiming genesis as parent.
    let chain = ChainStore::new(&storage);
    for seed in 0..2u8 {
        let mut block =
            Block::new(Keypair::generate().address(), vec![], GENESIS_HASH, 0, 10).unwrap();
        block.header.nonce = u64::from(seed);
        let hash = block.header.make_hash();
        block.seal(u64::from(seed), hash);
        chain.put_header(&block.header).unwrap();
    }

    assert!(matches!(
        Ledger::open(&storage, config(&miner, &admin)),
        Err(LedgerError::CorruptChain(_))
    ));
}

#[test]
fn test_head_resolution_orphan_chain() {
    let storage = Storage::open_temporary().unwrap();
    let (miner, admin) = (Keypair::generate(), Keypair::generate());
    drop(Ledger::open(&storage, config(&miner, &admin)).unwrap());

    // b1 names a parent that was never stored; b2 builds on b1.
    let chain = ChainStore::new(&storage);
    let mut prev = Hash([9; 32]);
    for _ in 0..2 {
        let mut block = Block::new(Keypair::generate().address(), vec![], prev, 0, 10).unwrap();
        let hash = block.header.make_hash();
        block.seal(0, hash);
        chain.put_header(&block.header).unwrap();
        prev = hash;
    }

    assert!(matches!(
        Ledger::open(&storage, config(&miner, &admin)),
        Err(LedgerError::CorruptChain(_))
    ));
}

#[test]
fn test_mining_streams_candidates() {
    let storage = Storage::open_temporary().unwrap();
    let (miner, admin) = (Keypair::generate(), Keypair::generate());
    let mut config = config(&miner, &admin);
    config.difficulty = 16;
    config.pow.workers = 1;
    config.pow.sample_interval = 1;
    let ledger = Ledger::open(&storage, config).unwrap();

    let (tx, rx) = channel::bounded(64);
    let search = CpuMiner::new(ledger.config().pow.clone());
    let block = ledger
        .mine_block_with(&search, &[], &CancelToken::new(), Some(&tx))
        .unwrap();
    drop(tx);

    let sampled: Vec<Hash> = rx.try_iter().collect();
    assert!(!sampled.is_empty());
    assert!(sampled
        .iter()
        .all(|hash| leading_zero_bits(hash.as_bytes()) < 16 && *hash != block.hash()));
    assert_eq!(ledger.head(), block.hash());
}

#[test]
fn test_mining_cancelled_from_another_thread() {
    let storage = Storage::open_temporary().unwrap();
    let (miner, admin) = (Keypair::generate(), Keypair::generate());
    let mut config = config(&miner, &admin);
    config.difficulty = 255;
    let ledger = Ledger::open(&storage, config).unwrap();

    let cancel = CancelToken::new();
    let timeout = cancel.clone();
    let timer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        timeout.cancel();
    });

    let result = ledger.mine_block(&[], &cancel);
    timer.join().unwrap();

    assert!(matches!(result, Err(LedgerError::Cancelled)));
    assert_eq!(ledger.head(), GENESIS_HASH);
}
