//! Proof-of-work nonce search.
//!
//! [`CpuMiner`] splits the nonce space into fixed-size batches handed out by
//! a single coordinator. Workers hash `input || nonce_LE` until one of them
//! finds a hash with enough leading zero bits, the caller cancels, or the
//! allocator runs out of nonces.
//!
//! ```text
//!              ┌─────────────────────┐
//!   ranges ◄───┤ coordinator         │◄─── events (BatchDone / Exited)
//!     │        │  - BatchAllocator   │          ▲
//!     ▼        └─────────────────────┘          │
//!  ┌────────┐ ┌────────┐ ┌────────┐             │
//!  │worker 0│ │worker 1│ │worker N│ ────────────┘
//!  └───┬────┘ └───┬────┘ └───┬────┘
//!      └──────────┼──────────┘
//!        result (first writer wins), candidates (try_send)
//! ```

use crossbeam::channel::{bounded, unbounded, Receiver, Sender};
use powchain_core::{check_prefix, Hash};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use thiserror::Error;
use tracing::{debug, info};

/// Errors that end a nonce search without a solution.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PowError {
    #[error("nonce search cancelled")]
    Cancelled,

    #[error("nonce space exhausted without a solution")]
    NonceSpaceExhausted,

    #[error("a search worker panicked")]
    WorkerPanicked,
}

pub type Result<T> = std::result::Result<T, PowError>;

/// A nonce whose hash satisfies the difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Solution {
    pub hash: Hash,
    pub nonce: u64,
}

/// Shared cancellation flag.
///
/// Clones observe the same flag; cancelling is permanent.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Nonce search tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PowConfig {
    /// Worker threads; 0 uses the available parallelism.
    pub workers: usize,
    /// Nonces handed to a worker at a time.
    pub batch_size: u64,
    /// Every `sample_interval`-th nonce is offered as a candidate.
    pub sample_interval: u64,
    /// Nonces at or above this value are never tried.
    pub nonce_limit: u64,
}

impl Default for PowConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            batch_size: 5000,
            sample_interval: 100,
            nonce_limit: u64::MAX,
        }
    }
}

impl PowConfig {
    fn worker_count(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

/// Hands out consecutive nonce ranges of a fixed size.
#[derive(Debug)]
pub struct BatchAllocator {
    next_nonce: u64,
    batch_size: u64,
    limit: u64,
}

impl BatchAllocator {
    pub fn new(batch_size: u64, limit: u64) -> Self {
        Self {
            next_nonce: 0,
            batch_size: batch_size.max(1),
            limit,
        }
    }

    /// The next unassigned range, or `None` once `limit` is reached.
    pub fn next_batch(&mut self) -> Option<Range<u64>> {
        if self.next_nonce >= self.limit {
            return None;
        }
        let start = self.next_nonce;
        let end = start.saturating_add(self.batch_size).min(self.limit);
        self.next_nonce = end;
        Some(start..end)
    }

    /// First nonce not yet handed out.
    pub fn next_nonce(&self) -> u64 {
        self.next_nonce
    }
}

/// A backend able to search for a proof-of-work nonce.
pub trait NonceSearch {
    /// Search for a nonce such that `SHA256(hash_input || nonce_LE)` has
    /// `difficulty` leading zero bits, offering sampled hashes on
    /// `candidates` without ever blocking on it.
    fn search_with_candidates(
        &self,
        hash_input: &[u8],
        difficulty: u8,
        cancel: &CancelToken,
        candidates: Option<&Sender<Hash>>,
    ) -> Result<Solution>;

    fn search(&self, hash_input: &[u8], difficulty: u8, cancel: &CancelToken) -> Result<Solution> {
        self.search_with_candidates(hash_input, difficulty, cancel, None)
    }
}

enum WorkerEvent {
    BatchDone(usize),
    Exited(usize),
}

/// State shared by the workers of one search.
struct SearchContext<'a> {
    prefix: Sha256,
    difficulty: u8,
    sample_interval: u64,
    cancel: &'a CancelToken,
    found: AtomicBool,
    results: Sender<Solution>,
    candidates: Option<&'a Sender<Hash>>,
}

impl SearchContext<'_> {
    fn stopped(&self) -> bool {
        self.cancel.is_cancelled() || self.found.load(Ordering::SeqCst)
    }

    fn run_worker(&self, id: usize, ranges: Receiver<Range<u64>>, events: Sender<WorkerEvent>) {
        'batches: while let Ok(range) = ranges.recv() {
            for nonce in range {
                if self.stopped() {
                    break 'batches;
                }

                let mut hasher = self.prefix.clone();
                hasher.update(nonce.to_le_bytes());
                let hash = Hash(hasher.finalize().into());

                if check_prefix(hash.as_bytes(), self.difficulty) {
                    if self
                        .found
                        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                        .is_ok()
                        && !self.cancel.is_cancelled()
                    {
                        let _ = self.results.try_send(Solution { hash, nonce });
                    }
                    break 'batches;
                }

                if nonce % self.sample_interval == 0 {
                    self.offer_candidate(hash);
                }
            }

            if events.send(WorkerEvent::BatchDone(id)).is_err() {
                break;
            }
        }

        let _ = events.send(WorkerEvent::Exited(id));
    }

    fn offer_candidate(&self, hash: Hash) {
        let Some(candidates) = self.candidates else {
            return;
        };
        if self.stopped() {
            return;
        }
        // Dropped unless a receiver is waiting right now.
        let _ = candidates.try_send(hash);
    }
}

/// Multi-threaded CPU implementation of [`NonceSearch`].
#[derive(Debug, Clone, Default)]
pub struct CpuMiner {
    config: PowConfig,
}

impl CpuMiner {
    pub fn new(config: PowConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PowConfig {
        &self.config
    }
}

impl NonceSearch for CpuMiner {
    fn search_with_candidates(
        &self,
        hash_input: &[u8],
        difficulty: u8,
        cancel: &CancelToken,
        candidates: Option<&Sender<Hash>>,
    ) -> Result<Solution> {
        let workers = self.config.worker_count();
        let (result_tx, result_rx) = bounded(1);
        let ctx = SearchContext {
            prefix: Sha256::new_with_prefix(hash_input),
            difficulty,
            sample_interval: self.config.sample_interval.max(1),
            cancel,
            found: AtomicBool::new(false),
            results: result_tx,
            candidates,
        };
        let mut allocator = BatchAllocator::new(self.config.batch_size, self.config.nonce_limit);

        debug!(workers, difficulty, "starting nonce search");

        let panicked = thread::scope(|scope| {
            let (event_tx, event_rx) = unbounded();
            let mut range_txs = Vec::with_capacity(workers);
            let mut handles = Vec::with_capacity(workers);

            for id in 0..workers {
                let (range_tx, range_rx) = bounded(1);
                range_txs.push(Some(range_tx));
                let events = event_tx.clone();
                let ctx = &ctx;
                handles.push(scope.spawn(move || ctx.run_worker(id, range_rx, events)));
            }
            drop(event_tx);

            // A worker whose range sender is dropped sees its channel close
            // and exits.
            let mut dispatch = |id: usize, range_txs: &mut Vec<Option<Sender<Range<u64>>>>| {
                let batch = if ctx.stopped() {
                    None
                } else {
                    allocator.next_batch()
                };
                match (batch, range_txs[id].as_ref()) {
                    (Some(range), Some(tx)) => {
                        if tx.send(range).is_err() {
                            range_txs[id] = None;
                        }
                    }
                    _ => range_txs[id] = None,
                }
            };

            for id in 0..workers {
                dispatch(id, &mut range_txs);
            }

            let mut live = workers;
            while live > 0 {
                match event_rx.recv() {
                    Ok(WorkerEvent::BatchDone(id)) => dispatch(id, &mut range_txs),
                    Ok(WorkerEvent::Exited(id)) => {
                        range_txs[id] = None;
                        live -= 1;
                    }
                    Err(_) => break,
                }
            }
            drop(range_txs);

            handles
                .into_iter()
                .map(|handle| handle.join())
                .filter(|joined| joined.is_err())
                .count()
                > 0
        });

        if let Ok(solution) = result_rx.try_recv() {
            info!(
                nonce = solution.nonce,
                hash = %solution.hash,
                tried = allocator.next_nonce(),
                "found proof of work"
            );
            return Ok(solution);
        }
        if panicked {
            return Err(PowError::WorkerPanicked);
        }
        if cancel.is_cancelled() {
            debug!(tried = allocator.next_nonce(), "nonce search cancelled");
            return Err(PowError::Cancelled);
        }
        Err(PowError::NonceSpaceExhausted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use powchain_core::hash_with_nonce;
    use std::time::Duration;

    fn miner(workers: usize) -> CpuMiner {
        CpuMiner::new(PowConfig {
            workers,
            batch_size: 500,
            ..PowConfig::default()
        })
    }

    #[test]
    fn test_allocator_batches() {
        let mut alloc = BatchAllocator::new(10, 25);
        assert_eq!(alloc.next_batch(), Some(0..10));
        assert_eq!(alloc.next_batch(), Some(10..20));
        assert_eq!(alloc.next_batch(), Some(20..25));
        assert_eq!(alloc.next_batch(), None);
        assert_eq!(alloc.next_nonce(), 25);
    }

    #[test]
    fn test_allocator_saturates() {
        let mut alloc = BatchAllocator::new(10, u64::MAX);
        alloc.next_nonce = u64::MAX - 3;
        assert_eq!(alloc.next_batch(), Some(u64::MAX - 3..u64::MAX));
        assert_eq!(alloc.next_batch(), None);
    }

    #[test]
    fn test_search_finds_valid_nonce() {
        for workers in [1, 4] {
            for difficulty in [0u8, 4, 8] {
                let input = format!("block-{difficulty}").into_bytes();
                let solution = miner(workers)
                    .search(&input, difficulty, &CancelToken::new())
                    .unwrap();

                assert!(check_prefix(solution.hash.as_bytes(), difficulty));
                assert_eq!(hash_with_nonce(&input, solution.nonce), solution.hash);
            }
        }
    }

    #[test]
    fn test_cancelled_before_start() {
        let cancel = CancelToken::new();
        cancel.cancel();

        let result = miner(2).search(b"input", 8, &cancel);
        assert_eq!(result, Err(PowError::Cancelled));
    }

    #[test]
    fn test_cancel_during_search() {
        let cancel = CancelToken::new();
        let (cand_tx, cand_rx) = bounded(0);

        let remote = cancel.clone();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            remote.cancel();
        });

        // 255 bits is unreachable in practice.
        let result = miner(3).search_with_candidates(b"input", 255, &cancel, Some(&cand_tx));
        canceller.join().unwrap();

        assert_eq!(result, Err(PowError::Cancelled));
        // Every worker has exited, so nothing can be waiting to send.
        assert!(cand_rx.try_recv().is_err());
    }

    #[test]
    fn test_nonce_space_exhausted() {
        let miner = CpuMiner::new(PowConfig {
            workers: 2,
            batch_size: 100,
            nonce_limit: 1000,
            ..PowConfig::default()
        });
        let result = miner.search(b"input", 255, &CancelToken::new());
        assert_eq!(result, Err(PowError::NonceSpaceExhausted));
    }

    #[test]
    fn test_candidates_are_sampled_hashes() {
        let miner = CpuMiner::new(PowConfig {
            workers: 2,
            batch_size: 1000,
            sample_interval: 100,
            nonce_limit: 20_000,
        });
        let (cand_tx, cand_rx) = bounded::<Hash>(0);

        let sampled: Vec<Hash> = (0..20_000u64)
            .step_by(100)
            .map(|n| hash_with_nonce(b"input", n))
            .collect();

        let collector = thread::spawn(move || cand_rx.iter().collect::<Vec<_>>());
        let result = miner.search_with_candidates(b"input", 255, &CancelToken::new(), Some(&cand_tx));
        drop(cand_tx);
        let received = collector.join().unwrap();

        assert_eq!(result, Err(PowError::NonceSpaceExhausted));
        assert!(received.len() <= sampled.len());
        assert!(received.iter().all(|hash| sampled.contains(hash)));
    }

    #[test]
    fn test_solution_without_candidate_receiver() {
        let (cand_tx, cand_rx) = bounded::<Hash>(0);
        drop(cand_rx);

        let solution = miner(2)
            .search_with_candidates(b"input", 6, &CancelToken::new(), Some(&cand_tx))
            .unwrap();
        assert!(check_prefix(solution.hash.as_bytes(), 6));
    }
}
