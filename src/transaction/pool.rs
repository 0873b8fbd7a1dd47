use log::{debug, info, warn};
use serde::Serialize;
use std::collections::{HashSet, VecDeque};

use super::model::{Transaction, TxKey, now_secs};
use crate::blockchain::Blockchain;
use crate::error::TxError;

/// How many rejected submissions are remembered for inspection.
pub const REJECTED_LOG_CAPACITY: usize = 1000;

/// Outcome of a submission.
#[derive(Debug, Clone, PartialEq)]
pub enum PoolResult {
    /// Stored. `batch_ready` is set when this submission made the open
    /// non-system count hit the batch size exactly and sealed a batch.
    Accepted { batch_ready: bool },
    Duplicate,
    Invalid(TxError),
}

#[derive(Debug, Clone, Serialize)]
pub struct RejectedTransaction {
    pub transaction: Transaction,
    pub reason: String,
    pub timestamp: f64,
}

#[derive(Debug, Clone)]
struct Pending {
    hash: String,
    key: TxKey,
    tx: Transaction,
}

/// Accepted-but-unmined transactions.
///
/// The moment the open list reaches the batch size it is sealed into a ready
/// batch, inside the same call that accepted the last transaction. A sealed
/// batch stays a unit until it is mined or its transactions are committed
/// elsewhere, so later arrivals can never push it past the trigger.
#[derive(Debug, Default)]
pub struct TxPool {
    ready: VecDeque<Vec<Pending>>,
    open: Vec<Pending>,
    hashes: HashSet<String>,
    keys: HashSet<TxKey>,
    rejected: VecDeque<RejectedTransaction>,
}

impl TxPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate shape, reject duplicates against the pool and the committed
    /// chain, then store. Balances are not consulted.
    pub fn submit(&mut self, tx: Transaction, chain: &Blockchain, batch_size: usize) -> PoolResult {
        let checked = if tx.is_reward() {
            Err(TxError::ReservedSender)
        } else {
            tx.validate()
        };
        if let Err(e) = checked {
            warn!("POOL - invalid transaction {:?}: {}", tx, e);
            self.reject(tx, e.to_string());
            return PoolResult::Invalid(e);
        }

        let hash = tx.compute_hash();
        let key = tx.key();
        if self.hashes.contains(&hash) || self.keys.contains(&key) {
            warn!("POOL - duplicate of a pending transaction: {}", hash);
            self.reject(tx, "duplicate transaction (pending)".into());
            return PoolResult::Duplicate;
        }
        if chain.contains_transaction(&hash, &key) {
            warn!("POOL - duplicate of a committed transaction: {}", hash);
            self.reject(tx, "duplicate transaction (committed)".into());
            return PoolResult::Duplicate;
        }

        info!(
            "POOL - accepted {} -> {} ({}) hash={}",
            tx.sender, tx.recipient, tx.amount, hash
        );
        self.hashes.insert(hash.clone());
        self.keys.insert(key.clone());
        self.open.push(Pending { hash, key, tx });

        let count = self.non_system_count();
        debug!("POOL - {} non-system open (batch {})", count, batch_size);
        let batch_ready = count == batch_size;
        if batch_ready {
            let batch = std::mem::take(&mut self.open);
            info!("POOL - sealed a batch of {}", batch.len());
            self.ready.push_back(batch);
        }
        PoolResult::Accepted { batch_ready }
    }

    pub fn reject(&mut self, transaction: Transaction, reason: String) {
        if self.rejected.len() == REJECTED_LOG_CAPACITY {
            self.rejected.pop_front();
        }
        self.rejected.push_back(RejectedTransaction {
            transaction,
            reason,
            timestamp: now_secs(),
        });
    }

    /// Non-system transactions not yet sealed into a batch.
    pub fn non_system_count(&self) -> usize {
        self.open.iter().filter(|p| !p.tx.is_reward()).count()
    }

    /// Whether a sealed batch is waiting for the miner.
    pub fn batch_ready(&self) -> bool {
        !self.ready.is_empty()
    }

    /// Remove the oldest sealed batch.
    pub fn take_batch(&mut self) -> Option<Vec<Transaction>> {
        let batch = self.ready.pop_front()?;
        Some(self.forget(batch))
    }

    /// Remove everything, sealed batches first, in arrival order.
    pub fn take_all(&mut self) -> Vec<Transaction> {
        let mut all: Vec<Pending> = self.ready.drain(..).flatten().collect();
        all.append(&mut self.open);
        self.forget(all)
    }

    fn forget(&mut self, entries: Vec<Pending>) -> Vec<Transaction> {
        entries
            .into_iter()
            .map(|p| {
                self.hashes.remove(&p.hash);
                self.keys.remove(&p.key);
                p.tx
            })
            .collect()
    }

    /// Put back a batch whose mining attempt was abandoned, sealed and ahead
    /// of everything else. Transactions that have since been committed, or
    /// resubmitted meanwhile, are dropped.
    pub fn requeue(&mut self, batch: Vec<Transaction>, chain: &Blockchain) -> usize {
        let mut restored = Vec::new();
        for tx in batch.into_iter().filter(|t| !t.is_reward()) {
            let hash = tx.compute_hash();
            let key = tx.key();
            if chain.contains_transaction(&hash, &key)
                || self.hashes.contains(&hash)
                || self.keys.contains(&key)
            {
                continue;
            }
            self.hashes.insert(hash.clone());
            self.keys.insert(key.clone());
            restored.push(Pending { hash, key, tx });
        }
        let count = restored.len();
        if count > 0 {
            self.ready.push_front(restored);
            info!("POOL - requeued {} transactions from an abandoned batch", count);
        }
        count
    }

    /// Drop pool entries whose hash or key appears in `txs`.
    pub fn purge(&mut self, txs: &[Transaction]) -> usize {
        let hashes: HashSet<String> = txs.iter().map(Transaction::compute_hash).collect();
        let keys: HashSet<TxKey> = txs.iter().map(Transaction::key).collect();
        self.retain(|p| !hashes.contains(&p.hash) && !keys.contains(&p.key))
    }

    /// Drop pool entries that are already committed in `chain`.
    pub fn purge_committed(&mut self, chain: &Blockchain) -> usize {
        self.retain(|p| !chain.contains_transaction(&p.hash, &p.key))
    }

    fn retain(&mut self, keep: impl Fn(&Pending) -> bool) -> usize {
        let mut dropped = Vec::new();
        for batch in self.ready.iter_mut().chain(std::iter::once(&mut self.open)) {
            let (kept, gone): (Vec<_>, Vec<_>) = batch.drain(..).partition(|p| keep(p));
            *batch = kept;
            dropped.extend(gone);
        }
        self.ready.retain(|batch| !batch.is_empty());
        let removed = self.forget(dropped).len();
        if removed > 0 {
            debug!("POOL - removed {} committed transactions", removed);
        }
        removed
    }

    /// Everything waiting, sealed batches first.
    pub fn pending(&self) -> Vec<Transaction> {
        self.entries().map(|p| p.tx.clone()).collect()
    }

    pub fn rejected(&self) -> Vec<RejectedTransaction> {
        self.rejected.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries().count()
    }

    pub fn is_empty(&self) -> bool {
        self.ready.is_empty() && self.open.is_empty()
    }

    fn entries(&self) -> impl Iterator<Item = &Pending> {
        self.ready.iter().flatten().chain(self.open.iter())
    }
}
