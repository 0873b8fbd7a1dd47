use log::debug;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use super::{GENESIS_PREVIOUS_HASH, GENESIS_TIMESTAMP};
use crate::transaction::{Transaction, now_secs};

/// How many nonces are tried between two cancellation checks.
const CANCEL_CHECK_INTERVAL: u64 = 1024;

/// A single block in the blockchain holding a batch of transactions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub transactions: Vec<Transaction>,
    pub timestamp: f64, // Unix seconds (UTC)
    pub previous_hash: String,
    pub nonce: u64,   // Proof-of-Work nonce
    pub hash: String, // Cached hash of the block
    pub difficulty: u32,
}

impl Block {
    /// Create the genesis block. It carries no transactions and no work, and is
    /// identical on every node.
    pub fn genesis() -> Self {
        let mut block = Self {
            index: 0,
            transactions: Vec::new(),
            timestamp: GENESIS_TIMESTAMP,
            previous_hash: GENESIS_PREVIOUS_HASH.to_string(),
            nonce: 0,
            hash: String::new(),
            difficulty: 0,
        };
        block.hash = block.compute_hash();
        block
    }

    /// Create a new block (not mined yet). Call `mine()` to perform PoW.
    pub fn new(
        index: u64,
        previous_hash: String,
        transactions: Vec<Transaction>,
        difficulty: u32,
    ) -> Self {
        let mut block = Self {
            index,
            transactions,
            timestamp: now_secs(),
            previous_hash,
            nonce: 0,
            hash: String::new(),
            difficulty,
        };
        block.hash = block.compute_hash();
        block
    }

    /// SHA-256 over a canonical JSON encoding of every field except `hash`
    /// and `difficulty`. Keys are written in lexicographic order.
    pub fn compute_hash(&self) -> String {
        let txs: Vec<serde_json::Value> = self
            .transactions
            .iter()
            .map(Transaction::canonical_value)
            .collect();
        let preimage = serde_json::json!({
            "index": self.index,
            "nonce": self.nonce,
            "previous_hash": self.previous_hash,
            "timestamp": self.timestamp,
            "transactions": txs,
        });
        let mut hasher = Sha256::new();
        hasher.update(preimage.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Perform Proof-of-Work from nonce 0 until the hash starts with
    /// `difficulty` zeros. Returns `false` if `cancel` fired first, in which
    /// case the block is left unsolved.
    pub fn mine(&mut self, cancel: &CancellationToken) -> bool {
        self.nonce = 0;
        loop {
            self.hash = self.compute_hash();
            if meets_difficulty(&self.hash, self.difficulty) {
                debug!(
                    "MINER - solved block #{} nonce={} hash={}",
                    self.index, self.nonce, self.hash
                );
                return true;
            }
            self.nonce += 1;
            if self.nonce % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
                debug!(
                    "MINER - abandoned block #{} after {} nonces",
                    self.index, self.nonce
                );
                return false;
            }
        }
    }

    /// Cached hash matches the contents and satisfies the block's own
    /// difficulty. Linkage is the chain's concern.
    pub fn has_valid_work(&self) -> bool {
        self.hash == self.compute_hash() && meets_difficulty(&self.hash, self.difficulty)
    }
}

pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
    let needed = difficulty as usize;
    hash.len() >= needed && hash.bytes().take(needed).all(|c| c == b'0')
}
