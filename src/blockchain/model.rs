use log::{info, warn};
use serde::Serialize;
use std::collections::HashSet;

use super::balances::{Balances, Overspend};
use super::{Block, DEFAULT_DIFFICULTY, DEFAULT_MINING_REWARD, DEFAULT_STARTING_BALANCE};
use crate::error::ChainError;
use crate::transaction::{Transaction, TxKey};

/// Economic and work parameters shared by every ledger of a node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LedgerParams {
    /// Minimum leading zeros a block must carry to be accepted.
    pub difficulty: u32,
    pub mining_reward: f64,
    pub starting_balance: f64,
}

impl Default for LedgerParams {
    fn default() -> Self {
        Self {
            difficulty: DEFAULT_DIFFICULTY,
            mining_reward: DEFAULT_MINING_REWARD,
            starting_balance: DEFAULT_STARTING_BALANCE,
        }
    }
}

/// A committed transaction together with the block that holds it.
#[derive(Debug, Clone, Serialize)]
pub struct AddressTransaction {
    pub transaction: Transaction,
    pub block_index: u64,
    pub block_hash: String,
}

/// In-memory Proof-of-Work ledger.
///
/// Besides the blocks it keeps two projections that are rebuilt whenever the
/// chain is replaced: replayed balances and an index of committed
/// transactions used for duplicate rejection.
#[derive(Debug, Clone)]
pub struct Blockchain {
    pub chain: Vec<Block>,
    params: LedgerParams,
    balances: Balances,
    committed_hashes: HashSet<String>,
    committed_keys: HashSet<TxKey>,
}

impl Blockchain {
    /// Initialize a new blockchain with a genesis block.
    pub fn new(params: LedgerParams) -> Self {
        let genesis = Block::genesis();
        info!("Genesis block created: {}", genesis.hash);
        Self {
            chain: vec![genesis],
            params,
            balances: Balances::new(params.starting_balance),
            committed_hashes: HashSet::new(),
            committed_keys: HashSet::new(),
        }
    }

    /// Build a ledger from foreign blocks, validating them in full first.
    /// The genesis block is exempt from work and balances but must at least
    /// be self-consistent, or the adopting node would consider itself corrupted.
    pub fn from_blocks(params: LedgerParams, blocks: Vec<Block>) -> Result<Self, ChainError> {
        match blocks.first() {
            None => return Err(ChainError::EmptyChain),
            Some(genesis) if !is_sound_genesis(genesis) => return Err(ChainError::CorruptGenesis),
            Some(_) => {}
        }
        let balances = validate_blocks(&params, &blocks)?;
        let mut bc = Self {
            chain: blocks,
            params,
            balances,
            committed_hashes: HashSet::new(),
            committed_keys: HashSet::new(),
        };
        bc.rebuild_index();
        Ok(bc)
    }

    fn rebuild_index(&mut self) {
        self.committed_hashes.clear();
        self.committed_keys.clear();
        for tx in self.chain.iter().flat_map(|b| b.transactions.iter()) {
            self.committed_hashes.insert(tx.compute_hash());
            self.committed_keys.insert(tx.key());
        }
    }

    /// Return the last block in the chain.
    pub fn last_block(&self) -> &Block {
        self.chain
            .last()
            .expect("Blockchain should always have at least the genesis block")
    }

    /// Validate the entire chain: hashes, linkage, PoW and balance replay.
    pub fn validate(&self) -> Result<(), ChainError> {
        validate_blocks(&self.params, &self.chain).map(|_| ())
    }

    pub fn is_chain_valid(&self) -> bool {
        match self.validate() {
            Ok(()) => true,
            Err(e) => {
                warn!("Chain validation failed: {}", e);
                false
            }
        }
    }

    /// Whether the local genesis block still checks out against itself.
    pub fn genesis_intact(&self) -> bool {
        self.chain.first().is_some_and(is_sound_genesis)
    }

    /// Unmined block over `transactions` plus a fresh reward for `miner_address`.
    pub fn candidate_block(&self, mut transactions: Vec<Transaction>, miner_address: &str) -> Block {
        transactions.push(Transaction::reward(miner_address, self.params.mining_reward));
        let last = self.last_block();
        Block::new(
            last.index + 1,
            last.hash.clone(),
            transactions,
            self.params.difficulty,
        )
    }

    /// Split `transactions` into those the committed balances can cover when
    /// applied in order, and those that would overspend.
    pub fn split_affordable(
        &self,
        transactions: Vec<Transaction>,
    ) -> (Vec<Transaction>, Vec<(Transaction, Overspend)>) {
        let mut balances = self.balances.clone();
        let mut affordable = Vec::with_capacity(transactions.len());
        let mut refused = Vec::new();
        for tx in transactions {
            match balances.apply(&tx) {
                Ok(()) => affordable.push(tx),
                Err(o) => refused.push((tx, o)),
            }
        }
        (affordable, refused)
    }

    /// Append a block that extends the current tip. The block must pass the
    /// same checks as any block during full validation.
    pub fn append_block(&mut self, block: Block) -> Result<(), ChainError> {
        check_block(&self.params, self.last_block(), &block)?;
        let mut balances = self.balances.clone();
        replay_block(&mut balances, &block)?;

        for tx in &block.transactions {
            self.committed_hashes.insert(tx.compute_hash());
            self.committed_keys.insert(tx.key());
        }
        self.balances = balances;
        info!(
            "Block #{} appended (hash={}, txs={})",
            block.index,
            block.hash,
            block.transactions.len()
        );
        self.chain.push(block);
        Ok(())
    }

    /// Swap in a ledger that was validated by `from_blocks`.
    pub fn replace_chain(&mut self, other: Blockchain) {
        info!(
            "Replacing chain of {} blocks with {} blocks",
            self.chain.len(),
            other.chain.len()
        );
        *self = other;
    }

    pub fn contains_transaction(&self, hash: &str, key: &TxKey) -> bool {
        self.committed_hashes.contains(hash) || self.committed_keys.contains(key)
    }

    pub fn balance(&self, address: &str) -> f64 {
        self.balances.get(address)
    }

    pub fn transactions_for(&self, address: &str) -> Vec<AddressTransaction> {
        self.chain
            .iter()
            .flat_map(|block| {
                block
                    .transactions
                    .iter()
                    .filter(|tx| tx.sender == address || tx.recipient == address)
                    .map(|tx| AddressTransaction {
                        transaction: tx.clone(),
                        block_index: block.index,
                        block_hash: block.hash.clone(),
                    })
            })
            .collect()
    }

    pub fn get_block(&self, index: usize) -> Option<&Block> {
        self.chain.get(index)
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn difficulty(&self) -> u32 {
        self.params.difficulty
    }

    pub fn params(&self) -> LedgerParams {
        self.params
    }
}

fn is_sound_genesis(block: &Block) -> bool {
    block.index == 0 && block.hash == block.compute_hash()
}

/// Full validation of a block sequence, short-circuiting on the first
/// failure. Genesis is exempt; an empty or genesis-only chain is valid.
/// Returns the replayed balances.
pub fn validate_blocks(params: &LedgerParams, blocks: &[Block]) -> Result<Balances, ChainError> {
    let mut balances = Balances::new(params.starting_balance);
    for pair in blocks.windows(2) {
        let (prev, current) = (&pair[0], &pair[1]);
        check_block(params, prev, current)?;
        replay_block(&mut balances, current)?;
    }
    Ok(balances)
}

/// Structural checks of `block` as the successor of `prev`, in order: content
/// hash, linkage, index, work.
fn check_block(params: &LedgerParams, prev: &Block, block: &Block) -> Result<(), ChainError> {
    let index = block.index;
    if block.hash != block.compute_hash() {
        return Err(ChainError::HashMismatch { index });
    }
    if block.previous_hash != prev.hash {
        return Err(ChainError::BrokenLink { index });
    }
    if block.index != prev.index + 1 {
        return Err(ChainError::IndexMismatch {
            index,
            expected: prev.index + 1,
        });
    }
    if block.difficulty < params.difficulty {
        return Err(ChainError::DifficultyTooLow {
            index,
            difficulty: block.difficulty,
            required: params.difficulty,
        });
    }
    if !block.has_valid_work() {
        return Err(ChainError::InsufficientWork {
            index,
            difficulty: block.difficulty,
        });
    }
    Ok(())
}

fn replay_block(balances: &mut Balances, block: &Block) -> Result<(), ChainError> {
    for tx in &block.transactions {
        balances.apply(tx).map_err(|o: Overspend| ChainError::InsufficientFunds {
            index: block.index,
            sender: o.sender,
            balance: o.balance,
            amount: o.amount,
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    fn params() -> LedgerParams {
        LedgerParams {
            difficulty: 1,
            ..LedgerParams::default()
        }
    }

    fn mined(bc: &Blockchain, txs: Vec<Transaction>) -> Block {
        let mut block = bc.candidate_block(txs, "miner");
        assert!(block.mine(&CancellationToken::new()));
        block
    }

    fn batch(sender: &str, amounts: [f64; 3]) -> Vec<Transaction> {
        amounts
            .iter()
            .map(|a| Transaction::new(sender, "bob", *a))
            .collect()
    }

    #[test]
    fn fresh_chain_is_valid() {
        let bc = Blockchain::new(params());
        assert_eq!(bc.len(), 1);
        assert!(bc.is_chain_valid());
        assert!(bc.genesis_intact());
        assert!(validate_blocks(&params(), &[]).is_ok());
    }

    #[test]
    fn appended_blocks_link_and_carry_work() {
        let mut bc = Blockchain::new(params());
        for _ in 0..3 {
            let b = mined(&bc, batch("alice", [1.0, 2.0, 3.0]));
            bc.append_block(b).unwrap();
        }
        assert!(bc.is_chain_valid());
        for pair in bc.chain.windows(2) {
            assert_eq!(pair[1].previous_hash, pair[0].hash);
            assert_eq!(pair[1].index, pair[0].index + 1);
            assert!(pair[1].hash.starts_with('0'));
        }
        // alice starts at 100 and spends 6 per block; miner earns 1 per block
        assert_eq!(bc.balance("alice"), 82.0);
        assert_eq!(bc.balance("bob"), 18.0);
        assert_eq!(bc.balance("miner"), 3.0);
    }

    #[test]
    fn tampered_amount_is_caught_as_hash_mismatch() {
        let mut bc = Blockchain::new(params());
        bc.append_block(mined(&bc, batch("alice", [1.0, 2.0, 3.0])))
            .unwrap();
        bc.chain[1].transactions[0].amount = 90.0;
        assert_eq!(bc.validate(), Err(ChainError::HashMismatch { index: 1 }));
        assert!(!bc.is_chain_valid());
    }

    #[test]
    fn broken_link_is_rejected() {
        let mut bc = Blockchain::new(params());
        bc.append_block(mined(&bc, batch("alice", [1.0, 2.0, 3.0])))
            .unwrap();
        let mut orphan = bc.candidate_block(batch("carol", [1.0, 2.0, 3.0]), "miner");
        orphan.previous_hash = "f".repeat(64);
        orphan.mine(&CancellationToken::new());

        let mut blocks = bc.chain.clone();
        blocks.push(orphan);
        assert_eq!(
            validate_blocks(&params(), &blocks).unwrap_err(),
            ChainError::BrokenLink { index: 2 }
        );
    }

    #[test]
    fn missing_work_is_rejected() {
        let bc = Blockchain::new(LedgerParams {
            difficulty: 3,
            ..params()
        });
        let mut lazy = bc.candidate_block(batch("alice", [1.0, 2.0, 3.0]), "miner");
        // rehash until the hash deliberately misses the target
        while lazy.hash.starts_with("000") {
            lazy.nonce += 1;
            lazy.hash = lazy.compute_hash();
        }
        let blocks = vec![bc.chain[0].clone(), lazy];
        assert!(matches!(
            validate_blocks(&bc.params(), &blocks),
            Err(ChainError::InsufficientWork { index: 1, .. })
        ));
    }

    #[test]
    fn lowered_difficulty_is_rejected() {
        let easy = Blockchain::new(params());
        let block = mined(&easy, batch("alice", [1.0, 2.0, 3.0]));
        let strict = LedgerParams {
            difficulty: 2,
            ..params()
        };
        let blocks = vec![easy.chain[0].clone(), block];
        assert!(matches!(
            validate_blocks(&strict, &blocks),
            Err(ChainError::DifficultyTooLow { required: 2, .. })
        ));
    }

    #[test]
    fn overspend_invalidates_whole_chain() {
        let mut bc = Blockchain::new(params());
        bc.append_block(mined(&bc, batch("alice", [1.0, 2.0, 3.0])))
            .unwrap();

        let forced = mined(&bc, vec![Transaction::new("mallory", "bob", 1000.0)]);
        assert!(matches!(
            bc.clone().append_block(forced.clone()),
            Err(ChainError::InsufficientFunds { index: 2, .. })
        ));

        bc.chain.push(forced);
        assert!(!bc.is_chain_valid());
    }

    #[test]
    fn split_affordable_replays_in_order() {
        let bc = Blockchain::new(params());
        let (ok, refused) = bc.split_affordable(vec![
            Transaction::new("alice", "bob", 60.0),
            Transaction::new("alice", "bob", 50.0),
            Transaction::new("carol", "bob", 100.0),
        ]);
        assert_eq!(ok.len(), 2);
        assert_eq!(refused.len(), 1);
        assert_eq!(refused[0].1.balance, 40.0);
    }

    #[test]
    fn from_blocks_rebuilds_projections() {
        let mut source = Blockchain::new(params());
        source
            .append_block(mined(&source, batch("alice", [5.0, 6.0, 7.0])))
            .unwrap();

        let copy = Blockchain::from_blocks(params(), source.chain.clone()).unwrap();
        assert_eq!(copy.balance("alice"), 82.0);
        let tx = &source.chain[1].transactions[0];
        assert!(copy.contains_transaction(&tx.compute_hash(), &tx.key()));
        assert_eq!(copy.transactions_for("alice").len(), 3);
        assert_eq!(copy.transactions_for("miner")[0].block_index, 1);

        assert_eq!(
            Blockchain::from_blocks(params(), Vec::new()).unwrap_err(),
            ChainError::EmptyChain
        );
    }

    #[test]
    fn append_rejects_wrong_index() {
        let mut bc = Blockchain::new(params());
        let mut block = bc.candidate_block(batch("alice", [1.0, 2.0, 3.0]), "miner");
        block.index = 5;
        block.mine(&CancellationToken::new());
        assert_eq!(
            bc.append_block(block),
            Err(ChainError::IndexMismatch {
                index: 5,
                expected: 1
            })
        );
        assert_eq!(bc.len(), 1);
    }

    #[test]
    fn corrupted_genesis_is_detected() {
        let mut bc = Blockchain::new(params());
        bc.chain[0].nonce = 7;
        assert!(!bc.genesis_intact());
        // still "valid" as a chain: genesis is exempt from validation
        assert!(bc.is_chain_valid());
        assert_eq!(
            Blockchain::from_blocks(params(), bc.chain.clone()).unwrap_err(),
            ChainError::CorruptGenesis
        );
    }
}
