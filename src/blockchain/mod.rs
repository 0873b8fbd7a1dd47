pub mod balances;
pub mod block;
pub mod consensus;
pub mod model;

pub use block::Block;
pub use model::{AddressTransaction, Blockchain, LedgerParams};

/// Default Proof-of-Work difficulty (number of leading zeros).
pub const DEFAULT_DIFFICULTY: u32 = 4;

/// Reward credited to the miner of each block.
pub const DEFAULT_MINING_REWARD: f64 = 1.0;

/// Balance a sender holds the first time it appears in a replay.
pub const DEFAULT_STARTING_BALANCE: f64 = 100.0;

/// Non-system transactions that make up one block.
pub const DEFAULT_BATCH_SIZE: usize = 3;

/// Sender identifier of system-minted reward transactions.
pub const REWARD_SENDER: &str = "0";

/// `previous_hash` of the genesis block.
pub const GENESIS_PREVIOUS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Fixed so every node derives the same genesis block.
pub const GENESIS_TIMESTAMP: f64 = 0.0;
