use thiserror::Error;

/// A transaction that is not structurally well-formed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TxError {
    #[error("missing or empty field: {0}")]
    MissingField(&'static str),
    #[error("amount must be a number")]
    NonNumericAmount,
    #[error("amount must be positive and finite, got {0}")]
    NonPositiveAmount(f64),
    #[error("sender \"0\" is reserved for mining rewards")]
    ReservedSender,
}

/// Why a block or a whole chain was rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChainError {
    #[error("chain is empty")]
    EmptyChain,
    #[error("genesis block is corrupted")]
    CorruptGenesis,
    #[error("block {index}: stored hash does not match its contents")]
    HashMismatch { index: u64 },
    #[error("block {index}: previous_hash does not match the prior block")]
    BrokenLink { index: u64 },
    #[error("block {index}: expected index {expected}")]
    IndexMismatch { index: u64, expected: u64 },
    #[error("block {index}: hash does not meet difficulty {difficulty}")]
    InsufficientWork { index: u64, difficulty: u32 },
    #[error("block {index}: difficulty {difficulty} is below the required {required}")]
    DifficultyTooLow {
        index: u64,
        difficulty: u32,
        required: u32,
    },
    #[error("block {index}: {sender} holds {balance} but sends {amount}")]
    InsufficientFunds {
        index: u64,
        sender: String,
        balance: f64,
        amount: f64,
    },
}

/// Failure talking to a single peer. Never fatal to a consensus pass.
#[derive(Debug, Error)]
pub enum PeerError {
    #[error("peer {0} unreachable: {1}")]
    Unreachable(String, String),
    #[error("peer {0} timed out")]
    Timeout(String),
    #[error("peer {0} answered with status {1}")]
    Status(String, u16),
    #[error("peer {0} sent malformed data: {1}")]
    Malformed(String, String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Errors surfaced by the node's inbound operations.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("local ledger is corrupted, refusing to mutate state")]
    Corrupted,
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error("ledger lock poisoned")]
    LockPoisoned,
    #[error("mining task failed: {0}")]
    MiningTask(String),
    #[error("this node is not a miner")]
    NotMiner,
}

pub type NodeResult<T> = std::result::Result<T, NodeError>;
