pub mod model;
pub mod pool;

pub use model::{Transaction, TxKey, now_secs};
pub use pool::{PoolResult, RejectedTransaction, TxPool};
