//! Outbound transport boundary: what the ledger engine needs from the network.

pub mod http;
pub mod peers;

use std::future::Future;

pub use http::HttpPeerClient;
pub use peers::PeerBook;

use crate::blockchain::Block;
use crate::error::PeerError;
use crate::transaction::Transaction;

pub const CHAIN_PATH: &str = "/api/v1/chain/";
pub const NEW_BLOCK_PATH: &str = "/api/v1/blocks/new/";
pub const NEW_TRANSACTION_PATH: &str = "/api/v1/transactions/new/";

/// Header marking a request as node-to-node gossip rather than client input.
pub const SOURCE_TYPE_HEADER: &str = "X-Source-Type";
pub const SOURCE_NODE_HEADER: &str = "X-Source-Node";
pub const NODE_BROADCAST: &str = "node_broadcast";

/// Calls the node makes into its peers.
pub trait PeerClient: Send + Sync + 'static {
    /// Fetch the full chain advertised by `peer`.
    fn fetch_chain(&self, peer: &str) -> impl Future<Output = Result<Vec<Block>, PeerError>> + Send;

    /// Send a freshly mined block to every peer. Returns how many accepted it.
    fn broadcast_block(&self, peers: &[String], block: &Block) -> impl Future<Output = usize> + Send;

    /// Forward a client-submitted transaction to every peer.
    fn broadcast_transaction(
        &self,
        peers: &[String],
        tx: &Transaction,
    ) -> impl Future<Output = usize> + Send;
}
