use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{
    CHAIN_PATH, NEW_BLOCK_PATH, NEW_TRANSACTION_PATH, NODE_BROADCAST, PeerClient,
    SOURCE_NODE_HEADER, SOURCE_TYPE_HEADER,
};
use crate::blockchain::Block;
use crate::error::PeerError;
use crate::transaction::Transaction;

/// Shape of a peer's `GET /chain/` answer; extra fields are ignored.
#[derive(Deserialize)]
struct ChainPayload {
    length: usize,
    chain: Vec<Block>,
}

/// reqwest-backed peer transport. Every request is bounded by the client
/// timeout.
#[derive(Clone)]
pub struct HttpPeerClient {
    client: reqwest::Client,
    source: String,
}

impl HttpPeerClient {
    pub fn new(timeout: Duration, source: String) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, source })
    }

    async fn post_json<T: Serialize + ?Sized>(&self, peer: &str, path: &str, body: &T) -> Result<(), PeerError> {
        let url = format!("{peer}{path}");
        let resp = self
            .client
            .post(&url)
            .header(SOURCE_TYPE_HEADER, NODE_BROADCAST)
            .header(SOURCE_NODE_HEADER, &self.source)
            .json(body)
            .send()
            .await
            .map_err(|e| request_error(peer, e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(PeerError::Status(peer.to_string(), status.as_u16()));
        }
        Ok(())
    }

    async fn broadcast<T: Serialize + ?Sized>(&self, peers: &[String], path: &str, body: &T, what: &str) -> usize {
        let mut delivered = 0;
        for peer in peers {
            match self.post_json(peer, path, body).await {
                Ok(()) => {
                    delivered += 1;
                    debug!("BROADCAST - {} delivered to {}", what, peer);
                }
                Err(e) => warn!("BROADCAST - {} not delivered: {}", what, e),
            }
        }
        info!(
            "BROADCAST - {} reached {} of {} peers",
            what,
            delivered,
            peers.len()
        );
        delivered
    }
}

fn request_error(peer: &str, e: reqwest::Error) -> PeerError {
    if e.is_timeout() {
        PeerError::Timeout(peer.to_string())
    } else {
        PeerError::Unreachable(peer.to_string(), e.to_string())
    }
}

impl PeerClient for HttpPeerClient {
    async fn fetch_chain(&self, peer: &str) -> Result<Vec<Block>, PeerError> {
        let url = format!("{peer}{CHAIN_PATH}");
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| request_error(peer, e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(PeerError::Status(peer.to_string(), status.as_u16()));
        }
        let payload: ChainPayload = resp
            .json()
            .await
            .map_err(|e| PeerError::Malformed(peer.to_string(), e.to_string()))?;
        if payload.length != payload.chain.len() {
            return Err(PeerError::Malformed(
                peer.to_string(),
                format!(
                    "advertised length {} but sent {} blocks",
                    payload.length,
                    payload.chain.len()
                ),
            ));
        }
        Ok(payload.chain)
    }

    async fn broadcast_block(&self, peers: &[String], block: &Block) -> usize {
        let what = format!("block #{}", block.index);
        self.broadcast(peers, NEW_BLOCK_PATH, block, &what).await
    }

    async fn broadcast_transaction(&self, peers: &[String], tx: &Transaction) -> usize {
        let what = format!("transaction {} -> {}", tx.sender, tx.recipient);
        self.broadcast(peers, NEW_TRANSACTION_PATH, tx, &what).await
    }
}
