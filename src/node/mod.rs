//! The ledger engine as one node: chain and pool behind a single lock, plus
//! the inbound operations the transport layer exposes.

pub mod miner;

use log::{error, info, warn};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::Notify;

use crate::blockchain::{AddressTransaction, Block, Blockchain, consensus};
use crate::config::NodeConfig;
use crate::error::{NodeError, NodeResult, PeerError};
use crate::network::{PeerBook, PeerClient};
use crate::transaction::{PoolResult, RejectedTransaction, Transaction, TxPool};

pub use miner::{MineOutcome, MineTrigger};
use miner::MiningJob;

/// Everything a mutation may touch. Guarded as a unit so readers never see a
/// half-applied block or a chain out of step with the pool.
#[derive(Debug)]
pub struct LedgerState {
    pub chain: Blockchain,
    pub pool: TxPool,
}

/// Where a submitted transaction came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// A client: forward to peers once accepted.
    Client,
    /// Gossip from another node: never forwarded again.
    Peer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReceiveOutcome {
    pub accepted: bool,
    pub triggered_consensus: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeInfo {
    pub node_id: String,
    pub public_url: String,
    pub miner_mode: bool,
    pub miner_address: String,
    pub difficulty: u32,
    pub chain_length: usize,
    pub pending_transactions: usize,
    pub peers: usize,
    pub is_mining: bool,
    pub corrupted: bool,
}

pub struct Node<P: PeerClient> {
    config: NodeConfig,
    state: RwLock<LedgerState>,
    peers: PeerBook,
    client: P,
    mining: Mutex<Option<MiningJob>>,
    mine_signal: Notify,
    corrupted: AtomicBool,
}

impl<P: PeerClient> Node<P> {
    pub fn new(config: NodeConfig, client: P) -> Self {
        let peers = PeerBook::new(&config.public_url, &config.peers);
        let state = LedgerState {
            chain: Blockchain::new(config.ledger),
            pool: TxPool::new(),
        };
        Self {
            config,
            state: RwLock::new(state),
            peers,
            client,
            mining: Mutex::new(None),
            mine_signal: Notify::new(),
            corrupted: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn peers(&self) -> &PeerBook {
        &self.peers
    }

    pub fn is_corrupted(&self) -> bool {
        self.corrupted.load(Ordering::SeqCst)
    }

    fn read(&self) -> NodeResult<RwLockReadGuard<'_, LedgerState>> {
        self.state.read().map_err(|_| NodeError::LockPoisoned)
    }

    /// Exclusive access for a mutation. Refused for good once the local
    /// genesis block fails its own check.
    fn write(&self) -> NodeResult<RwLockWriteGuard<'_, LedgerState>> {
        if self.is_corrupted() {
            return Err(NodeError::Corrupted);
        }
        let guard = self.state.write().map_err(|_| NodeError::LockPoisoned)?;
        if !guard.chain.genesis_intact() {
            error!("NODE - local genesis block is corrupted; refusing further mutations");
            self.corrupted.store(true, Ordering::SeqCst);
            return Err(NodeError::Corrupted);
        }
        Ok(guard)
    }

    pub async fn submit_transaction(&self, tx: Transaction, origin: Origin) -> NodeResult<PoolResult> {
        let result = {
            let mut guard = self.write()?;
            let LedgerState { chain, pool } = &mut *guard;
            pool.submit(tx.clone(), chain, self.config.batch_size)
        };

        if let PoolResult::Accepted { batch_ready } = result {
            if batch_ready {
                if self.config.miner_mode {
                    info!("NODE - batch of {} ready, signalling miner", self.config.batch_size);
                    self.signal_mining();
                } else {
                    warn!("NODE - batch ready but this node is not a miner");
                }
            }
            if origin == Origin::Client {
                let peers = self.peers.snapshot();
                if !peers.is_empty() {
                    self.client.broadcast_transaction(&peers, &tx).await;
                }
            }
        }
        Ok(result)
    }

    /// Accept a block mined elsewhere if it extends our tip; fall back to a
    /// consensus pass if it is ahead of us but does not attach.
    pub async fn receive_block(&self, block: Block) -> NodeResult<ReceiveOutcome> {
        enum Disposition {
            Appended,
            Ahead,
            Stale,
        }

        let disposition = {
            let mut guard = self.write()?;
            let LedgerState { chain, pool } = &mut *guard;
            let tip = chain.last_block();
            if block.index == tip.index + 1 && block.previous_hash == tip.hash {
                let txs = block.transactions.clone();
                match chain.append_block(block) {
                    Ok(()) => {
                        let removed = pool.purge(&txs);
                        info!("NODE - peer block accepted, {} pending transactions settled", removed);
                        Disposition::Appended
                    }
                    Err(e) => {
                        warn!("NODE - peer block rejected: {}", e);
                        return Err(NodeError::Chain(e));
                    }
                }
            } else if block.index > tip.index {
                info!(
                    "NODE - block #{} does not attach to tip #{}, running consensus",
                    block.index, tip.index
                );
                Disposition::Ahead
            } else {
                info!("NODE - ignoring stale block #{}", block.index);
                Disposition::Stale
            }
        };

        match disposition {
            Disposition::Appended => {
                self.cancel_mining("tip moved to a peer block");
                Ok(ReceiveOutcome {
                    accepted: true,
                    triggered_consensus: false,
                })
            }
            Disposition::Ahead => {
                let replaced = self.resolve_consensus().await?;
                Ok(ReceiveOutcome {
                    accepted: replaced,
                    triggered_consensus: true,
                })
            }
            Disposition::Stale => Ok(ReceiveOutcome {
                accepted: false,
                triggered_consensus: false,
            }),
        }
    }

    /// Longest-valid-chain resolution. Peers are polled without holding the
    /// lock; only the final re-check and swap is exclusive.
    pub async fn resolve_consensus(&self) -> NodeResult<bool> {
        if self.is_corrupted() {
            return Err(NodeError::Corrupted);
        }
        let (local_len, params) = {
            let guard = self.read()?;
            (guard.chain.len(), guard.chain.params())
        };

        let peers = self.peers.snapshot();
        info!(
            "CONSENSUS - polling {} peers (local length {})",
            peers.len(),
            local_len
        );
        let mut responses = Vec::with_capacity(peers.len());
        for peer in peers {
            let fetched =
                match tokio::time::timeout(self.config.peer_timeout, self.client.fetch_chain(&peer))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(PeerError::Timeout(peer.clone())),
                };
            responses.push((peer, fetched));
        }

        let Some(adopted) = consensus::resolve(params, local_len, responses) else {
            info!("CONSENSUS - local chain is authoritative");
            return Ok(false);
        };

        {
            let mut guard = self.write()?;
            if adopted.len() <= guard.chain.len() {
                info!("CONSENSUS - local chain grew during the pass, keeping it");
                return Ok(false);
            }
            let LedgerState { chain, pool } = &mut *guard;
            chain.replace_chain(adopted);
            let removed = pool.purge_committed(chain);
            info!(
                "CONSENSUS - adopted chain of {} blocks, {} pending transactions already committed",
                chain.len(),
                removed
            );
        }
        self.cancel_mining("chain replaced");
        Ok(true)
    }

    pub fn get_chain(&self) -> NodeResult<Vec<Block>> {
        Ok(self.read()?.chain.chain.clone())
    }

    pub fn validate_chain(&self) -> NodeResult<bool> {
        Ok(self.read()?.chain.is_chain_valid())
    }

    pub fn get_block(&self, index: usize) -> NodeResult<Option<Block>> {
        Ok(self.read()?.chain.get_block(index).cloned())
    }

    pub fn chain_len(&self) -> NodeResult<usize> {
        Ok(self.read()?.chain.len())
    }

    pub fn difficulty(&self) -> NodeResult<u32> {
        Ok(self.read()?.chain.difficulty())
    }

    pub fn pending(&self) -> NodeResult<Vec<Transaction>> {
        Ok(self.read()?.pool.pending())
    }

    pub fn rejected(&self) -> NodeResult<Vec<RejectedTransaction>> {
        Ok(self.read()?.pool.rejected())
    }

    pub fn balance(&self, address: &str) -> NodeResult<f64> {
        Ok(self.read()?.chain.balance(address))
    }

    pub fn transactions_for(&self, address: &str) -> NodeResult<Vec<AddressTransaction>> {
        Ok(self.read()?.chain.transactions_for(address))
    }

    pub fn batch_ready(&self) -> NodeResult<bool> {
        Ok(self.read()?.pool.batch_ready())
    }

    pub fn info(&self) -> NodeResult<NodeInfo> {
        // slot before state, same order as the miner
        let is_mining = self.is_mining();
        let guard = self.read()?;
        Ok(NodeInfo {
            node_id: self.config.node_id.clone(),
            public_url: self.config.public_url.clone(),
            miner_mode: self.config.miner_mode,
            miner_address: self.config.miner_address.clone(),
            difficulty: guard.chain.difficulty(),
            chain_length: guard.chain.len(),
            pending_transactions: guard.pool.len(),
            peers: self.peers.len(),
            is_mining,
            corrupted: self.is_corrupted(),
        })
    }
}
