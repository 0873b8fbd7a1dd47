//! Mining on a node: one in-flight job at a time, woken by a signal that both
//! the submit path and the periodic sweeper feed.

use log::{debug, error, info, warn};
use std::sync::{Arc, PoisonError};
use tokio_util::sync::CancellationToken;

use super::{LedgerState, Node};
use crate::blockchain::Block;
use crate::error::{NodeError, NodeResult};
use crate::network::PeerClient;

/// The job currently searching for a nonce.
#[derive(Debug)]
pub(crate) struct MiningJob {
    token: CancellationToken,
    previous_hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MineTrigger {
    /// Mine the oldest sealed batch.
    Batch,
    /// Mine everything pending, whatever its size.
    Manual,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MineOutcome {
    Mined(Block),
    /// Another job is already in flight.
    Busy,
    /// Nothing minable in the pool.
    NothingToMine,
    /// The job was cancelled or went stale; its transactions went back to the pool.
    Abandoned,
}

pub(crate) enum JobStart {
    Ready(Block, CancellationToken),
    Done(MineOutcome),
}

impl<P: PeerClient> Node<P> {
    pub fn signal_mining(&self) {
        self.mine_signal.notify_one();
    }

    pub fn is_mining(&self) -> bool {
        self.mining
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Abort the in-flight nonce search, if any. The job itself requeues its
    /// transactions when it observes the cancellation.
    pub fn cancel_mining(&self, reason: &str) {
        let slot = self.mining.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(job) = slot.as_ref() {
            info!(
                "MINER - cancelling job on top of {} ({})",
                job.previous_hash, reason
            );
            job.token.cancel();
        }
    }

    /// Drain a batch from the pool and mine it, then commit and broadcast.
    pub async fn mine_pending(&self, trigger: MineTrigger) -> NodeResult<MineOutcome> {
        if !self.config.miner_mode {
            return Err(NodeError::NotMiner);
        }
        let (mut block, token) = match self.start_job(trigger)? {
            JobStart::Ready(block, token) => (block, token),
            JobStart::Done(outcome) => return Ok(outcome),
        };

        info!(
            "MINER - mining block #{} ({} transactions, difficulty {})",
            block.index,
            block.transactions.len(),
            block.difficulty
        );
        let index = block.index;
        let mined = tokio::task::spawn_blocking(move || {
            let found = block.mine(&token);
            (block, found)
        })
        .await;

        let (block, found) = match mined {
            Ok(result) => result,
            Err(e) => {
                self.mining
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take();
                error!("MINER - nonce search for block #{} failed: {}", index, e);
                return Err(NodeError::MiningTask(e.to_string()));
            }
        };
        self.finish_job(block, found).await
    }

    /// Take the slot, drain the pool and build the candidate. Transactions the
    /// committed balances cannot cover are moved to the rejected log.
    pub(crate) fn start_job(&self, trigger: MineTrigger) -> NodeResult<JobStart> {
        let mut slot = self.mining.lock().map_err(|_| NodeError::LockPoisoned)?;
        if slot.is_some() {
            debug!("MINER - job already in flight");
            return Ok(JobStart::Done(MineOutcome::Busy));
        }

        let mut guard = self.write()?;
        let LedgerState { chain, pool } = &mut *guard;
        let batch = match trigger {
            MineTrigger::Batch => pool.take_batch(),
            MineTrigger::Manual if pool.is_empty() => None,
            MineTrigger::Manual => Some(pool.take_all()),
        };
        let Some(batch) = batch else {
            return Ok(JobStart::Done(MineOutcome::NothingToMine));
        };

        let (affordable, refused) = chain.split_affordable(batch);
        for (tx, overspend) in refused {
            warn!(
                "MINER - dropping {} -> {} ({}): balance {}",
                tx.sender, tx.recipient, tx.amount, overspend.balance
            );
            pool.reject(
                tx,
                format!(
                    "insufficient funds: {} holds {} but sends {}",
                    overspend.sender, overspend.balance, overspend.amount
                ),
            );
        }
        if affordable.is_empty() {
            return Ok(JobStart::Done(MineOutcome::NothingToMine));
        }

        let block = chain.candidate_block(affordable, &self.config.miner_address);
        let token = CancellationToken::new();
        *slot = Some(MiningJob {
            token: token.clone(),
            previous_hash: block.previous_hash.clone(),
        });
        Ok(JobStart::Ready(block, token))
    }

    /// Commit a finished job if it still extends the tip, otherwise hand its
    /// batch back to the pool as a unit. Releases the slot either way.
    pub(crate) async fn finish_job(&self, block: Block, found: bool) -> NodeResult<MineOutcome> {
        let committed = {
            let mut slot = self.mining.lock().unwrap_or_else(PoisonError::into_inner);
            slot.take();
            let mut guard = match self.write() {
                Ok(guard) => guard,
                Err(e) => {
                    let lost: Vec<String> = block
                        .transactions
                        .iter()
                        .filter(|t| !t.is_reward())
                        .map(|t| t.compute_hash())
                        .collect();
                    error!(
                        "MINER - block #{} dropped ({}), {} transactions lost: {:?}",
                        block.index,
                        e,
                        lost.len(),
                        lost
                    );
                    return Err(e);
                }
            };
            let LedgerState { chain, pool } = &mut *guard;

            let reason = if !found {
                Some("cancelled".to_string())
            } else if chain.last_block().hash != block.previous_hash {
                Some("tip moved while mining".to_string())
            } else {
                chain.append_block(block.clone()).err().map(|e| e.to_string())
            };
            match reason {
                None => true,
                Some(reason) => {
                    let restored = pool.requeue(block.transactions.clone(), chain);
                    info!(
                        "MINER - block #{} abandoned ({}), {} transactions requeued",
                        block.index, reason, restored
                    );
                    false
                }
            }
        };
        if !committed {
            if self.batch_ready()? {
                self.signal_mining();
            }
            return Ok(MineOutcome::Abandoned);
        }

        info!(
            "MINER - mined block #{} nonce={} hash={}",
            block.index, block.nonce, block.hash
        );
        let peers = self.peers.snapshot();
        if !peers.is_empty() {
            let accepted = self.client.broadcast_block(&peers, &block).await;
            info!("MINER - block #{} accepted by {}/{} peers", block.index, accepted, peers.len());
        }
        if self.batch_ready()? {
            self.signal_mining();
        }
        Ok(MineOutcome::Mined(block))
    }

    /// Long-lived miner task: one batch per wake-up.
    pub async fn run_miner(self: Arc<Self>) {
        info!("MINER - started, rewards go to {}", self.config.miner_address);
        loop {
            self.mine_signal.notified().await;
            match self.mine_pending(MineTrigger::Batch).await {
                Ok(MineOutcome::Mined(_)) => {}
                Ok(outcome) => debug!("MINER - woke up without mining: {:?}", outcome),
                Err(NodeError::Corrupted) => {
                    error!("MINER - ledger corrupted, stopping");
                    break;
                }
                Err(e) => error!("MINER - {}", e),
            }
        }
    }

    /// Failsafe for a missed signal: periodically look for a sealed batch.
    pub async fn run_sweeper(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.sweep_interval);
        interval.tick().await;
        loop {
            interval.tick().await;
            if self.is_corrupted() {
                break;
            }
            match self.batch_ready() {
                Ok(true) => {
                    info!("SWEEPER - batch found pending, signalling miner");
                    self.signal_mining();
                }
                Ok(false) => {}
                Err(e) => error!("SWEEPER - {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Origin;
    use crate::node::tests::{StaticPeers, chain_of, test_node};
    use crate::transaction::{PoolResult, Transaction};
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    async fn submit_all(node: &Node<Arc<StaticPeers>>, txs: &[(&str, &str, f64)]) {
        for (s, r, a) in txs {
            let result = node
                .submit_transaction(Transaction::new(*s, *r, *a), Origin::Peer)
                .await
                .unwrap();
            assert!(matches!(result, PoolResult::Accepted { .. }));
        }
    }

    #[actix_web::test]
    async fn batch_of_three_is_mined_with_reward() {
        let (node, peers) = test_node(true);
        node.peers().register("http://peer:5000");
        submit_all(&node, &[("alice", "bob", 5.0), ("bob", "carol", 2.0), ("carol", "dave", 1.0)]).await;

        let MineOutcome::Mined(block) = node.mine_pending(MineTrigger::Batch).await.unwrap() else {
            panic!("expected a mined block");
        };
        assert_eq!(block.index, 1);
        assert_eq!(block.transactions.len(), 4);
        let reward = block.transactions.last().unwrap();
        assert!(reward.is_reward());
        assert_eq!(reward.recipient, "miner-test");
        assert_eq!(reward.amount, 1.0);

        assert_eq!(node.chain_len().unwrap(), 2);
        assert!(node.pending().unwrap().is_empty());
        assert!(!node.is_mining());
        assert_eq!(node.balance("miner-test").unwrap(), 1.0);
        assert_eq!(node.balance("alice").unwrap(), 95.0);
        assert_eq!(peers.blocks_sent.load(Ordering::SeqCst), 1);
    }

    #[actix_web::test]
    async fn non_miner_refuses() {
        let (node, _) = test_node(false);
        assert!(matches!(
            node.mine_pending(MineTrigger::Manual).await,
            Err(NodeError::NotMiner)
        ));
    }

    #[actix_web::test]
    async fn trigger_fires_only_at_exact_batch_size() {
        let (node, _) = test_node(true);
        submit_all(&node, &[("a", "b", 1.0), ("c", "d", 1.0)]).await;
        assert_eq!(
            node.mine_pending(MineTrigger::Batch).await.unwrap(),
            MineOutcome::NothingToMine
        );
        submit_all(&node, &[("e", "f", 1.0)]).await;
        // a fourth arrival before the miner wakes up stays out of the batch
        submit_all(&node, &[("g", "h", 1.0)]).await;
        assert!(node.batch_ready().unwrap());

        let MineOutcome::Mined(block) = node.mine_pending(MineTrigger::Batch).await.unwrap() else {
            panic!("the sealed batch should be mined");
        };
        let senders: Vec<_> = block.transactions.iter().map(|t| t.sender.as_str()).collect();
        assert_eq!(senders, vec!["a", "c", "e", "0"]);
        let pending = node.pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].sender, "g");
        assert!(!node.batch_ready().unwrap());
        assert_eq!(
            node.mine_pending(MineTrigger::Batch).await.unwrap(),
            MineOutcome::NothingToMine
        );

        let MineOutcome::Mined(block) = node.mine_pending(MineTrigger::Manual).await.unwrap() else {
            panic!("manual mining should take everything pending");
        };
        assert_eq!(block.transactions.len(), 2);
        assert!(node.pending().unwrap().is_empty());
    }

    #[actix_web::test]
    async fn manual_mining_needs_pending_transactions() {
        let (node, _) = test_node(true);
        assert_eq!(
            node.mine_pending(MineTrigger::Manual).await.unwrap(),
            MineOutcome::NothingToMine
        );
        assert_eq!(node.chain_len().unwrap(), 1);
    }

    #[actix_web::test]
    async fn overspending_transactions_are_dropped_before_mining() {
        let (node, _) = test_node(true);
        submit_all(&node, &[("alice", "bob", 60.0), ("alice", "carol", 50.0), ("dave", "erin", 1.0)]).await;

        let MineOutcome::Mined(block) = node.mine_pending(MineTrigger::Batch).await.unwrap() else {
            panic!("affordable part of the batch should still be mined");
        };
        assert_eq!(block.transactions.len(), 3);
        assert!(node.validate_chain().unwrap());

        let rejected = node.rejected().unwrap();
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].transaction.recipient, "carol");
        assert!(rejected[0].reason.starts_with("insufficient funds"));
    }

    #[actix_web::test]
    async fn second_job_is_busy_while_first_is_in_flight() {
        let (node, _) = test_node(true);
        submit_all(&node, &[("a", "b", 1.0), ("c", "d", 1.0), ("e", "f", 1.0)]).await;
        let JobStart::Ready(_, _) = node.start_job(MineTrigger::Batch).unwrap() else {
            panic!("first job should start");
        };
        assert!(node.is_mining());
        submit_all(&node, &[("g", "h", 1.0)]).await;
        assert_eq!(
            node.mine_pending(MineTrigger::Manual).await.unwrap(),
            MineOutcome::Busy
        );
    }

    #[actix_web::test]
    async fn tip_change_cancels_and_requeues_the_job() {
        let (node, _) = test_node(true);
        submit_all(&node, &[("x", "y", 1.0), ("y", "z", 1.0), ("z", "x", 1.0)]).await;
        let JobStart::Ready(block, token) = node.start_job(MineTrigger::Batch).unwrap() else {
            panic!("job should start");
        };
        assert!(node.pending().unwrap().is_empty());

        let peer_block = chain_of(2, "alice").remove(1);
        assert!(node.receive_block(peer_block).await.unwrap().accepted);
        assert!(token.is_cancelled());

        assert_eq!(
            node.finish_job(block, false).await.unwrap(),
            MineOutcome::Abandoned
        );
        assert!(!node.is_mining());
        let senders: Vec<_> = node.pending().unwrap().into_iter().map(|t| t.sender).collect();
        assert_eq!(senders, vec!["x", "y", "z"]);
        assert_eq!(node.chain_len().unwrap(), 2);
    }

    #[actix_web::test]
    async fn stale_result_is_not_committed() {
        let (node, _) = test_node(true);
        submit_all(&node, &[("x", "y", 1.0), ("y", "z", 1.0), ("z", "x", 1.0)]).await;
        let JobStart::Ready(mut block, _) = node.start_job(MineTrigger::Batch).unwrap() else {
            panic!("job should start");
        };
        block.mine(&CancellationToken::new());
        node.receive_block(chain_of(2, "alice").remove(1)).await.unwrap();

        assert_eq!(
            node.finish_job(block, true).await.unwrap(),
            MineOutcome::Abandoned
        );
        assert_eq!(node.pending().unwrap().len(), 3);
        assert!(node.validate_chain().unwrap());
    }

    #[actix_web::test]
    async fn abandoned_batch_is_mined_again_despite_later_arrivals() {
        let (node, _) = test_node(true);
        submit_all(&node, &[("x", "y", 1.0), ("y", "z", 1.0), ("z", "x", 1.0)]).await;
        // consume the wake-up left by the submission
        node.mine_signal.notified().await;
        let JobStart::Ready(block, _) = node.start_job(MineTrigger::Batch).unwrap() else {
            panic!("job should start");
        };
        submit_all(&node, &[("w", "v", 1.0)]).await;
        node.receive_block(chain_of(2, "alice").remove(1)).await.unwrap();

        assert_eq!(
            node.finish_job(block, false).await.unwrap(),
            MineOutcome::Abandoned
        );
        assert_eq!(node.pending().unwrap().len(), 4);
        assert!(node.batch_ready().unwrap());
        tokio::time::timeout(Duration::from_secs(1), node.mine_signal.notified())
            .await
            .expect("abandoning a batch should wake the miner");

        let MineOutcome::Mined(block) = node.mine_pending(MineTrigger::Batch).await.unwrap() else {
            panic!("the requeued batch should be mined");
        };
        assert_eq!(block.index, 2);
        let senders: Vec<_> = block.transactions.iter().map(|t| t.sender.as_str()).collect();
        assert_eq!(senders, vec!["x", "y", "z", "0"]);
        let pending = node.pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].sender, "w");
    }

    #[actix_web::test]
    async fn corruption_mid_job_releases_the_slot() {
        let (node, _) = test_node(true);
        submit_all(&node, &[("a", "b", 1.0), ("c", "d", 1.0), ("e", "f", 1.0)]).await;
        let JobStart::Ready(block, _) = node.start_job(MineTrigger::Batch).unwrap() else {
            panic!("job should start");
        };
        node.state.write().unwrap().chain.chain[0].timestamp = 42.0;

        assert!(matches!(
            node.finish_job(block, true).await,
            Err(NodeError::Corrupted)
        ));
        assert!(!node.is_mining());
        assert!(node.is_corrupted());
    }

    #[actix_web::test]
    async fn miner_task_mines_on_signal() {
        let (node, _) = test_node(true);
        let node = Arc::new(node);
        actix_web::rt::spawn(node.clone().run_miner());

        submit_all(&node, &[("a", "b", 1.0), ("c", "d", 1.0), ("e", "f", 1.0)]).await;
        for _ in 0..200 {
            if node.chain_len().unwrap() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(node.chain_len().unwrap(), 2);
        assert!(node.pending().unwrap().is_empty());
    }
}
