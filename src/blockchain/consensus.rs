//! Longest-valid-chain selection over peer responses.
//!
//! Pure functions: fetching happens in the node without holding the ledger
//! lock, and the swap is done by the caller.

use log::{info, warn};

use super::{Block, Blockchain, LedgerParams};
use crate::error::PeerError;

/// A chain advertised by a peer.
#[derive(Debug, Clone)]
pub struct PeerChain {
    pub peer: String,
    pub chain: Vec<Block>,
}

/// Pick the strictly longest chain among reachable peers. Ties keep whichever
/// was seen first (the local chain counts as seen first). Failed peers are
/// logged and skipped.
pub fn select_longest<I>(local_len: usize, responses: I) -> Option<PeerChain>
where
    I: IntoIterator<Item = (String, Result<Vec<Block>, PeerError>)>,
{
    let mut max_length = local_len;
    let mut candidate = None;
    for (peer, response) in responses {
        match response {
            Ok(chain) if chain.len() > max_length => {
                info!("CONSENSUS - {} advertises a longer chain ({} blocks)", peer, chain.len());
                max_length = chain.len();
                candidate = Some(PeerChain { peer, chain });
            }
            Ok(chain) => {
                info!("CONSENSUS - {} has {} blocks, not longer", peer, chain.len());
            }
            Err(e) => warn!("CONSENSUS - skipping peer: {}", e),
        }
    }
    candidate
}

/// Validate the longest candidate on a throwaway ledger. An invalid candidate
/// is discarded outright; shorter candidates are not reconsidered.
pub fn resolve<I>(params: LedgerParams, local_len: usize, responses: I) -> Option<Blockchain>
where
    I: IntoIterator<Item = (String, Result<Vec<Block>, PeerError>)>,
{
    let candidate = select_longest(local_len, responses)?;
    match Blockchain::from_blocks(params, candidate.chain) {
        Ok(ledger) => Some(ledger),
        Err(e) => {
            warn!("CONSENSUS - longest chain from {} is invalid: {}", candidate.peer, e);
            None
        }
    }
}
