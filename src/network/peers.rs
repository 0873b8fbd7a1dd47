use log::info;
use std::collections::BTreeSet;
use std::sync::{PoisonError, RwLock};

use crate::config::normalize_url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Added,
    AlreadyKnown,
    IsSelf,
}

/// In-memory set of peer base URLs. Never contains this node itself.
#[derive(Debug)]
pub struct PeerBook {
    self_url: String,
    peers: RwLock<BTreeSet<String>>,
}

impl PeerBook {
    pub fn new(self_url: &str, initial: &[String]) -> Self {
        let book = Self {
            self_url: normalize_url(self_url),
            peers: RwLock::new(BTreeSet::new()),
        };
        for peer in initial {
            book.register(peer);
        }
        book
    }

    pub fn register(&self, raw: &str) -> Registration {
        let url = normalize_url(raw);
        if url == self.self_url {
            return Registration::IsSelf;
        }
        let mut peers = self.peers.write().unwrap_or_else(PoisonError::into_inner);
        if peers.insert(url.clone()) {
            info!("PEERS - registered {}", url);
            Registration::Added
        } else {
            Registration::AlreadyKnown
        }
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.peers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.peers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
