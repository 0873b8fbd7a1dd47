use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::blockchain::REWARD_SENDER;
use crate::error::TxError;

/// A transfer of `amount` from `sender` to `recipient`.
///
/// Immutable once built; the content hash is derived on demand and is used for
/// deduplication only (there is no signature scheme).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: String,
    pub recipient: String,
    pub amount: f64,
    /// Seconds since the Unix epoch, with sub-second precision.
    pub timestamp: f64,
}

/// Identity of a transfer independent of its timestamp. Two pending
/// transactions with the same key are treated as a double submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TxKey {
    sender: String,
    recipient: String,
    amount_bits: u64,
}

impl Transaction {
    /// Build a transaction stamped with the current time.
    pub fn new(sender: impl Into<String>, recipient: impl Into<String>, amount: f64) -> Self {
        Self::with_timestamp(sender, recipient, amount, now_secs())
    }

    pub fn with_timestamp(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        amount: f64,
        timestamp: f64,
    ) -> Self {
        Self {
            sender: sender.into(),
            recipient: recipient.into(),
            amount,
            timestamp,
        }
    }

    /// System-minted credit paid to a miner.
    pub fn reward(miner_address: impl Into<String>, amount: f64) -> Self {
        Self::new(REWARD_SENDER, miner_address, amount)
    }

    pub fn is_reward(&self) -> bool {
        self.sender == REWARD_SENDER
    }

    /// Canonical JSON value: keys are emitted in lexicographic order so the
    /// encoding does not depend on serde_json's map implementation.
    pub fn canonical_value(&self) -> serde_json::Value {
        serde_json::json!({
            "amount": self.amount,
            "recipient": self.recipient,
            "sender": self.sender,
            "timestamp": self.timestamp,
        })
    }

    /// Hex SHA-256 of the canonical encoding.
    pub fn compute_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical_value().to_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn key(&self) -> TxKey {
        TxKey {
            sender: self.sender.clone(),
            recipient: self.recipient.clone(),
            amount_bits: self.amount.to_bits(),
        }
    }

    /// Structural checks only; balances are never consulted here.
    pub fn validate(&self) -> Result<(), TxError> {
        if self.sender.trim().is_empty() {
            return Err(TxError::MissingField("sender"));
        }
        if self.recipient.trim().is_empty() {
            return Err(TxError::MissingField("recipient"));
        }
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(TxError::NonPositiveAmount(self.amount));
        }
        if !self.timestamp.is_finite() {
            return Err(TxError::MissingField("timestamp"));
        }
        Ok(())
    }
}

/// Current wall-clock time in fractional seconds.
pub fn now_secs() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let tx = Transaction::with_timestamp("alice", "bob", 10.0, 1_700_000_000.5);
        assert_eq!(tx.compute_hash(), tx.clone().compute_hash());
        assert_eq!(tx.compute_hash().len(), 64);
    }

    #[test]
    fn every_field_feeds_the_hash() {
        let base = Transaction::with_timestamp("alice", "bob", 10.0, 1.0);
        let variants = [
            Transaction::with_timestamp("carol", "bob", 10.0, 1.0),
            Transaction::with_timestamp("alice", "carol", 10.0, 1.0),
            Transaction::with_timestamp("alice", "bob", 10.5, 1.0),
            Transaction::with_timestamp("alice", "bob", 10.0, 2.0),
        ];
        for v in variants {
            assert_ne!(base.compute_hash(), v.compute_hash());
        }
    }

    #[test]
    fn key_ignores_timestamp() {
        let a = Transaction::with_timestamp("alice", "bob", 10.0, 1.0);
        let b = Transaction::with_timestamp("alice", "bob", 10.0, 2.0);
        assert_eq!(a.key(), b.key());
        assert_ne!(a.compute_hash(), b.compute_hash());
    }

    #[test]
    fn structural_validation() {
        assert!(Transaction::new("a", "b", 1.0).validate().is_ok());
        assert_eq!(
            Transaction::new("", "b", 1.0).validate(),
            Err(TxError::MissingField("sender"))
        );
        assert_eq!(
            Transaction::new("a", " ", 1.0).validate(),
            Err(TxError::MissingField("recipient"))
        );
        assert!(matches!(
            Transaction::new("a", "b", 0.0).validate(),
            Err(TxError::NonPositiveAmount(_))
        ));
        assert!(Transaction::new("a", "b", -3.0).validate().is_err());
        assert!(Transaction::new("a", "b", f64::NAN).validate().is_err());
    }

    #[test]
    fn reward_uses_reserved_sender() {
        let r = Transaction::reward("miner-1", 1.0);
        assert!(r.is_reward());
        assert_eq!(r.recipient, "miner-1");
    }
}
