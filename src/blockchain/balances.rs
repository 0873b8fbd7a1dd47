use std::collections::HashMap;

use crate::transaction::Transaction;

/// A transfer the replay refused because the sender could not cover it.
#[derive(Debug, Clone, PartialEq)]
pub struct Overspend {
    pub sender: String,
    pub balance: f64,
    pub amount: f64,
}

/// Account balances derived by replaying committed transactions.
///
/// Accounts are materialized lazily: a first-seen sender starts at
/// `starting_balance`, a first-seen recipient at zero. Reward transactions
/// only credit.
#[derive(Debug, Clone, Default)]
pub struct Balances {
    accounts: HashMap<String, f64>,
    starting_balance: f64,
}

impl Balances {
    pub fn new(starting_balance: f64) -> Self {
        Self {
            accounts: HashMap::new(),
            starting_balance,
        }
    }

    /// Apply one transaction. On overspend no funds move.
    pub fn apply(&mut self, tx: &Transaction) -> Result<(), Overspend> {
        if !tx.is_reward() && !self.accounts.contains_key(&tx.sender) {
            self.accounts.insert(tx.sender.clone(), self.starting_balance);
        }
        self.accounts.entry(tx.recipient.clone()).or_insert(0.0);

        if tx.is_reward() {
            *self.accounts.entry(tx.recipient.clone()).or_insert(0.0) += tx.amount;
            return Ok(());
        }

        let balance = self.get(&tx.sender);
        if balance < tx.amount {
            return Err(Overspend {
                sender: tx.sender.clone(),
                balance,
                amount: tx.amount,
            });
        }
        *self.accounts.entry(tx.sender.clone()).or_insert(0.0) -= tx.amount;
        *self.accounts.entry(tx.recipient.clone()).or_insert(0.0) += tx.amount;
        Ok(())
    }

    /// Tracked balance; unknown addresses read as zero.
    pub fn get(&self, address: &str) -> f64 {
        self.accounts.get(address).copied().unwrap_or(0.0)
    }
}
