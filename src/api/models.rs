use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::blockchain::{AddressTransaction, Block};
use crate::error::TxError;
use crate::network::HttpPeerClient;
use crate::node::Node;
use crate::transaction::{RejectedTransaction, Transaction, now_secs};

/// The node as shared with every handler.
pub type AppNode = Node<HttpPeerClient>;

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/* ---------- Chain API Models ---------- */

#[derive(Serialize)]
pub struct ChainResponse<'a> {
    pub length: usize,
    pub difficulty: u32,
    pub chain: &'a [Block],
}

#[derive(Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
    pub length: usize,
}

#[derive(Serialize)]
pub struct MineResponse {
    pub mined_index: u64,
    pub hash: String,
    pub nonce: u64,
    pub difficulty: u32,
    pub transactions: usize,
}

/* ---------- TX API Models ---------- */

/// Incoming transaction. Everything is optional so missing fields surface as
/// validation errors instead of deserializer rejections. `amount` may be a
/// number or a numeric string; `timestamp` is only set by gossiping peers.
#[derive(Debug, Deserialize)]
pub struct NewTxRequest {
    pub sender: Option<String>,
    pub recipient: Option<String>,
    pub amount: Option<Value>,
    pub timestamp: Option<f64>,
}

impl NewTxRequest {
    pub fn into_transaction(self) -> Result<Transaction, TxError> {
        let sender = self.sender.ok_or(TxError::MissingField("sender"))?;
        let recipient = self.recipient.ok_or(TxError::MissingField("recipient"))?;
        let amount = match self.amount {
            None | Some(Value::Null) => return Err(TxError::MissingField("amount")),
            Some(Value::Number(n)) => n.as_f64().ok_or(TxError::NonNumericAmount)?,
            Some(Value::String(s)) => s.trim().parse().map_err(|_| TxError::NonNumericAmount)?,
            Some(_) => return Err(TxError::NonNumericAmount),
        };
        let timestamp = self.timestamp.unwrap_or_else(now_secs);
        Ok(Transaction::with_timestamp(sender, recipient, amount, timestamp))
    }
}

#[derive(Serialize)]
pub struct NewTxResponse {
    pub result: &'static str,
    pub transaction: Transaction,
    pub batch_ready: bool,
}

#[derive(Serialize)]
pub struct PendingResponse {
    pub count: usize,
    pub transactions: Vec<Transaction>,
}

#[derive(Serialize)]
pub struct RejectedResponse {
    pub count: usize,
    pub transactions: Vec<RejectedTransaction>,
}

#[derive(Serialize)]
pub struct AddressHistoryResponse {
    pub address: String,
    pub count: usize,
    pub transactions: Vec<AddressTransaction>,
}

#[derive(Serialize)]
pub struct BalanceResponse {
    pub address: String,
    pub balance: f64,
}

/* ---------- Node API Models ---------- */

#[derive(Serialize)]
pub struct ResolveResponse {
    pub replaced: bool,
    pub length: usize,
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub nodes: Vec<String>,
}

#[derive(Serialize)]
pub struct RegisterResponse {
    pub added: Vec<String>,
    pub total_nodes: usize,
}

#[derive(Serialize)]
pub struct PeersResponse {
    pub count: usize,
    pub peers: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(body: Value) -> Result<Transaction, TxError> {
        serde_json::from_value::<NewTxRequest>(body)
            .unwrap()
            .into_transaction()
    }

    #[test]
    fn accepts_numeric_strings() {
        let tx = parse(json!({"sender": "a", "recipient": "b", "amount": " 12.5 "})).unwrap();
        assert_eq!(tx.amount, 12.5);
    }

    #[test]
    fn keeps_a_gossiped_timestamp() {
        let tx = parse(json!({"sender": "a", "recipient": "b", "amount": 1, "timestamp": 7.25})).unwrap();
        assert_eq!(tx.timestamp, 7.25);
    }

    #[test]
    fn reports_what_is_wrong() {
        assert_eq!(
            parse(json!({"recipient": "b", "amount": 1})),
            Err(TxError::MissingField("sender"))
        );
        assert_eq!(
            parse(json!({"sender": "a", "recipient": "b"})),
            Err(TxError::MissingField("amount"))
        );
        assert_eq!(
            parse(json!({"sender": "a", "recipient": "b", "amount": "ten"})),
            Err(TxError::NonNumericAmount)
        );
        assert_eq!(
            parse(json!({"sender": "a", "recipient": "b", "amount": [1]})),
            Err(TxError::NonNumericAmount)
        );
    }
}
