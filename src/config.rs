use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::blockchain::{
    DEFAULT_BATCH_SIZE, DEFAULT_DIFFICULTY, DEFAULT_MINING_REWARD, DEFAULT_STARTING_BALANCE,
    LedgerParams,
};
use crate::error::ConfigError;

/// Everything the node needs from its environment.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub host: String,
    pub port: u16,
    /// Base URL other nodes use to reach this one.
    pub public_url: String,
    pub node_id: String,
    pub miner_mode: bool,
    pub miner_address: String,
    pub ledger: LedgerParams,
    pub batch_size: usize,
    pub peers: Vec<String>,
    pub peer_timeout: Duration,
    pub sweep_interval: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let node_id = uuid::Uuid::new_v4().simple().to_string();
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            public_url: "http://127.0.0.1:8080".to_string(),
            miner_address: format!("miner-{node_id}"),
            node_id,
            miner_mode: false,
            ledger: LedgerParams::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            peers: Vec::new(),
            peer_timeout: Duration::from_millis(5000),
            sweep_interval: Duration::from_secs(30),
        }
    }
}

impl NodeConfig {
    /// Read configuration from the process environment (after `.env` has
    /// been loaded). Unset keys fall back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let host = lookup("HOST").unwrap_or(defaults.host);
        let port: u16 = parse(&lookup, "PORT", defaults.port)?;
        let public_url = lookup("PUBLIC_URL")
            .map(|u| normalize_url(&u))
            .unwrap_or_else(|| format!("http://{host}:{port}"));

        let batch_size: usize = parse(&lookup, "MINING_BATCH_SIZE", DEFAULT_BATCH_SIZE)?;
        if batch_size == 0 {
            return Err(ConfigError::Invalid {
                key: "MINING_BATCH_SIZE",
                value: "0".into(),
            });
        }

        let peers: Vec<String> = lookup("PEERS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(normalize_url)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            host,
            port,
            public_url,
            miner_mode: parse_bool(&lookup, "MINER_MODE", false)?,
            miner_address: lookup("MINER_ADDRESS").unwrap_or(defaults.miner_address),
            node_id: defaults.node_id,
            ledger: LedgerParams {
                difficulty: parse(&lookup, "DIFFICULTY", DEFAULT_DIFFICULTY)?,
                mining_reward: parse(&lookup, "MINING_REWARD", DEFAULT_MINING_REWARD)?,
                starting_balance: parse(&lookup, "STARTING_BALANCE", DEFAULT_STARTING_BALANCE)?,
            },
            batch_size,
            peers,
            peer_timeout: Duration::from_millis(parse(&lookup, "PEER_TIMEOUT_MS", 5000)?),
            sweep_interval: Duration::from_secs(parse(&lookup, "SWEEP_INTERVAL_SECS", 30)?),
        })
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}

fn parse_bool(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: bool,
) -> Result<bool, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid { key, value }),
        },
    }
}

/// `host:port` → `http://host:port`, without a trailing slash.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}
