use std::str::FromStr;

use bitcoin::Network;
use serde::{Deserialize, Serialize};

use crate::error::BtcError;

/// Default proxy that relays batched calls to an Electrum server.
pub const DEFAULT_PROXY_ADDRESS: &str = "https://proxy.wallet.mooo.tech";

/// Default Electrum protocol version sent in the `server.version` handshake.
pub const DEFAULT_ELECTRUM_PROTOCOL: &str = "1.4";

/// Default fee tier list endpoint.
pub const DEFAULT_FEE_ESTIMATES_URL: &str = "https://bitcoinfees.earn.com/api/v1/fees/list";

/// Supported Bitcoin networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BtcNetwork {
    Mainnet,
    Testnet,
    Signet,
    Regtest,
}

impl BtcNetwork {
    /// Convert to the `bitcoin` crate's `Network` type.
    pub fn to_bitcoin_network(self) -> Network {
        match self {
            BtcNetwork::Mainnet => Network::Bitcoin,
            BtcNetwork::Testnet => Network::Testnet,
            BtcNetwork::Signet => Network::Signet,
            BtcNetwork::Regtest => Network::Regtest,
        }
    }

    pub fn is_testnet(self) -> bool {
        !matches!(self, BtcNetwork::Mainnet)
    }
}

impl std::fmt::Display for BtcNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BtcNetwork::Mainnet => write!(f, "mainnet"),
            BtcNetwork::Testnet => write!(f, "testnet"),
            BtcNetwork::Signet => write!(f, "signet"),
            BtcNetwork::Regtest => write!(f, "regtest"),
        }
    }
}

impl FromStr for BtcNetwork {
    type Err = BtcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mainnet" | "main" | "bitcoin" => Ok(BtcNetwork::Mainnet),
            "testnet" | "test" => Ok(BtcNetwork::Testnet),
            "signet" => Ok(BtcNetwork::Signet),
            "regtest" => Ok(BtcNetwork::Regtest),
            other => Err(BtcError::InvalidNetwork(other.to_string())),
        }
    }
}

/// Chain selection and indexer endpoint for one deployment.
///
/// Passed by reference into every operation that talks to the indexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    pub network: BtcNetwork,
    /// Electrum server host the proxy should relay to.
    #[serde(default)]
    pub electrum_server: String,
    #[serde(default)]
    pub electrum_port: u16,
    #[serde(default = "default_electrum_protocol")]
    pub electrum_protocol: String,
    #[serde(default = "default_proxy_address")]
    pub proxy_address: String,
    #[serde(default = "default_fee_estimates_url")]
    pub fee_estimates_url: String,
}

fn default_electrum_protocol() -> String {
    DEFAULT_ELECTRUM_PROTOCOL.to_string()
}

fn default_proxy_address() -> String {
    DEFAULT_PROXY_ADDRESS.to_string()
}

fn default_fee_estimates_url() -> String {
    DEFAULT_FEE_ESTIMATES_URL.to_string()
}

impl Environment {
    pub fn new(network: BtcNetwork, electrum_server: impl Into<String>, electrum_port: u16) -> Self {
        Self {
            network,
            electrum_server: electrum_server.into(),
            electrum_port,
            electrum_protocol: default_electrum_protocol(),
            proxy_address: default_proxy_address(),
            fee_estimates_url: default_fee_estimates_url(),
        }
    }

    pub fn mainnet() -> Self {
        Self::new(BtcNetwork::Mainnet, "", 0)
    }

    pub fn testnet() -> Self {
        Self::new(BtcNetwork::Testnet, "", 0)
    }

    /// URL the batched calls are posted to.
    pub fn proxy_endpoint(&self) -> String {
        format!("{}/api/proxy", self.proxy_address.trim_end_matches('/'))
    }
}
