//! Registry of supported EVM networks and their USDC deployments.
//!
//! Each network is addressed by a short key (`"base"`, `"polygon"`, ...) which is also the
//! `network` field of x402 v1 payment payloads and requirements. The registry is pure data:
//! it is built once at startup (see [`NetworkRegistry::from_env`]) and shared read-only.
//!
//! RPC endpoints default to public nodes and may be overridden per network with an
//! environment variable (for example `BASE_RPC_URL`), or through the JSON config file.

use alloy_primitives::{Address, address};
use serde::Serialize;
use std::collections::BTreeMap;
use std::env;

/// Base USDC. Used by the requirements builder when a network key is unknown.
pub const DEFAULT_USDC_ADDRESS: Address = address!("0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913");

/// Number of decimals of every USDC deployment in the registry.
pub const USDC_DECIMALS: u32 = 6;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NativeCurrency {
    pub name: &'static str,
    pub symbol: &'static str,
    pub decimals: u8,
}

/// Static description of a supported chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    #[serde(skip)]
    pub key: &'static str,
    pub name: &'static str,
    pub short_name: &'static str,
    pub chain_id: u64,
    pub rpc_url: String,
    pub explorer_url: &'static str,
    pub native_currency: NativeCurrency,
    pub usdc_address: Address,
    /// Whether the chain prices gas with EIP-1559 fees. Legacy chains get an explicit gas price.
    #[serde(skip)]
    pub eip1559: bool,
}

impl NetworkConfig {
    pub fn explorer_tx_url(&self, tx: &str) -> String {
        format!("{}/tx/{}", self.explorer_url, tx)
    }
}

struct KnownNetwork {
    key: &'static str,
    name: &'static str,
    short_name: &'static str,
    chain_id: u64,
    rpc_env: &'static str,
    default_rpc: &'static str,
    explorer_url: &'static str,
    native_currency: NativeCurrency,
    usdc_address: Address,
    eip1559: bool,
}

const ETHER: NativeCurrency = NativeCurrency {
    name: "Ethereum",
    symbol: "ETH",
    decimals: 18,
};

static KNOWN_NETWORKS: [KnownNetwork; 7] = [
    KnownNetwork {
        key: "base",
        name: "Base",
        short_name: "BASE",
        chain_id: 8453,
        rpc_env: "BASE_RPC_URL",
        default_rpc: "https://mainnet.base.org",
        explorer_url: "https://basescan.org",
        native_currency: ETHER,
        usdc_address: DEFAULT_USDC_ADDRESS,
        eip1559: true,
    },
    KnownNetwork {
        key: "ethereum",
        name: "Ethereum",
        short_name: "ETH",
        chain_id: 1,
        rpc_env: "ETH_RPC_URL",
        default_rpc: "https://eth.llamarpc.com",
        explorer_url: "https://etherscan.io",
        native_currency: ETHER,
        usdc_address: address!("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"),
        eip1559: true,
    },
    KnownNetwork {
        key: "polygon",
        name: "Polygon",
        short_name: "MATIC",
        chain_id: 137,
        rpc_env: "POLYGON_RPC_URL",
        default_rpc: "https://polygon-rpc.com",
        explorer_url: "https://polygonscan.com",
        native_currency: NativeCurrency {
            name: "POL",
            symbol: "POL",
            decimals: 18,
        },
        usdc_address: address!("0x3c499c542cEF5E3811e1192ce70d8cC03d5c3359"),
        eip1559: true,
    },
    KnownNetwork {
        key: "arbitrum",
        name: "Arbitrum One",
        short_name: "ARB",
        chain_id: 42161,
        rpc_env: "ARBITRUM_RPC_URL",
        default_rpc: "https://arb1.arbitrum.io/rpc",
        explorer_url: "https://arbiscan.io",
        native_currency: ETHER,
        usdc_address: address!("0xaf88d065e77c8cC2239327C5EDb3A432268e5831"),
        eip1559: true,
    },
    KnownNetwork {
        key: "optimism",
        name: "Optimism",
        short_name: "OP",
        chain_id: 10,
        rpc_env: "OPTIMISM_RPC_URL",
        default_rpc: "https://mainnet.optimism.io",
        explorer_url: "https://optimistic.etherscan.io",
        native_currency: ETHER,
        usdc_address: address!("0x0b2C639c533813f4Aa9D7837CAf62653d097Ff85"),
        eip1559: true,
    },
    KnownNetwork {
        key: "avalanche",
        name: "Avalanche",
        short_name: "AVAX",
        chain_id: 43114,
        rpc_env: "AVALANCHE_RPC_URL",
        default_rpc: "https://api.avax.network/ext/bc/C/rpc",
        explorer_url: "https://snowtrace.io",
        native_currency: NativeCurrency {
            name: "Avalanche",
            symbol: "AVAX",
            decimals: 18,
        },
        usdc_address: address!("0xB97EF9Ef8734C71904D8002F8b6Bc66Dd9c48a6E"),
        eip1559: true,
    },
    KnownNetwork {
        key: "bsc",
        name: "BNB Chain",
        short_name: "BSC",
        chain_id: 56,
        rpc_env: "BSC_RPC_URL",
        default_rpc: "https://bsc-dataseed.binance.org",
        explorer_url: "https://bscscan.com",
        native_currency: NativeCurrency {
            name: "BNB",
            symbol: "BNB",
            decimals: 18,
        },
        usdc_address: address!("0x8AC76a51cc950d9822D68b83fE1Ad97B32Cd580d"),
        eip1559: false,
    },
];

impl KnownNetwork {
    fn to_config(&self, rpc_url: String) -> NetworkConfig {
        NetworkConfig {
            key: self.key,
            name: self.name,
            short_name: self.short_name,
            chain_id: self.chain_id,
            rpc_url,
            explorer_url: self.explorer_url,
            native_currency: self.native_currency.clone(),
            usdc_address: self.usdc_address,
            eip1559: self.eip1559,
        }
    }
}

/// Lookup table of supported networks keyed by short network name.
#[derive(Debug, Clone)]
pub struct NetworkRegistry(BTreeMap<&'static str, NetworkConfig>);

impl Default for NetworkRegistry {
    /// All known networks with their default public RPC endpoints.
    fn default() -> Self {
        Self::build(|known| known.default_rpc.to_string())
    }
}

impl NetworkRegistry {
    /// All known networks, with RPC endpoints taken from `<NETWORK>_RPC_URL` when set.
    pub fn from_env() -> Self {
        Self::build(|known| {
            env::var(known.rpc_env)
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| known.default_rpc.to_string())
        })
    }

    fn build<F: Fn(&KnownNetwork) -> String>(rpc_url: F) -> Self {
        let networks = KNOWN_NETWORKS
            .iter()
            .map(|known| (known.key, known.to_config(rpc_url(known))))
            .collect();
        Self(networks)
    }

    pub fn by_key(&self, key: &str) -> Option<&NetworkConfig> {
        self.0.get(key)
    }

    pub fn keys(&self) -> Vec<&'static str> {
        self.0.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NetworkConfig> {
        self.0.values()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for NetworkRegistry {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}
