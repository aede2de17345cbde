//! Configuration for the payment gateway server.
//!
//! Every field may come from an optional JSON file (`--config` / `$CONFIG`). Fields absent
//! from the file fall back to environment variables, then to hardcoded defaults. A `.env`
//! file is loaded by `main` before any of this runs.
//!
//! ```json
//! {
//!   "port": 3000,
//!   "payTo": "0x2222222222222222222222222222222222222222",
//!   "price": "100000",
//!   "network": "base",
//!   "merchantKey": "$MERCHANT_PRIVATE_KEY",
//!   "rpc": { "base": [{ "http": "https://mainnet.base.org", "rateLimit": 50 }] }
//! }
//! ```

use alloy_primitives::{Address, B256};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::net::IpAddr;
use std::ops::Deref;
use std::path::PathBuf;
use std::str::FromStr;
use url::Url;

use crate::proto::v1::TokenAmount;

#[derive(Parser, Debug)]
#[command(name = "push-x402")]
#[command(about = "Pay-per-request gateway settling x402 USDC payments")]
struct CliArgs {
    /// Path to the JSON configuration file
    #[arg(long, short, env = "CONFIG")]
    config: Option<PathBuf>,
}

/// One RPC endpoint of a network.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RpcConfig {
    pub http: Url,
    /// Requests per second.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<u32>,
}

/// A config value given either literally or as a `$VAR` / `${VAR}` environment reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralOrEnv<T>(T);

impl<T> LiteralOrEnv<T> {
    pub fn from_literal(value: T) -> Self {
        Self(value)
    }

    fn env_var_name(s: &str) -> Option<&str> {
        if let Some(braced) = s.strip_prefix("${").and_then(|rest| rest.strip_suffix('}')) {
            return Some(braced);
        }
        let name = s.strip_prefix('$')?;
        let is_name = !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_');
        is_name.then_some(name)
    }
}

impl<T> Deref for LiteralOrEnv<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'de, T> Deserialize<'de> for LiteralOrEnv<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let value = match Self::env_var_name(&s) {
            Some(var_name) => std::env::var(var_name).map_err(|_| {
                serde::de::Error::custom(format!(
                    "Environment variable '{var_name}' not found (referenced as '{s}')"
                ))
            })?,
            None => s,
        };
        value
            .parse::<T>()
            .map(LiteralOrEnv)
            .map_err(|e| serde::de::Error::custom(format!("Failed to parse value: {e}")))
    }
}

/// Private key of the account that submits `transferWithAuthorization` and pays its gas.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct MerchantKey(B256);

impl MerchantKey {
    pub fn as_b256(&self) -> &B256 {
        &self.0
    }
}

impl fmt::Debug for MerchantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MerchantKey(..)")
    }
}

impl FromStr for MerchantKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = B256::from_str(s.trim()).map_err(|e| format!("Invalid merchant key: {e}"))?;
        if key.is_zero() {
            return Err("Invalid merchant key: zero".to_string());
        }
        Ok(Self(key))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default = "config_defaults::default_host")]
    host: IpAddr,
    #[serde(default = "config_defaults::default_port")]
    port: u16,
    #[serde(default = "config_defaults::default_pay_to")]
    pay_to: Address,
    #[serde(default = "config_defaults::default_price")]
    price: TokenAmount,
    #[serde(default = "config_defaults::default_network")]
    network: String,
    #[serde(default = "config_defaults::default_service_name")]
    service_name: String,
    /// Absent means demo mode. Resolved from `$MERCHANT_PRIVATE_KEY` when not in the file.
    #[serde(default)]
    merchant_key: Option<LiteralOrEnv<MerchantKey>>,
    #[serde(default = "config_defaults::default_settlement_timeout_secs")]
    settlement_timeout_secs: u64,
    #[serde(default = "config_defaults::default_receipt_timeout_secs")]
    receipt_timeout_secs: u64,
    /// RPC overrides per network key. Networks not listed use the registry endpoint.
    #[serde(default)]
    rpc: HashMap<String, Vec<RpcConfig>>,
}

pub mod config_defaults {
    use alloy_primitives::Address;
    use std::env;
    use std::net::{IpAddr, Ipv4Addr};

    use crate::proto::v1::TokenAmount;

    pub const DEFAULT_PORT: u16 = 3000;
    pub const DEFAULT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
    pub const DEFAULT_PRICE: u64 = 100_000;
    pub const DEFAULT_NETWORK: &str = "base";
    pub const DEFAULT_SERVICE_NAME: &str = "Push AI";
    pub const DEFAULT_SETTLEMENT_TIMEOUT_SECS: u64 = 3600;
    pub const DEFAULT_RECEIPT_TIMEOUT_SECS: u64 = 30;

    fn from_env<T: std::str::FromStr>(name: &str) -> Option<T> {
        env::var(name).ok().and_then(|s| s.trim().parse().ok())
    }

    /// `$PORT` -> 3000
    pub fn default_port() -> u16 {
        from_env("PORT").unwrap_or(DEFAULT_PORT)
    }

    /// `$HOST` -> 0.0.0.0
    pub fn default_host() -> IpAddr {
        from_env("HOST").unwrap_or(DEFAULT_HOST)
    }

    /// `$PAY_TO_ADDRESS` -> zero address
    pub fn default_pay_to() -> Address {
        from_env("PAY_TO_ADDRESS").unwrap_or(Address::ZERO)
    }

    /// `$DEFAULT_PRICE` -> 100000 (0.10 USDC)
    pub fn default_price() -> TokenAmount {
        from_env("DEFAULT_PRICE").unwrap_or(TokenAmount::from(DEFAULT_PRICE))
    }

    /// `$NETWORK` -> base
    pub fn default_network() -> String {
        from_env("NETWORK").unwrap_or_else(|| DEFAULT_NETWORK.to_string())
    }

    pub fn default_service_name() -> String {
        DEFAULT_SERVICE_NAME.to_string()
    }

    pub fn default_settlement_timeout_secs() -> u64 {
        DEFAULT_SETTLEMENT_TIMEOUT_SECS
    }

    /// `$TX_RECEIPT_TIMEOUT_SECS` -> 30
    pub fn default_receipt_timeout_secs() -> u64 {
        from_env("TX_RECEIPT_TIMEOUT_SECS").unwrap_or(DEFAULT_RECEIPT_TIMEOUT_SECS)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {0}: {1}")]
    FileRead(PathBuf, std::io::Error),
    #[error("Failed to parse config file: {0}")]
    JsonParse(#[from] serde_json::Error),
    #[error("Invalid MERCHANT_PRIVATE_KEY: {0}")]
    InvalidMerchantKey(String),
}

impl Config {
    /// Load configuration from CLI arguments, the optional JSON file and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let cli_args = CliArgs::parse();
        let content = match cli_args.config {
            Some(path) => fs::read_to_string(&path).map_err(|e| ConfigError::FileRead(path, e))?,
            None => "{}".to_string(),
        };
        let mut config = Self::from_json(&content)?;
        if config.merchant_key.is_none() {
            config.merchant_key = merchant_key_from_env()?;
        }
        Ok(config)
    }

    /// Parse a JSON document. Missing fields take their environment or default values;
    /// the merchant key is only read from the document.
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn host(&self) -> IpAddr {
        self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Recipient of payments for the gated resource.
    pub fn pay_to(&self) -> Address {
        self.pay_to
    }

    /// Price of one gated request in the smallest USDC unit.
    pub fn price(&self) -> TokenAmount {
        self.price
    }

    /// Network key payments are requested on.
    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn merchant_key(&self) -> Option<&MerchantKey> {
        self.merchant_key.as_deref()
    }

    pub fn settlement_timeout_secs(&self) -> u64 {
        self.settlement_timeout_secs
    }

    pub fn receipt_timeout_secs(&self) -> u64 {
        self.receipt_timeout_secs
    }

    pub fn rpc(&self) -> &HashMap<String, Vec<RpcConfig>> {
        &self.rpc
    }
}

fn merchant_key_from_env() -> Result<Option<LiteralOrEnv<MerchantKey>>, ConfigError> {
    match std::env::var("MERCHANT_PRIVATE_KEY") {
        Ok(value) if !value.trim().is_empty() => value
            .parse::<MerchantKey>()
            .map(|key| Some(LiteralOrEnv::from_literal(key)))
            .map_err(ConfigError::InvalidMerchantKey),
        _ => Ok(None),
    }
}
