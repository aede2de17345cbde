//! On-chain collaborators of the settlement engine.
//!
//! The engine only talks to the USDC contract through [`StablecoinLedger`], and finds the
//! ledger of a network through [`LedgerRegistry`]. [`ChainRegistry`] is the live
//! implementation: one signing [`Eip155ChainProvider`] per supported network, built once at
//! startup from the merchant key and shared by `Arc`.

pub mod eip155;

use alloy_primitives::{Address, B256, TxHash, U256};
use alloy_provider::PendingTransactionError;
use alloy_transport::TransportError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

use crate::config::{Config, MerchantKey, RpcConfig};
use crate::networks::NetworkRegistry;

pub use eip155::{Eip155ChainProvider, PendingNonceManager};

/// Arguments of `transferWithAuthorization(from, to, value, validAfter, validBefore, nonce, v, r, s)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignedTransfer {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub valid_after: U256,
    pub valid_before: U256,
    pub nonce: B256,
    pub v: u8,
    pub r: B256,
    pub s: B256,
}

/// Outcome of a mined `transferWithAuthorization` transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferReceipt {
    pub tx_hash: TxHash,
    pub block_number: Option<u64>,
    pub gas_used: u64,
    /// `false` when the transaction was mined but reverted.
    pub success: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    PendingTransaction(#[from] PendingTransactionError),
    #[error("Contract call failed: {0}")]
    Contract(String),
    /// Submitted, but no confirmation arrived in time. The transfer may still be mined.
    #[error("Transaction {tx_hash} was not confirmed within {seconds} seconds")]
    ReceiptTimeout { tx_hash: TxHash, seconds: u64 },
}

impl From<alloy_contract::Error> for LedgerError {
    fn from(value: alloy_contract::Error) -> Self {
        match value {
            alloy_contract::Error::TransportError(e) => Self::Transport(e),
            other => Self::Contract(other.to_string()),
        }
    }
}

/// The EIP-3009 stablecoin contract of one network, as seen by the settling account.
#[async_trait]
pub trait StablecoinLedger: Send + Sync {
    /// Account that submits transfers and pays their gas.
    fn settler(&self) -> Address;

    /// Whether `nonce` was already consumed by `authorizer`.
    async fn authorization_state(&self, authorizer: Address, nonce: B256)
    -> Result<bool, LedgerError>;

    async fn balance_of(&self, owner: Address) -> Result<U256, LedgerError>;

    /// Native currency balance, used to report whether the settler can pay for gas.
    async fn native_balance(&self, owner: Address) -> Result<U256, LedgerError>;

    /// Submit the transfer and wait for one confirmation.
    ///
    /// A mined but reverted transaction is reported through [`TransferReceipt::success`],
    /// not as an error.
    async fn transfer_with_authorization(
        &self,
        transfer: &SignedTransfer,
    ) -> Result<TransferReceipt, LedgerError>;
}

/// Lookup of the ledger serving a network key.
pub trait LedgerRegistry: Send + Sync {
    fn ledger(&self, network: &str) -> Option<Arc<dyn StablecoinLedger>>;
}

#[derive(Debug, thiserror::Error)]
pub enum ChainRegistryError {
    #[error("Invalid merchant key: {0}")]
    InvalidKey(String),
    #[error("Invalid RPC URL for {network}: {url}")]
    InvalidRpcUrl { network: String, url: String },
    #[error("No RPC endpoint configured for {0}")]
    NoRpc(String),
}

/// Signing providers for every supported network.
#[derive(Debug, Default)]
pub struct ChainRegistry {
    providers: HashMap<&'static str, Arc<Eip155ChainProvider>>,
}

impl ChainRegistry {
    pub fn from_config(
        config: &Config,
        networks: &NetworkRegistry,
        merchant_key: &MerchantKey,
    ) -> Result<Self, ChainRegistryError> {
        let mut providers = HashMap::with_capacity(networks.len());
        for network in networks.iter() {
            let rpc = match config.rpc().get(network.key) {
                Some(rpc) => rpc.clone(),
                None => {
                    let http = Url::parse(&network.rpc_url).map_err(|_| {
                        ChainRegistryError::InvalidRpcUrl {
                            network: network.key.to_string(),
                            url: network.rpc_url.clone(),
                        }
                    })?;
                    vec![RpcConfig {
                        http,
                        rate_limit: None,
                    }]
                }
            };
            let provider = Eip155ChainProvider::new(
                network,
                merchant_key,
                &rpc,
                config.receipt_timeout_secs(),
            )?;
            providers.insert(network.key, Arc::new(provider));
        }
        Ok(Self { providers })
    }

}

impl LedgerRegistry for ChainRegistry {
    fn ledger(&self, network: &str) -> Option<Arc<dyn StablecoinLedger>> {
        self.providers
            .get(network)
            .map(|provider| Arc::clone(provider) as Arc<dyn StablecoinLedger>)
    }
}
