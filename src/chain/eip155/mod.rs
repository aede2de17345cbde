pub mod pending_nonce_manager;

use alloy_network::{EthereumWallet, TransactionBuilder};
use alloy_primitives::{Address, B256, Bytes, U256};
use alloy_provider::fillers::{
    ChainIdFiller, FillProvider, GasFiller, JoinFill, NonceFiller, WalletFiller,
};
use alloy_provider::{
    Identity, PendingTransactionError, Provider, ProviderBuilder, RootProvider, WatchTxError,
};
use alloy_rpc_client::RpcClient;
use alloy_rpc_types_eth::{TransactionReceipt, TransactionRequest};
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::sol;
use alloy_transport::layers::{FallbackLayer, ThrottleLayer};
use alloy_transport_http::Http;
use async_trait::async_trait;
use std::num::NonZeroUsize;
use std::time::Duration;
use tower::ServiceBuilder;
use tracing::{Instrument, instrument};

use crate::chain::{
    ChainRegistryError, LedgerError, SignedTransfer, StablecoinLedger, TransferReceipt,
};
use crate::config::{MerchantKey, RpcConfig};
use crate::networks::NetworkConfig;
pub use pending_nonce_manager::*;

/// Gas limit of a `transferWithAuthorization` call. A USDC transfer uses well under this.
pub const TRANSFER_GAS_LIMIT: u64 = 100_000;

/// Confirmations awaited before a transfer is reported as settled.
pub const TRANSFER_CONFIRMATIONS: u64 = 1;

/// Filler stack: gas, then nonce (sequenced by [`PendingNonceManager`]), then chain id.
pub type InnerFiller =
    JoinFill<GasFiller, JoinFill<NonceFiller<PendingNonceManager>, ChainIdFiller>>;

/// Provider signing with the merchant key over a throttled, fallback-capable HTTP transport.
pub type InnerProvider = FillProvider<
    JoinFill<JoinFill<Identity, InnerFiller>, WalletFiller<EthereumWallet>>,
    RootProvider,
>;

sol! {
    #[allow(missing_docs)]
    #[allow(clippy::too_many_arguments)]
    #[derive(Debug)]
    #[sol(rpc)]
    interface IEIP3009 {
        function transferWithAuthorization(
            address from,
            address to,
            uint256 value,
            uint256 validAfter,
            uint256 validBefore,
            bytes32 nonce,
            uint8 v,
            bytes32 r,
            bytes32 s
        ) external;

        function authorizationState(address authorizer, bytes32 nonce) external view returns (bool);

        function balanceOf(address account) external view returns (uint256);
    }
}

/// A transaction to the token contract, before gas and nonce are filled in.
#[derive(Debug, Clone)]
struct ContractTransaction {
    to: Address,
    calldata: Bytes,
    gas_limit: u64,
    confirmations: u64,
}

/// Live [`StablecoinLedger`] for one EVM network.
#[derive(Debug)]
pub struct Eip155ChainProvider {
    network: &'static str,
    eip1559: bool,
    usdc_address: Address,
    receipt_timeout_secs: u64,
    inner: InnerProvider,
    signer_address: Address,
    /// Kept to reset the settler's nonce after a failed submission.
    nonce_manager: PendingNonceManager,
}

impl Eip155ChainProvider {
    pub fn new(
        network: &NetworkConfig,
        merchant_key: &MerchantKey,
        rpc: &[RpcConfig],
        receipt_timeout_secs: u64,
    ) -> Result<Self, ChainRegistryError> {
        let signer = PrivateKeySigner::from_bytes(merchant_key.as_b256())
            .map_err(|e| ChainRegistryError::InvalidKey(e.to_string()))?
            .with_chain_id(Some(network.chain_id));
        let signer_address = signer.address();
        let wallet = EthereumWallet::from(signer);

        let transports = rpc
            .iter()
            .filter(|rpc| matches!(rpc.http.scheme(), "http" | "https"))
            .map(|rpc| {
                tracing::info!(network = network.key, rpc_url = %rpc.http, rate_limit = ?rpc.rate_limit, "Using HTTP transport");
                ServiceBuilder::new()
                    .layer(ThrottleLayer::new(rpc.rate_limit.unwrap_or(u32::MAX)))
                    .service(Http::new(rpc.http.clone()))
            })
            .collect::<Vec<_>>();
        let active = NonZeroUsize::new(transports.len())
            .ok_or_else(|| ChainRegistryError::NoRpc(network.key.to_string()))?;
        let fallback = ServiceBuilder::new()
            .layer(FallbackLayer::default().with_active_transport_count(active))
            .service(transports);
        let client = RpcClient::new(fallback, false);

        let nonce_manager = PendingNonceManager::default();
        let filler = JoinFill::new(
            GasFiller,
            JoinFill::new(
                NonceFiller::new(nonce_manager.clone()),
                ChainIdFiller::default(),
            ),
        );
        let inner: InnerProvider = ProviderBuilder::default()
            .filler(filler)
            .wallet(wallet)
            .connect_client(client);

        tracing::info!(network = network.key, chain_id = network.chain_id, settler = %signer_address, "Initialized EVM provider");

        Ok(Self {
            network: network.key,
            eip1559: network.eip1559,
            usdc_address: network.usdc_address,
            receipt_timeout_secs,
            inner,
            signer_address,
            nonce_manager,
        })
    }

    fn usdc(&self) -> IEIP3009::IEIP3009Instance<&InnerProvider> {
        IEIP3009::new(self.usdc_address, &self.inner)
    }

    /// Sign and send `tx` from the settler, then wait for its receipt.
    ///
    /// Legacy-fee chains get an explicit gas price. Any failure after the nonce was
    /// allocated resets the settler's nonce, since the transaction may or may not have
    /// reached the mempool. A receipt that does not arrive within `receipt_timeout_secs`
    /// is reported as [`LedgerError::ReceiptTimeout`] with the pending hash.
    async fn send_transaction(
        &self,
        tx: ContractTransaction,
    ) -> Result<TransactionReceipt, LedgerError> {
        let mut txr = TransactionRequest::default()
            .with_to(tx.to)
            .with_from(self.signer_address)
            .with_input(tx.calldata)
            .with_gas_limit(tx.gas_limit);

        if !self.eip1559 {
            let gas_price = self
                .inner
                .get_gas_price()
                .instrument(tracing::info_span!("get_gas_price", otel.kind = "client"))
                .await?;
            txr.set_gas_price(gas_price);
        }

        let pending_tx = match self.inner.send_transaction(txr).await {
            Ok(pending) => pending,
            Err(e) => {
                self.nonce_manager.reset_nonce(self.signer_address).await;
                return Err(LedgerError::Transport(e));
            }
        };
        let tx_hash = *pending_tx.tx_hash();
        tracing::info!(tx = %tx_hash, network = self.network, "Transaction submitted");

        let watcher = pending_tx
            .with_required_confirmations(tx.confirmations)
            .with_timeout(Some(Duration::from_secs(self.receipt_timeout_secs)));
        match watcher.get_receipt().await {
            Ok(receipt) => Ok(receipt),
            Err(PendingTransactionError::TxWatcher(WatchTxError::Timeout)) => {
                self.nonce_manager.reset_nonce(self.signer_address).await;
                tracing::warn!(tx = %tx_hash, network = self.network, "Transaction not confirmed in time");
                Err(LedgerError::ReceiptTimeout {
                    tx_hash,
                    seconds: self.receipt_timeout_secs,
                })
            }
            Err(e) => {
                self.nonce_manager.reset_nonce(self.signer_address).await;
                Err(LedgerError::PendingTransaction(e))
            }
        }
    }
}

#[async_trait]
impl StablecoinLedger for Eip155ChainProvider {
    fn settler(&self) -> Address {
        self.signer_address
    }

    #[instrument(skip_all, err, fields(network = self.network, authorizer = %authorizer, nonce = %nonce))]
    async fn authorization_state(
        &self,
        authorizer: Address,
        nonce: B256,
    ) -> Result<bool, LedgerError> {
        let used = self
            .usdc()
            .authorizationState(authorizer, nonce)
            .call()
            .into_future()
            .instrument(tracing::info_span!(
                "fetch_authorization_state",
                token_contract = %self.usdc_address,
                otel.kind = "client",
            ))
            .await?;
        Ok(used)
    }

    #[instrument(skip_all, err, fields(network = self.network, owner = %owner))]
    async fn balance_of(&self, owner: Address) -> Result<U256, LedgerError> {
        let balance = self
            .usdc()
            .balanceOf(owner)
            .call()
            .into_future()
            .instrument(tracing::info_span!(
                "fetch_token_balance",
                token_contract = %self.usdc_address,
                otel.kind = "client",
            ))
            .await?;
        Ok(balance)
    }

    #[instrument(skip_all, err, fields(network = self.network, owner = %owner))]
    async fn native_balance(&self, owner: Address) -> Result<U256, LedgerError> {
        let balance = self
            .inner
            .get_balance(owner)
            .into_future()
            .instrument(tracing::info_span!("fetch_native_balance", otel.kind = "client"))
            .await?;
        Ok(balance)
    }

    async fn transfer_with_authorization(
        &self,
        transfer: &SignedTransfer,
    ) -> Result<TransferReceipt, LedgerError> {
        let usdc = self.usdc();
        let call = usdc.transferWithAuthorization(
            transfer.from,
            transfer.to,
            transfer.value,
            transfer.valid_after,
            transfer.valid_before,
            transfer.nonce,
            transfer.v,
            transfer.r,
            transfer.s,
        );
        let tx = ContractTransaction {
            to: self.usdc_address,
            calldata: call.calldata().clone(),
            gas_limit: TRANSFER_GAS_LIMIT,
            confirmations: TRANSFER_CONFIRMATIONS,
        };
        let receipt = self
            .send_transaction(tx)
            .instrument(tracing::info_span!(
                "call_transferWithAuthorization",
                network = self.network,
                from = %transfer.from,
                to = %transfer.to,
                value = %transfer.value,
                valid_after = %transfer.valid_after,
                valid_before = %transfer.valid_before,
                nonce = %transfer.nonce,
                token_contract = %self.usdc_address,
                otel.kind = "client",
            ))
            .await?;
        Ok(TransferReceipt {
            tx_hash: receipt.transaction_hash,
            block_number: receipt.block_number,
            gas_used: receipt.gas_used,
            success: receipt.status(),
        })
    }
}
