use alloy_primitives::Address;
use alloy_provider::Provider;
use alloy_provider::fillers::NonceManager;
use alloy_transport::TransportResult;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Sentinel for "not fetched yet".
const UNKNOWN: u64 = u64::MAX;

/// Sequences transaction nonces of the settling account.
///
/// Every settlement submits `transferWithAuthorization` from the same merchant account, so
/// concurrent settlements would otherwise race for the same nonce. Each address gets its own
/// mutex: allocation for one address never blocks another.
///
/// The first allocation for an address queries the *pending* transaction count, so that
/// transactions still sitting in the mempool after a restart are not reused. Later
/// allocations increment locally. After a failed submission the cache is [reset], because
/// the transaction may or may not have reached the mempool.
///
/// [reset]: PendingNonceManager::reset_nonce
#[derive(Clone, Debug, Default)]
pub struct PendingNonceManager {
    nonces: Arc<DashMap<Address, Arc<Mutex<u64>>>>,
}

#[async_trait]
impl NonceManager for PendingNonceManager {
    async fn get_next_nonce<P, N>(&self, provider: &P, address: Address) -> TransportResult<u64>
    where
        P: Provider<N>,
        N: alloy_network::Network,
    {
        self.next_nonce_with(address, move || async move {
            provider.get_transaction_count(address).pending().await
        })
        .await
    }
}

impl PendingNonceManager {
    /// Allocate the next nonce for `address`, calling `fetch` only when the cache is cold.
    async fn next_nonce_with<F, Fut>(&self, address: Address, fetch: F) -> TransportResult<u64>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = TransportResult<u64>>,
    {
        // The dashmap shard lock must not be held across the await below.
        let slot = {
            let entry = self
                .nonces
                .entry(address)
                .or_insert_with(|| Arc::new(Mutex::new(UNKNOWN)));
            Arc::clone(entry.value())
        };

        let mut nonce = slot.lock().await;
        let next = if *nonce == UNKNOWN {
            tracing::trace!(%address, "fetching pending nonce");
            fetch().await?
        } else {
            tracing::trace!(%address, current_nonce = *nonce, "incrementing nonce");
            *nonce + 1
        };
        *nonce = next;
        Ok(next)
    }

    /// Forget the cached nonce of `address`; the next allocation queries the node again.
    pub async fn reset_nonce(&self, address: Address) {
        let slot = self.nonces.get(&address).map(|entry| Arc::clone(entry.value()));
        if let Some(slot) = slot {
            *slot.lock().await = UNKNOWN;
            tracing::debug!(%address, "reset nonce cache, will requery on next use");
        }
    }
}
