//! Retry policy applied at the provider-call boundary
//!
//! Transient failures (network, rate limiting, 5xx) are retried with
//! bounded exponential backoff. Everything else is returned immediately.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::{
    AddressTransaction, BlockInfo, BlockRef, ChainProvider, Order, Result, TransactionInfo,
    TransactionUtxos, TxRedeemer, Utxo,
};

/// Bounded exponential backoff
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Backoff before retry number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff.saturating_mul(factor).min(self.max_backoff)
    }

    /// Run `call` until it succeeds, fails permanently, or attempts run out
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = self.backoff(attempt);
                    debug!(
                        "{} failed (attempt {}/{}): {} - retrying in {:?}",
                        operation, attempt, max_attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_transient() {
                        warn!("{} failed after {} attempts: {}", operation, attempt, e);
                    }
                    return Err(e);
                }
            }
        }
    }
}

/// A provider whose every call goes through one [`RetryPolicy`]
pub struct RetryingProvider<P> {
    inner: P,
    policy: RetryPolicy,
}

impl<P: ChainProvider> RetryingProvider<P> {
    pub fn new(inner: P, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl<P: ChainProvider> ChainProvider for RetryingProvider<P> {
    async fn list_address_transactions(
        &self,
        address: &str,
        page: u32,
        order: Order,
    ) -> Result<Vec<AddressTransaction>> {
        self.policy
            .run("list_address_transactions", || {
                self.inner.list_address_transactions(address, page, order)
            })
            .await
    }

    async fn get_transaction(&self, hash: &str) -> Result<TransactionInfo> {
        self.policy.run("get_transaction", || self.inner.get_transaction(hash)).await
    }

    async fn get_transaction_utxos(&self, hash: &str) -> Result<TransactionUtxos> {
        self.policy
            .run("get_transaction_utxos", || self.inner.get_transaction_utxos(hash))
            .await
    }

    async fn get_transaction_redeemers(&self, hash: &str) -> Result<Vec<TxRedeemer>> {
        self.policy
            .run("get_transaction_redeemers", || self.inner.get_transaction_redeemers(hash))
            .await
    }

    async fn get_transaction_cbor(&self, hash: &str) -> Result<String> {
        self.policy
            .run("get_transaction_cbor", || self.inner.get_transaction_cbor(hash))
            .await
    }

    async fn get_block(&self, block: BlockRef) -> Result<BlockInfo> {
        self.policy
            .run("get_block", || self.inner.get_block(block.clone()))
            .await
    }

    async fn get_address_utxos(&self, address: &str) -> Result<Vec<Utxo>> {
        self.policy
            .run("get_address_utxos", || self.inner.get_address_utxos(address))
            .await
    }

    async fn submit_transaction(&self, signed_tx: &[u8]) -> Result<String> {
        self.policy
            .run("submit_transaction", || self.inner.submit_transaction(signed_tx))
            .await
    }
}
