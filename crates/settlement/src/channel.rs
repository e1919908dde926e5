//! Off-chain channel collaborators: where channels are, and how to hand a
//! transaction to one

use std::sync::Arc;
use std::time::Duration;

use agentpay_core::{ChannelEndpoint, Network, SettlementChannel};
use agentpay_store::Store;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Result, SettlementError};

/// Lookup of open channels between two participants
#[async_trait]
pub trait ChannelDirectory: Send + Sync {
    /// Open channel for the unordered pair `a`, `b` on `network`
    async fn open_channel(&self, network: Network, a: &str, b: &str) -> Result<Option<SettlementChannel>>;
}

/// Channel directory backed by the persistent store
pub struct StoreChannelDirectory<S: ?Sized> {
    store: Arc<S>,
}

impl<S: Store + ?Sized> StoreChannelDirectory<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: Store + ?Sized> ChannelDirectory for StoreChannelDirectory<S> {
    async fn open_channel(&self, network: Network, a: &str, b: &str) -> Result<Option<SettlementChannel>> {
        self.store
            .find_open_channel(network, a, b)
            .await
            .map_err(|e| SettlementError::Directory(e.to_string()))
    }
}

/// Answer of a channel node to an injected transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InjectionOutcome {
    pub accepted: bool,
    #[serde(default)]
    pub tx_hash: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl InjectionOutcome {
    pub fn accepted(tx_hash: impl Into<String>) -> Self {
        Self { accepted: true, tx_hash: Some(tx_hash.into()), reason: None }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self { accepted: false, tx_hash: None, reason: Some(reason.into()) }
    }
}

/// Channel transaction-injection primitive
#[async_trait]
pub trait ChannelInjector: Send + Sync {
    async fn inject(&self, endpoint: &ChannelEndpoint, signed_tx: &[u8]) -> Result<InjectionOutcome>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InjectRequest<'a> {
    cbor_hex: &'a str,
}

/// Injects transactions over a channel node's HTTP API
/// (`POST {http_url}/transaction` with `{"cborHex": ...}`)
pub struct HttpChannelInjector {
    client: reqwest::Client,
}

impl HttpChannelInjector {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SettlementError::ChannelUnavailable(e.to_string()))?;
        Ok(Self { client })
    }

    fn url(endpoint: &ChannelEndpoint) -> String {
        format!("{}/transaction", endpoint.http_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ChannelInjector for HttpChannelInjector {
    async fn inject(&self, endpoint: &ChannelEndpoint, signed_tx: &[u8]) -> Result<InjectionOutcome> {
        let url = Self::url(endpoint);
        let cbor_hex = hex::encode(signed_tx);
        debug!("Injecting {} bytes into channel at {}", signed_tx.len(), url);

        let response = self
            .client
            .post(&url)
            .json(&InjectRequest { cbor_hex: &cbor_hex })
            .send()
            .await
            .map_err(|e| SettlementError::ChannelUnavailable(format!("{}: {}", url, e)))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(SettlementError::ChannelUnavailable(format!("{} returned {}", url, status)));
        }
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Ok(InjectionOutcome::rejected(format!("{}: {}", status, body)));
        }

        response
            .json::<InjectionOutcome>()
            .await
            .map_err(|e| SettlementError::ChannelUnavailable(format!("invalid response from {}: {}", url, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentpay_core::ChannelStatus;
    use agentpay_store::MemoryStore;

    #[test]
    fn test_injection_url() {
        let endpoint = ChannelEndpoint {
            participant: "alice".into(),
            http_url: "http://127.0.0.1:4001/".into(),
        };
        assert_eq!(HttpChannelInjector::url(&endpoint), "http://127.0.0.1:4001/transaction");
    }

    #[test]
    fn test_outcome_wire_format() {
        let outcome: InjectionOutcome =
            serde_json::from_str(r#"{"accepted": false, "reason": "ValidationError"}"#).unwrap();
        assert_eq!(outcome, InjectionOutcome::rejected("ValidationError"));
        let outcome: InjectionOutcome =
            serde_json::from_str(r#"{"accepted": true, "txHash": "ab"}"#).unwrap();
        assert_eq!(outcome, InjectionOutcome::accepted("ab"));
    }

    #[tokio::test]
    async fn test_store_directory_returns_open_channels_only() {
        let store = Arc::new(MemoryStore::new());
        let mut channel = SettlementChannel::new(Network::Preprod, "alice", "bob");
        store.upsert_channel(channel.clone()).await.unwrap();

        let directory = StoreChannelDirectory::new(store.clone());
        assert!(directory.open_channel(Network::Preprod, "bob", "alice").await.unwrap().is_none());

        channel.status = ChannelStatus::Open;
        store.upsert_channel(channel).await.unwrap();
        assert!(directory.open_channel(Network::Preprod, "bob", "alice").await.unwrap().is_some());
    }
}
