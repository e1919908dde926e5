use agentpay_chain::{ChainProvider, Utxo};
use async_trait::async_trait;

use crate::{Result, SettlementError};

/// Base-chain submission and UTXO query primitives
#[async_trait]
pub trait BaseLedger: Send + Sync {
    /// Submit a signed transaction, returning its hash
    async fn submit(&self, signed_tx: &[u8]) -> Result<String>;

    async fn utxos(&self, address: &str) -> Result<Vec<Utxo>>;
}

#[async_trait]
impl<P: ChainProvider + ?Sized> BaseLedger for P {
    async fn submit(&self, signed_tx: &[u8]) -> Result<String> {
        self.submit_transaction(signed_tx)
            .await
            .map_err(|e| SettlementError::Submission(e.to_string()))
    }

    async fn utxos(&self, address: &str) -> Result<Vec<Utxo>> {
        self.get_address_utxos(address)
            .await
            .map_err(|e| SettlementError::Submission(e.to_string()))
    }
}
