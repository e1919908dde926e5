use async_trait::async_trait;

use crate::{
    AddressTransaction, BlockInfo, BlockRef, Order, Result, TransactionInfo, TransactionUtxos,
    TxRedeemer, Utxo,
};

/// Contract of a blockchain indexing API.
///
/// Every network or API failure is returned as a typed [`crate::ChainError`];
/// retrying is left to an outer policy ([`crate::RetryingProvider`]).
#[async_trait]
pub trait ChainProvider: Send + Sync {
    /// One page (1-based) of transactions touching `address`.
    /// An empty page means there are no more results.
    async fn list_address_transactions(
        &self,
        address: &str,
        page: u32,
        order: Order,
    ) -> Result<Vec<AddressTransaction>>;

    async fn get_transaction(&self, hash: &str) -> Result<TransactionInfo>;

    async fn get_transaction_utxos(&self, hash: &str) -> Result<TransactionUtxos>;

    async fn get_transaction_redeemers(&self, hash: &str) -> Result<Vec<TxRedeemer>>;

    /// Hex-encoded CBOR of the full transaction
    async fn get_transaction_cbor(&self, hash: &str) -> Result<String>;

    async fn get_block(&self, block: BlockRef) -> Result<BlockInfo>;

    /// Unspent outputs currently at `address`
    async fn get_address_utxos(&self, address: &str) -> Result<Vec<Utxo>>;

    /// Submit a signed transaction to the base chain, returning its hash
    async fn submit_transaction(&self, signed_tx: &[u8]) -> Result<String>;
}
