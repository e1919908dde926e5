//! In-memory chain for development and tests
//!
//! Holds a list of fully-specified transactions ordered by block position.
//! Supports rollback simulation (`remove_transaction`), tip control for
//! confirmation counts, and injected transient failures.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use agentpay_core::AssetAmount;

use crate::{
    AddressTransaction, BlockInfo, BlockRef, ChainError, ChainProvider, ChainTransaction, Order,
    RedeemerPurpose, Result, TransactionInfo, TransactionUtxos, TxRedeemer, Utxo, UtxoInput,
    UtxoOutput,
};

const DEFAULT_PAGE_SIZE: usize = 100;

fn block_hash(height: u64) -> String {
    format!("block-{:010}", height)
}

#[derive(Debug, Default)]
struct MockChain {
    /// Sorted by (block_height, tx_index)
    transactions: Vec<ChainTransaction>,
    tip_height: u64,
    /// Number of upcoming calls that fail with a network error
    fail_next: u32,
    submitted: Vec<String>,
}

impl MockChain {
    fn find(&self, hash: &str) -> Result<&ChainTransaction> {
        self.transactions
            .iter()
            .find(|t| t.info.hash == hash)
            .ok_or_else(|| ChainError::NotFound(format!("transaction {}", hash)))
    }

    fn confirmations(&self, height: u64) -> u64 {
        if self.tip_height >= height {
            self.tip_height - height + 1
        } else {
            0
        }
    }
}

/// In-memory [`ChainProvider`]
///
/// Cloning shares the underlying chain, so a test can keep a handle while
/// the engine owns another.
#[derive(Debug, Clone)]
pub struct MockChainProvider {
    state: Arc<RwLock<MockChain>>,
    page_size: usize,
}

impl Default for MockChainProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChainProvider {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(MockChain::default())),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Add a transaction. The tip advances to cover its block.
    pub fn push_transaction(&self, tx: ChainTransaction) {
        let mut state = self.state.write().expect("mock chain lock poisoned");
        state.tip_height = state.tip_height.max(tx.info.block_height);
        state.transactions.push(tx);
        state
            .transactions
            .sort_by_key(|t| (t.info.block_height, t.info.tx_index));
    }

    /// Drop a transaction, as a chain rollback would
    pub fn remove_transaction(&self, hash: &str) -> bool {
        let mut state = self.state.write().expect("mock chain lock poisoned");
        let before = state.transactions.len();
        state.transactions.retain(|t| t.info.hash != hash);
        let removed = state.transactions.len() != before;
        if removed {
            info!("[MOCK] Rolled back transaction {}", hash);
        }
        removed
    }

    pub fn set_tip(&self, height: u64) {
        self.state.write().expect("mock chain lock poisoned").tip_height = height;
    }

    pub fn tip(&self) -> u64 {
        self.state.read().expect("mock chain lock poisoned").tip_height
    }

    /// Make the next `n` calls fail with a transient network error
    pub fn fail_next_calls(&self, n: u32) {
        self.state.write().expect("mock chain lock poisoned").fail_next = n;
    }

    /// Hashes of transactions submitted through this provider
    pub fn submitted(&self) -> Vec<String> {
        self.state.read().expect("mock chain lock poisoned").submitted.clone()
    }

    fn check_failure(&self) -> Result<()> {
        let mut state = self.state.write().expect("mock chain lock poisoned");
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(ChainError::Network("injected failure".to_string()));
        }
        Ok(())
    }
}

fn touches(tx: &ChainTransaction, address: &str) -> bool {
    tx.utxos.inputs.iter().any(|i| i.address == address)
        || tx.utxos.outputs.iter().any(|o| o.address == address)
}

#[async_trait]
impl ChainProvider for MockChainProvider {
    async fn list_address_transactions(
        &self,
        address: &str,
        page: u32,
        order: Order,
    ) -> Result<Vec<AddressTransaction>> {
        self.check_failure()?;
        let state = self.state.read().expect("mock chain lock poisoned");
        let mut matching: Vec<AddressTransaction> = state
            .transactions
            .iter()
            .filter(|t| touches(t, address))
            .map(|t| AddressTransaction {
                tx_hash: t.info.hash.clone(),
                tx_index: t.info.tx_index,
                block_height: t.info.block_height,
                block_time: t.info.block_time,
            })
            .collect();
        if order == Order::Desc {
            matching.reverse();
        }
        let start = (page.max(1) as usize - 1) * self.page_size;
        debug!("[MOCK] listing {} page {} ({} total)", address, page, matching.len());
        Ok(matching.into_iter().skip(start).take(self.page_size).collect())
    }

    async fn get_transaction(&self, hash: &str) -> Result<TransactionInfo> {
        self.check_failure()?;
        let state = self.state.read().expect("mock chain lock poisoned");
        Ok(state.find(hash)?.info.clone())
    }

    async fn get_transaction_utxos(&self, hash: &str) -> Result<TransactionUtxos> {
        self.check_failure()?;
        let state = self.state.read().expect("mock chain lock poisoned");
        Ok(state.find(hash)?.utxos.clone())
    }

    async fn get_transaction_redeemers(&self, hash: &str) -> Result<Vec<TxRedeemer>> {
        self.check_failure()?;
        let state = self.state.read().expect("mock chain lock poisoned");
        Ok(state.find(hash)?.redeemers.clone())
    }

    async fn get_transaction_cbor(&self, hash: &str) -> Result<String> {
        self.check_failure()?;
        let state = self.state.read().expect("mock chain lock poisoned");
        let tx = state.find(hash)?;
        let json = serde_json::to_vec(&tx.utxos).map_err(|e| ChainError::Decode(e.to_string()))?;
        Ok(hex::encode(json))
    }

    async fn get_block(&self, block: BlockRef) -> Result<BlockInfo> {
        self.check_failure()?;
        let state = self.state.read().expect("mock chain lock poisoned");
        let height = match &block {
            BlockRef::Latest => state.tip_height,
            BlockRef::Height(h) if *h <= state.tip_height => *h,
            BlockRef::Hash(h) => state
                .transactions
                .iter()
                .find(|t| &t.info.block == h)
                .map(|t| t.info.block_height)
                .ok_or_else(|| ChainError::NotFound(format!("block {}", h)))?,
            BlockRef::Height(h) => return Err(ChainError::NotFound(format!("block {}", h))),
        };
        Ok(BlockInfo {
            hash: block_hash(height),
            height,
            time: height * 20,
            confirmations: state.confirmations(height),
        })
    }

    async fn get_address_utxos(&self, address: &str) -> Result<Vec<Utxo>> {
        self.check_failure()?;
        let state = self.state.read().expect("mock chain lock poisoned");
        let spent: HashSet<(String, u32)> = state
            .transactions
            .iter()
            .flat_map(|t| t.utxos.inputs.iter())
            .filter(|i| i.is_spent())
            .map(|i| (i.tx_hash.clone(), i.output_index))
            .collect();
        Ok(state
            .transactions
            .iter()
            .flat_map(|t| t.utxos.outputs.iter().map(move |o| (t.info.hash.clone(), o)))
            .filter(|(hash, o)| o.address == address && !spent.contains(&(hash.clone(), o.output_index)))
            .map(|(hash, o)| Utxo {
                tx_hash: hash,
                output_index: o.output_index,
                address: o.address.clone(),
                amount: o.amount.clone(),
                inline_datum: o.inline_datum.clone(),
            })
            .collect())
    }

    async fn submit_transaction(&self, signed_tx: &[u8]) -> Result<String> {
        self.check_failure()?;
        let hash = hex::encode(Sha256::digest(signed_tx));
        let mut state = self.state.write().expect("mock chain lock poisoned");
        state.submitted.push(hash.clone());
        info!("[MOCK] Submitted transaction {}", hash);
        Ok(hash)
    }
}

/// Builder for [`ChainTransaction`] fixtures
#[derive(Debug, Clone)]
pub struct TxBuilder {
    tx: ChainTransaction,
}

impl TxBuilder {
    pub fn new(hash: impl Into<String>, block_height: u64) -> Self {
        let hash = hash.into();
        Self {
            tx: ChainTransaction {
                info: TransactionInfo {
                    hash: hash.clone(),
                    block: block_hash(block_height),
                    block_height,
                    block_time: block_height * 20,
                    tx_index: 0,
                    fees: 180_000,
                    valid_contract: true,
                },
                utxos: TransactionUtxos { hash, inputs: Vec::new(), outputs: Vec::new() },
                redeemers: Vec::new(),
                confirmations: 1,
            },
        }
    }

    pub fn tx_index(mut self, index: u32) -> Self {
        self.tx.info.tx_index = index;
        self
    }

    pub fn fees(mut self, fees: u64) -> Self {
        self.tx.info.fees = fees;
        self
    }

    pub fn confirmations(mut self, confirmations: u64) -> Self {
        self.tx.confirmations = confirmations;
        self
    }

    /// Spend output `output_index` of `tx_hash` held at `address`
    pub fn input(
        mut self,
        address: impl Into<String>,
        tx_hash: impl Into<String>,
        output_index: u32,
        amount: Vec<AssetAmount>,
        inline_datum: Option<serde_json::Value>,
    ) -> Self {
        self.tx.utxos.inputs.push(UtxoInput {
            address: address.into(),
            amount,
            tx_hash: tx_hash.into(),
            output_index,
            inline_datum,
            reference_script_hash: None,
            collateral: false,
            reference: false,
        });
        self
    }

    pub fn collateral(mut self, address: impl Into<String>, tx_hash: impl Into<String>) -> Self {
        self.tx.utxos.inputs.push(UtxoInput {
            address: address.into(),
            amount: vec![AssetAmount::native(5_000_000)],
            tx_hash: tx_hash.into(),
            output_index: 0,
            inline_datum: None,
            reference_script_hash: None,
            collateral: true,
            reference: false,
        });
        self
    }

    pub fn output(
        mut self,
        address: impl Into<String>,
        amount: Vec<AssetAmount>,
        inline_datum: Option<serde_json::Value>,
    ) -> Self {
        let output_index = self.tx.utxos.outputs.len() as u32;
        self.tx.utxos.outputs.push(UtxoOutput {
            address: address.into(),
            amount,
            output_index,
            inline_datum,
            reference_script_hash: None,
            collateral: false,
        });
        self
    }

    /// Attach a reference script to the most recently added output
    pub fn with_reference_script(mut self, script_hash: impl Into<String>) -> Self {
        if let Some(out) = self.tx.utxos.outputs.last_mut() {
            out.reference_script_hash = Some(script_hash.into());
        }
        self
    }

    pub fn spend_redeemer(mut self, tx_index: u32, data: serde_json::Value) -> Self {
        self.tx.redeemers.push(TxRedeemer { tx_index, purpose: RedeemerPurpose::Spend, data });
        self
    }

    pub fn redeemer(mut self, tx_index: u32, purpose: RedeemerPurpose, data: serde_json::Value) -> Self {
        self.tx.redeemers.push(TxRedeemer { tx_index, purpose, data });
        self
    }

    pub fn build(self) -> ChainTransaction {
        self.tx
    }
}
