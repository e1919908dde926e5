//! Shared fixtures for the integration tests
//!
//! A [`Fixture`] is one payment source watching `addr_test_abc` with a
//! seller-side and a buyer-side record for the same escrow, a mock chain and
//! an engine wired to both.

#![allow(dead_code)]

use std::sync::Arc;

use agentpay_chain::{ChainTransaction, MockChainProvider, TxBuilder};
use agentpay_core::{AssetAmount, EscrowRecord, EscrowTiming, Network, PaymentSource, Side};
use agentpay_decoder::{DatumState, EscrowDatum, Redeemer};
use agentpay_store::{MemoryStore, RecordKey, Store};
use agentpay_sync::{SourceReport, SyncConfig, SyncEngine};

pub const ESCROW: &str = "addr_test_abc";
pub const BID: &str = "agent-job-0001";
pub const LOCK_AMOUNT: u64 = 5_000_000;

pub fn buyer() -> String {
    "b0".repeat(28)
}

pub fn seller() -> String {
    "5e".repeat(28)
}

pub fn input_hash() -> String {
    "1a".repeat(32)
}

pub fn result_hash() -> String {
    "deadbeef".repeat(8)
}

pub fn timing() -> EscrowTiming {
    EscrowTiming {
        pay_by_time: 1_700_000_000_000,
        submit_result_time: 1_700_000_600_000,
        unlock_time: 1_700_001_200_000,
        external_dispute_unlock_time: 1_700_001_800_000,
    }
}

pub fn datum(state: DatumState, result: Option<String>) -> EscrowDatum {
    EscrowDatum {
        buyer_vkey_hash: buyer(),
        seller_vkey_hash: seller(),
        blockchain_identifier: BID.to_string(),
        input_hash: input_hash(),
        result_hash: result,
        timing: timing(),
        seller_cooldown_time: 0,
        buyer_cooldown_time: 0,
        state,
    }
}

pub fn lovelace(amount: u64) -> Vec<AssetAmount> {
    vec![AssetAmount::native(amount)]
}

/// Initial lock of `amount` at the escrow address
pub fn lock_tx(hash: &str, height: u64, datum: &EscrowDatum, amount: Vec<AssetAmount>) -> ChainTransaction {
    TxBuilder::new(hash, height)
        .input("addr_test_buyer", format!("{}-funding", hash), 0, lovelace(LOCK_AMOUNT * 2), None)
        .output(ESCROW, amount, Some(datum.to_json().expect("datum encodes")))
        .output("addr_test_buyer", lovelace(LOCK_AMOUNT / 2), None)
        .build()
}

/// Escrow spend of output 0 of `spent`.
///
/// `output` is the continuing escrow output; without one the funds leave
/// to a wallet address.
pub fn spend_tx(
    hash: &str,
    height: u64,
    spent: &str,
    input_datum: &EscrowDatum,
    redeemer: Redeemer,
    output: Option<&EscrowDatum>,
) -> ChainTransaction {
    let builder = TxBuilder::new(hash, height)
        .input(ESCROW, spent, 0, lovelace(LOCK_AMOUNT), Some(input_datum.to_json().expect("datum encodes")))
        .collateral("addr_test_wallet", format!("{}-collateral", hash))
        .spend_redeemer(0, redeemer.to_json());
    match output {
        Some(d) => builder.output(ESCROW, lovelace(LOCK_AMOUNT), Some(d.to_json().expect("datum encodes"))),
        None => builder.output("addr_test_wallet", lovelace(LOCK_AMOUNT - 200_000), None),
    }
    .build()
}

pub struct Fixture {
    pub chain: MockChainProvider,
    pub store: Arc<MemoryStore>,
    pub engine: SyncEngine<MockChainProvider, MemoryStore>,
    pub source: PaymentSource,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::with_requested(lovelace(LOCK_AMOUNT)).await
    }

    /// Both records requesting `requested`
    pub async fn with_requested(requested: Vec<AssetAmount>) -> Self {
        let chain = MockChainProvider::new().with_page_size(4);
        let store = Arc::new(MemoryStore::new());
        let source = PaymentSource::new(Network::Preprod, ESCROW);
        store.insert_source(source.clone()).await.unwrap();

        let payment = EscrowRecord::new(
            source.id,
            Side::Payment,
            BID,
            seller(),
            input_hash(),
            requested.clone(),
            timing(),
        );
        let purchase = EscrowRecord::new(
            source.id,
            Side::Purchase,
            BID,
            seller(),
            input_hash(),
            requested,
            timing(),
        )
        .with_buyer(buyer());
        store.insert_record(payment).await.unwrap();
        store.insert_record(purchase).await.unwrap();

        let engine = SyncEngine::new(Arc::new(chain.clone()), store.clone(), SyncConfig::default());
        Self { chain, store, engine, source }
    }

    pub fn key(&self, side: Side) -> RecordKey {
        RecordKey::new(self.source.id, BID, side)
    }

    pub async fn record(&self, side: Side) -> EscrowRecord {
        self.store.get_record(&self.key(side)).await.unwrap().expect("record exists")
    }

    /// Run one pass and return this source's report
    pub async fn pass(&self) -> SourceReport {
        let report = self.engine.run_sync_pass().await.unwrap();
        report
            .source(self.source.id)
            .cloned()
            .unwrap_or_else(|| SourceReport::new(self.source.id))
    }
}
