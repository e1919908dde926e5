//! Indexer REST client
//!
//! Speaks a Blockfrost-compatible API: project id header, string
//! quantities, datum JSON resolved through `/scripts/datum/{hash}`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use agentpay_core::AssetAmount;

use crate::{
    AddressTransaction, BlockInfo, BlockRef, ChainError, ChainProvider, Order, RedeemerPurpose,
    Result, TransactionInfo, TransactionUtxos, TxRedeemer, Utxo, UtxoInput, UtxoOutput,
};

/// Results per page requested from the indexer
const PAGE_COUNT: u32 = 100;

/// HTTP provider configuration
#[derive(Debug, Clone)]
pub struct HttpProviderConfig {
    /// API base URL, e.g. `https://cardano-preprod.blockfrost.io/api/v0`
    pub base_url: String,
    /// Project id sent in the `project_id` header
    pub project_id: String,
    pub timeout: Duration,
}

impl Default for HttpProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://cardano-preprod.blockfrost.io/api/v0".to_string(),
            project_id: String::new(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// [`ChainProvider`] over the indexer's REST API
pub struct HttpChainProvider {
    config: HttpProviderConfig,
    client: reqwest::Client,
}

// === Wire types (private) ===

#[derive(Deserialize)]
struct WireAmount {
    unit: String,
    quantity: String,
}

#[derive(Deserialize)]
struct WireTransaction {
    hash: String,
    block: String,
    block_height: u64,
    block_time: u64,
    index: u32,
    fees: String,
    #[serde(default = "default_true")]
    valid_contract: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
struct WireInput {
    address: String,
    amount: Vec<WireAmount>,
    tx_hash: String,
    output_index: u32,
    #[serde(default)]
    data_hash: Option<String>,
    #[serde(default)]
    inline_datum: Option<String>,
    #[serde(default)]
    reference_script_hash: Option<String>,
    #[serde(default)]
    collateral: bool,
    #[serde(default)]
    reference: bool,
}

#[derive(Deserialize)]
struct WireOutput {
    address: String,
    amount: Vec<WireAmount>,
    output_index: u32,
    #[serde(default)]
    data_hash: Option<String>,
    #[serde(default)]
    inline_datum: Option<String>,
    #[serde(default)]
    reference_script_hash: Option<String>,
    #[serde(default)]
    collateral: bool,
}

#[derive(Deserialize)]
struct WireUtxos {
    hash: String,
    inputs: Vec<WireInput>,
    outputs: Vec<WireOutput>,
}

#[derive(Deserialize)]
struct WireRedeemer {
    tx_index: u32,
    purpose: RedeemerPurpose,
    redeemer_data_hash: String,
}

#[derive(Deserialize)]
struct WireDatum {
    json_value: serde_json::Value,
}

#[derive(Deserialize)]
struct WireCbor {
    cbor: String,
}

#[derive(Deserialize)]
struct WireBlock {
    hash: String,
    height: Option<u64>,
    time: u64,
    confirmations: u64,
}

#[derive(Deserialize)]
struct WireAddressUtxo {
    tx_hash: String,
    output_index: u32,
    address: String,
    amount: Vec<WireAmount>,
    #[serde(default)]
    data_hash: Option<String>,
    #[serde(default)]
    inline_datum: Option<String>,
}

fn parse_amounts(amounts: Vec<WireAmount>) -> Result<Vec<AssetAmount>> {
    amounts
        .into_iter()
        .map(|a| {
            let amount = a.quantity.parse::<u64>().map_err(|_| {
                ChainError::Decode(format!("invalid quantity {} for {}", a.quantity, a.unit))
            })?;
            Ok(AssetAmount::new(a.unit, amount))
        })
        .collect()
}

impl HttpChainProvider {
    pub fn new(config: HttpProviderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ChainError::Network(format!("client init: {}", e)))?;
        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        debug!("GET {}", url);
        let response = self
            .client
            .get(&url)
            .header("project_id", &self.config.project_id)
            .send()
            .await
            .map_err(|e| ChainError::Network(format!("{}: {}", path, e)))?;
        Self::decode(path, response).await
    }

    async fn decode<T: DeserializeOwned>(path: &str, response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ChainError::NotFound(path.to_string()));
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ChainError::RateLimited);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ChainError::Api { status: status.as_u16(), message });
        }
        response
            .json::<T>()
            .await
            .map_err(|e| ChainError::Decode(format!("{}: {}", path, e)))
    }

    /// Resolve a datum hash to its detailed JSON representation
    async fn datum_json(&self, data_hash: &str) -> Result<serde_json::Value> {
        let datum: WireDatum = self.get_json(&format!("scripts/datum/{}", data_hash)).await?;
        Ok(datum.json_value)
    }

    /// Inline datums are resolved to JSON; datum-hash-only outputs stay `None`
    async fn inline_datum(
        &self,
        inline: &Option<String>,
        data_hash: &Option<String>,
    ) -> Result<Option<serde_json::Value>> {
        match (inline, data_hash) {
            (Some(_), Some(hash)) => Ok(Some(self.datum_json(hash).await?)),
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl ChainProvider for HttpChainProvider {
    async fn list_address_transactions(
        &self,
        address: &str,
        page: u32,
        order: Order,
    ) -> Result<Vec<AddressTransaction>> {
        let path = format!(
            "addresses/{}/transactions?page={}&count={}&order={}",
            address, page, PAGE_COUNT, order
        );
        match self.get_json::<Vec<AddressTransaction>>(&path).await {
            // Unused addresses are reported as missing
            Err(ChainError::NotFound(_)) => Ok(Vec::new()),
            other => other,
        }
    }

    async fn get_transaction(&self, hash: &str) -> Result<TransactionInfo> {
        let tx: WireTransaction = self.get_json(&format!("txs/{}", hash)).await?;
        let fees = tx
            .fees
            .parse::<u64>()
            .map_err(|_| ChainError::Decode(format!("invalid fees {}", tx.fees)))?;
        Ok(TransactionInfo {
            hash: tx.hash,
            block: tx.block,
            block_height: tx.block_height,
            block_time: tx.block_time,
            tx_index: tx.index,
            fees,
            valid_contract: tx.valid_contract,
        })
    }

    async fn get_transaction_utxos(&self, hash: &str) -> Result<TransactionUtxos> {
        let wire: WireUtxos = self.get_json(&format!("txs/{}/utxos", hash)).await?;

        let mut inputs = Vec::with_capacity(wire.inputs.len());
        for i in wire.inputs {
            let inline_datum = self.inline_datum(&i.inline_datum, &i.data_hash).await?;
            inputs.push(UtxoInput {
                address: i.address,
                amount: parse_amounts(i.amount)?,
                tx_hash: i.tx_hash,
                output_index: i.output_index,
                inline_datum,
                reference_script_hash: i.reference_script_hash,
                collateral: i.collateral,
                reference: i.reference,
            });
        }

        let mut outputs = Vec::with_capacity(wire.outputs.len());
        for o in wire.outputs {
            let inline_datum = self.inline_datum(&o.inline_datum, &o.data_hash).await?;
            outputs.push(UtxoOutput {
                address: o.address,
                amount: parse_amounts(o.amount)?,
                output_index: o.output_index,
                inline_datum,
                reference_script_hash: o.reference_script_hash,
                collateral: o.collateral,
            });
        }

        Ok(TransactionUtxos { hash: wire.hash, inputs, outputs })
    }

    async fn get_transaction_redeemers(&self, hash: &str) -> Result<Vec<TxRedeemer>> {
        let wire: Vec<WireRedeemer> = self.get_json(&format!("txs/{}/redeemers", hash)).await?;
        let mut redeemers = Vec::with_capacity(wire.len());
        for r in wire {
            let data = self.datum_json(&r.redeemer_data_hash).await?;
            redeemers.push(TxRedeemer { tx_index: r.tx_index, purpose: r.purpose, data });
        }
        Ok(redeemers)
    }

    async fn get_transaction_cbor(&self, hash: &str) -> Result<String> {
        let wire: WireCbor = self.get_json(&format!("txs/{}/cbor", hash)).await?;
        Ok(wire.cbor)
    }

    async fn get_block(&self, block: BlockRef) -> Result<BlockInfo> {
        let wire: WireBlock = self.get_json(&format!("blocks/{}", block)).await?;
        Ok(BlockInfo {
            hash: wire.hash,
            height: wire.height.unwrap_or(0),
            time: wire.time,
            confirmations: wire.confirmations,
        })
    }

    async fn get_address_utxos(&self, address: &str) -> Result<Vec<Utxo>> {
        let mut utxos = Vec::new();
        let mut page = 1;
        loop {
            let path = format!("addresses/{}/utxos?page={}&count={}", address, page, PAGE_COUNT);
            let batch: Vec<WireAddressUtxo> = match self.get_json(&path).await {
                Err(ChainError::NotFound(_)) => Vec::new(),
                other => other?,
            };
            if batch.is_empty() {
                break;
            }
            let full_page = batch.len() as u32 >= PAGE_COUNT;
            for u in batch {
                let inline_datum = self.inline_datum(&u.inline_datum, &u.data_hash).await?;
                utxos.push(Utxo {
                    tx_hash: u.tx_hash,
                    output_index: u.output_index,
                    address: u.address,
                    amount: parse_amounts(u.amount)?,
                    inline_datum,
                });
            }
            if !full_page {
                break;
            }
            page += 1;
        }
        Ok(utxos)
    }

    async fn submit_transaction(&self, signed_tx: &[u8]) -> Result<String> {
        let path = "tx/submit";
        let response = self
            .client
            .post(self.url(path))
            .header("project_id", &self.config.project_id)
            .header("Content-Type", "application/cbor")
            .body(signed_tx.to_vec())
            .send()
            .await
            .map_err(|e| ChainError::Network(format!("{}: {}", path, e)))?;
        Self::decode::<String>(path, response).await
    }
}
