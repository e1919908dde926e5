//! Layer resolution over the store-backed channel directory

use std::sync::{Arc, Mutex};

use agentpay_chain::MockChainProvider;
use agentpay_core::{ChannelEndpoint, ChannelStatus, Network, SettlementChannel};
use agentpay_settlement::{
    ChannelInjector, InjectionOutcome, Layer, OperationKind, RouterConfig, SettlementContext,
    SettlementError, SettlementRouter, StoreChannelDirectory,
};
use agentpay_store::{MemoryStore, Store};
use async_trait::async_trait;
use rand::seq::SliceRandom;

const PARTICIPANTS: [&str; 5] = ["agent-a", "agent-b", "agent-c", "agent-d", "agent-e"];

struct RecordingInjector {
    outcome: InjectionOutcome,
    injected: Mutex<Vec<String>>,
}

#[async_trait]
impl ChannelInjector for RecordingInjector {
    async fn inject(&self, endpoint: &ChannelEndpoint, _signed_tx: &[u8]) -> agentpay_settlement::Result<InjectionOutcome> {
        self.injected.lock().unwrap().push(endpoint.http_url.clone());
        Ok(self.outcome.clone())
    }
}

async fn open_channel(store: &MemoryStore, a: &str, b: &str) {
    let mut channel = SettlementChannel::new(Network::Preprod, a, b);
    channel.status = ChannelStatus::Open;
    channel.endpoints.push(ChannelEndpoint {
        participant: a.to_string(),
        http_url: format!("http://{}.channel.local", a),
    });
    store.upsert_channel(channel).await.unwrap();
}

async fn router(
    config: RouterConfig,
    outcome: InjectionOutcome,
) -> (SettlementRouter, Arc<MemoryStore>, MockChainProvider, Arc<RecordingInjector>) {
    let store = Arc::new(MemoryStore::new());
    open_channel(&store, "agent-b", "agent-a").await;
    open_channel(&store, "agent-c", "agent-e").await;

    // Closing channel: not usable
    let mut closing = SettlementChannel::new(Network::Preprod, "agent-a", "agent-d");
    closing.status = ChannelStatus::Closing;
    store.upsert_channel(closing).await.unwrap();

    let chain = MockChainProvider::new();
    let injector = Arc::new(RecordingInjector { outcome, injected: Mutex::new(Vec::new()) });
    let router = SettlementRouter::new(
        config,
        Arc::new(chain.clone()),
        injector.clone(),
        Arc::new(StoreChannelDirectory::new(store.clone())),
    );
    (router, store, chain, injector)
}

fn ctx(a: &str, b: &str) -> SettlementContext {
    SettlementContext::new(OperationKind::SubmitResult, a, b, Network::Preprod)
}

#[tokio::test]
async fn test_resolution_is_symmetric_for_every_pair() {
    let (router, _, _, _) = router(RouterConfig::live(true), InjectionOutcome::accepted("x")).await;
    let mut participants = PARTICIPANTS.to_vec();
    participants.shuffle(&mut rand::thread_rng());

    for a in &participants {
        for b in &participants {
            let ab = router.resolve_layer(&ctx(a, b)).await.unwrap();
            let ba = router.resolve_layer(&ctx(b, a)).await.unwrap();
            assert_eq!(ab, ba, "{} / {}", a, b);
        }
    }

    assert_eq!(router.resolve_layer(&ctx("agent-a", "agent-b")).await.unwrap(), Layer::Channel);
    assert_eq!(router.resolve_layer(&ctx("agent-e", "agent-c")).await.unwrap(), Layer::Channel);
    assert_eq!(router.resolve_layer(&ctx("agent-d", "agent-a")).await.unwrap(), Layer::Base);
    assert_eq!(router.resolve_layer(&ctx("agent-a", "agent-c")).await.unwrap(), Layer::Base);
}

#[tokio::test]
async fn test_network_scopes_channels() {
    let (router, _, _, _) = router(RouterConfig::live(true), InjectionOutcome::accepted("x")).await;
    let mainnet = SettlementContext::new(OperationKind::LockFunds, "agent-a", "agent-b", Network::Mainnet);
    assert_eq!(router.resolve_layer(&mainnet).await.unwrap(), Layer::Base);
}

#[tokio::test]
async fn test_override_and_global_switch() {
    let (disabled, _, _, _) = router(RouterConfig::live(false), InjectionOutcome::accepted("x")).await;
    assert_eq!(disabled.resolve_layer(&ctx("agent-a", "agent-b")).await.unwrap(), Layer::Base);
    assert_eq!(
        disabled
            .resolve_layer(&ctx("agent-a", "agent-c").with_force_layer(Layer::Channel))
            .await
            .unwrap(),
        Layer::Channel
    );

    let (enabled, _, _, _) = router(RouterConfig::live(true), InjectionOutcome::accepted("x")).await;
    assert_eq!(
        enabled
            .resolve_layer(&ctx("agent-b", "agent-a").with_force_layer(Layer::Base))
            .await
            .unwrap(),
        Layer::Base
    );
}

#[tokio::test]
async fn test_submissions_are_layer_tagged() {
    let (router, _, chain, injector) = router(RouterConfig::live(true), InjectionOutcome::accepted("ch-1")).await;

    let on_channel = router.submit(b"tx-1", &ctx("agent-b", "agent-a")).await.unwrap();
    assert_eq!(on_channel.layer, Layer::Channel);
    assert_eq!(on_channel.tx_hash, "ch-1");
    assert_eq!(*injector.injected.lock().unwrap(), vec!["http://agent-b.channel.local".to_string()]);

    let on_base = router.submit(b"tx-2", &ctx("agent-a", "agent-d")).await.unwrap();
    assert_eq!(on_base.layer, Layer::Base);
    assert_eq!(chain.submitted(), vec![on_base.tx_hash]);
}

#[tokio::test]
async fn test_channel_rejection_never_falls_back() {
    let (router, _, chain, _) = router(RouterConfig::live(true), InjectionOutcome::rejected("insufficient funds in channel")).await;
    let err = router.submit(b"tx-1", &ctx("agent-a", "agent-b")).await.unwrap_err();
    match err {
        SettlementError::ChannelRejected { reason } => assert_eq!(reason, "insufficient funds in channel"),
        other => panic!("unexpected error: {}", other),
    }
    assert!(chain.submitted().is_empty());
}

#[tokio::test]
async fn test_channel_utxo_fetch_is_incomplete() {
    let (router, _, _, _) = router(RouterConfig::live(true), InjectionOutcome::accepted("x")).await;
    let fetched = router.fetch_utxos("addr_test_abc", &ctx("agent-a", "agent-b")).await.unwrap();
    assert_eq!(fetched.layer, Layer::Channel);
    assert!(fetched.utxos.is_empty());
    assert!(!fetched.complete);

    let fetched = router.fetch_utxos("addr_test_abc", &ctx("agent-a", "agent-c")).await.unwrap();
    assert_eq!(fetched.layer, Layer::Base);
    assert!(fetched.complete);
}
