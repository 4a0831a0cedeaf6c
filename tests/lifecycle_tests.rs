//! Lifecycle tests: setup, sync, the keep-alive loop and the interaction gate
//!
//! Everything runs against the in-memory node and chain backend from
//! `common`, so no network is needed. Loops run on paused tokio time.

mod common;

use common::*;
use lightkeeper::node::{KeepSynced, RunPhase};
use lightkeeper::storage::{keys, SecureStorage};
use lightkeeper::types::{ChannelState, LightningPeer, Network};
use lightkeeper::{Error, NodeState, StateStore};
use std::sync::atomic::Ordering;
use std::time::Duration;

#[tokio::test]
async fn setup_starts_the_node_once() {
    let h = harness();
    let lc = h.lifecycle.clone();

    let (a, b, c) = tokio::join!(lc.setup(), lc.setup(), lc.setup());
    assert_eq!(a.unwrap(), NODE_ID);
    assert_eq!(b.unwrap(), NODE_ID);
    assert_eq!(c.unwrap(), NODE_ID);

    assert_eq!(h.node.start_calls.load(Ordering::SeqCst), 1);
    assert_eq!(lc.state(), NodeState::Running(RunPhase::Idle));
    assert_eq!(lc.node_id().as_deref(), Some(NODE_ID));

    // Already running: no second start
    assert_eq!(lc.setup().await.unwrap(), NODE_ID);
    assert_eq!(h.node.start_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn setup_persists_the_lightning_account() {
    let h = harness();
    h.lifecycle.setup().await.unwrap();

    let stored = h.keychain.retrieve(&keys::lightning_account(Network::Regtest)).expect("account stored");
    assert!(stored.contains("wallet0"));

    // Restarting reuses the stored account
    h.lifecycle.restart().await.unwrap();
    assert_eq!(h.keychain.retrieve(&keys::lightning_account(Network::Regtest)).unwrap(), stored);
}

#[tokio::test]
async fn initial_sync_records_tip_and_channels() {
    let h = harness();
    h.node.set_channels(vec![ready_channel("chan-1", 40_000, 60_000)]);
    h.node.balance_sat.store(1_234, Ordering::SeqCst);

    h.lifecycle.setup().await.unwrap();

    assert_eq!(h.node.sync_calls.load(Ordering::SeqCst), 1);
    assert_eq!(*h.node.synced_heights.lock().unwrap(), vec![100]);
    assert_eq!(h.store.header().unwrap().height, 100);
    assert_eq!(h.store.channels().len(), 1);
    assert_eq!(h.store.claimable_balance_sat(), 1_234);
}

#[tokio::test]
async fn failed_setup_requires_reset() {
    let h = harness();
    h.node.fail_start.store(true, Ordering::SeqCst);

    let err = h.lifecycle.setup().await.unwrap_err();
    assert!(matches!(err, Error::Setup(ref msg) if msg.contains("channel monitor corrupted")));
    assert!(matches!(h.lifecycle.state(), NodeState::Error(_)));

    h.node.fail_start.store(false, Ordering::SeqCst);
    assert!(matches!(h.lifecycle.setup().await, Err(Error::InvalidState(_))));
    assert!(matches!(h.lifecycle.restart().await, Err(Error::InvalidState(_))));

    h.lifecycle.reset().await;
    assert_eq!(h.lifecycle.state(), NodeState::NotStarted);
    assert_eq!(h.lifecycle.setup().await.unwrap(), NODE_ID);
}

#[tokio::test]
async fn setup_fails_when_chain_stays_unreachable() {
    let h = harness();
    h.backend.fail_connects(2);

    let err = h.lifecycle.setup().await.unwrap_err();
    assert!(matches!(err, Error::Setup(ref msg) if msg.contains("retry failed")));
    assert_eq!(h.backend.connect_calls.load(Ordering::SeqCst), 2);
    assert_eq!(h.node.start_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn setup_survives_one_connect_failure() {
    let h = harness();
    h.backend.fail_connects(1);

    assert_eq!(h.lifecycle.setup().await.unwrap(), NODE_ID);
    assert_eq!(h.backend.connect_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn setup_reconnects_saved_peers() {
    let h = harness();
    let peer = LightningPeer::new(PEER_PUBKEY, "203.0.113.7", 9735);
    h.store.add_custom_peer(Network::Regtest, peer.clone());
    h.store.add_custom_peer(Network::Testnet, LightningPeer::new(PEER_PUBKEY, "198.51.100.1", 9735));

    h.lifecycle.setup().await.unwrap();

    assert_eq!(*h.node.added_peers.lock().unwrap(), vec![peer]);
}

#[tokio::test(start_paused = true)]
async fn slow_peer_does_not_block_setup() {
    let h = harness();
    *h.node.add_peer_delay.lock().unwrap() = Duration::from_secs(30);
    h.store.add_custom_peer(Network::Regtest, LightningPeer::new(PEER_PUBKEY, "203.0.113.7", 9735));

    assert_eq!(h.lifecycle.setup().await.unwrap(), NODE_ID);
    assert!(h.node.added_peers.lock().unwrap().is_empty());

    let err = h.lifecycle.add_peer(&LightningPeer::new(PEER_PUBKEY, "203.0.113.8", 9735)).await.unwrap_err();
    assert!(matches!(err, Error::Timeout(_)));
}

#[tokio::test]
async fn sync_restarts_a_dead_node() {
    let h = harness();
    h.lifecycle.setup().await.unwrap();
    h.node.crash();

    let summary = h.lifecycle.sync().await.unwrap();
    assert_eq!(summary.node_id, NODE_ID);
    assert_eq!(summary.height, 100);
    assert_eq!(h.node.start_calls.load(Ordering::SeqCst), 2);
    assert!(h.lifecycle.state().is_running());
}

#[tokio::test]
async fn sync_from_not_started_sets_up_first() {
    let h = harness();
    let summary = h.lifecycle.sync().await.unwrap();
    assert_eq!(summary.node_id, NODE_ID);
    assert_eq!(h.node.start_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn sync_catches_up_to_the_backend_tip() {
    let h = harness();
    h.lifecycle.setup().await.unwrap();

    // Blocks arrive while nothing polls the watcher
    h.backend.mine(104);
    h.backend.mine(105);
    let summary = h.lifecycle.sync().await.unwrap();
    assert_eq!(summary.height, 105);
    assert_eq!(h.node.synced_heights.lock().unwrap().last(), Some(&105));
    assert_eq!(h.store.header().unwrap().height, 105);

    // Queued notifications still come through without moving the tip back
    let outcome = h.chain.poll().await.unwrap();
    assert_eq!(outcome.headers.len(), 2);
    assert_eq!(h.chain.current_header().unwrap().height, 105);
}

#[tokio::test]
async fn sync_reconnects_a_dropped_chain_connection() {
    let h = harness();
    h.lifecycle.setup().await.unwrap();
    h.node.chain().get_address().await.unwrap();
    let subscribed = h.backend.subscribed_scripts.lock().unwrap().len();
    assert_eq!(h.backend.connect_calls.load(Ordering::SeqCst), 1);

    h.backend.drop_connection();
    assert!(!h.chain.is_connected().await);
    h.backend.mine(103);

    let summary = h.lifecycle.sync().await.unwrap();
    assert_eq!(summary.height, 103);
    assert_eq!(h.backend.connect_calls.load(Ordering::SeqCst), 2);
    assert!(h.chain.is_connected().await);
    // Every watched script is subscribed again on the new connection
    assert_eq!(h.backend.subscribed_scripts.lock().unwrap().len(), subscribed + h.chain.watched_count());
}

#[tokio::test]
async fn sync_fails_when_the_chain_stays_unreachable() {
    let h = harness();
    h.lifecycle.setup().await.unwrap();
    h.backend.drop_connection();
    h.backend.fail_connects(2);

    let err = h.lifecycle.sync().await.unwrap_err();
    assert!(matches!(err, Error::Connectivity(ref msg) if msg.starts_with("retry failed")));
    assert_eq!(h.lifecycle.state(), NodeState::Running(RunPhase::Idle));
}

#[tokio::test]
async fn channel_refresh_never_moves_backwards() {
    let h = harness();
    h.node.set_channels(vec![ready_channel("chan-1", 10_000, 0)]);
    h.lifecycle.setup().await.unwrap();

    let mut regressed = ready_channel("chan-1", 9_000, 1_000);
    regressed.state = ChannelState::Pending;
    h.node.set_channels(vec![regressed]);
    h.lifecycle.sync().await.unwrap();

    let stored = h.store.channel("chan-1").unwrap();
    assert_eq!(stored.state, ChannelState::Ready);
    assert_eq!(stored.balance_sat, 9_000);

    let mut closed = ready_channel("chan-1", 0, 0);
    closed.state = ChannelState::Closed;
    h.node.set_channels(vec![closed]);
    h.lifecycle.sync().await.unwrap();
    assert!(h.store.channels().is_empty());
}

#[tokio::test(start_paused = true)]
async fn interaction_gate_holds_sync_back() {
    let h = harness();
    h.lifecycle.setup().await.unwrap();
    let before = h.node.sync_calls.load(Ordering::SeqCst);

    let guard = h.lifecycle.begin_interaction().await;
    let lc = h.lifecycle.clone();
    let sync = tokio::spawn(async move { lc.sync().await });

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(!sync.is_finished());
    assert_eq!(h.node.sync_calls.load(Ordering::SeqCst), before);

    drop(guard);
    sync.await.unwrap().unwrap();
    assert_eq!(h.node.sync_calls.load(Ordering::SeqCst), before + 1);
}

#[tokio::test(start_paused = true)]
async fn only_one_keep_alive_loop_runs() {
    let h = harness();
    h.lifecycle.setup().await.unwrap();
    let after_setup = h.node.sync_calls.load(Ordering::SeqCst);

    let lc = h.lifecycle.clone();
    let first = tokio::spawn(async move { lc.keep_synced(Duration::from_secs(1)).await });
    tokio::time::sleep(Duration::from_millis(3_500)).await;

    assert!(h.lifecycle.is_keep_synced_active());
    assert_eq!(h.lifecycle.keep_synced(Duration::from_secs(1)).await.unwrap(), KeepSynced::AlreadyRunning);

    h.lifecycle.stop_keep_synced();
    assert_eq!(first.await.unwrap().unwrap(), KeepSynced::Stopped);
    assert!(!h.lifecycle.is_keep_synced_active());

    // One loop at 1s over 3.5s: syncs at 0, 1, 2 and 3 seconds
    let loop_syncs = h.node.sync_calls.load(Ordering::SeqCst) - after_setup;
    assert!((3..=5).contains(&loop_syncs), "loop ran {loop_syncs} syncs");
}

#[tokio::test(start_paused = true)]
async fn new_block_wakes_the_loop() {
    let h = harness_with(test_config().with_sync_on_start(false));
    h.lifecycle.setup().await.unwrap();

    let lc = h.lifecycle.clone();
    let looping = tokio::spawn(async move { lc.keep_synced(Duration::from_secs(3_600)).await });
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(*h.node.synced_heights.lock().unwrap(), vec![100]);

    h.backend.mine(101);
    let outcome = h.chain.poll().await.unwrap();
    assert_eq!(outcome.headers.len(), 1);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(*h.node.synced_heights.lock().unwrap(), vec![100, 101]);

    h.lifecycle.stop_keep_synced();
    assert_eq!(looping.await.unwrap().unwrap(), KeepSynced::Stopped);
}

#[tokio::test(start_paused = true)]
async fn failed_sync_ends_the_keep_alive_loop() {
    let h = harness();
    h.lifecycle.setup().await.unwrap();

    let lc = h.lifecycle.clone();
    let looping = tokio::spawn(async move { lc.keep_synced(Duration::from_secs(1)).await });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(h.lifecycle.is_keep_synced_active());

    // Node dies and cannot come back
    h.node.crash();
    h.node.fail_start.store(true, Ordering::SeqCst);

    let outcome = tokio::time::timeout(Duration::from_secs(5), looping).await.expect("loop ended").unwrap();
    assert!(matches!(outcome, Err(Error::Setup(_))));
    assert!(!h.lifecycle.is_keep_synced_active());
    assert!(matches!(h.lifecycle.state(), NodeState::Error(_)));
}

#[tokio::test]
async fn keep_synced_needs_a_running_node() {
    let h = harness();
    assert!(matches!(h.lifecycle.keep_synced(Duration::from_secs(1)).await, Err(Error::InvalidState(_))));
    assert!(!h.lifecycle.is_keep_synced_active());
}

#[tokio::test]
async fn stop_and_restart() {
    let h = harness();
    h.lifecycle.setup().await.unwrap();

    h.lifecycle.stop().await.unwrap();
    assert_eq!(h.lifecycle.state(), NodeState::Stopped);
    assert!(h.lifecycle.node_id().is_none());
    assert!(!h.node.is_running());

    assert_eq!(h.lifecycle.restart().await.unwrap(), NODE_ID);
    assert!(h.node.is_running());
    assert_eq!(h.node.start_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn invoices_are_kept_until_they_expire() {
    let h = harness();
    assert!(matches!(h.lifecycle.create_invoice(Some(1_000), "tea", 60).await, Err(Error::InvalidState(_))));

    h.lifecycle.setup().await.unwrap();
    let short = h.lifecycle.create_invoice(Some(1_000), "tea", 60).await.unwrap();
    let long = h.lifecycle.create_invoice(None, "donation", 86_400).await.unwrap();
    assert_eq!(h.store.invoices().len(), 2);

    let later = short.expires_at + 1;
    assert_eq!(h.lifecycle.sweep_expired_invoices(later), 1);
    assert!(h.store.invoice(&short.payment_hash).is_none());
    assert!(h.store.invoice(&long.payment_hash).is_some());
}

#[tokio::test]
async fn paid_invoices_are_not_swept() {
    let h = harness();
    h.lifecycle.setup().await.unwrap();
    let invoice = h.lifecycle.create_invoice(Some(500), "paid", 60).await.unwrap();
    h.store.record_payment(lightkeeper::Payment::received(&invoice, 500, 1));

    assert_eq!(h.lifecycle.sweep_expired_invoices(invoice.expires_at + 10), 0);
    assert!(h.store.invoice(&invoice.payment_hash).is_some());
}

#[tokio::test]
async fn node_addresses_are_watched() {
    let h = harness();
    h.lifecycle.setup().await.unwrap();
    let chain = h.node.chain();

    let first = chain.get_address().await.unwrap();
    let second = chain.get_address().await.unwrap();
    assert_ne!(first, second);
    assert!(first.starts_with("bcrt1q"));
    assert_eq!(h.chain.watched_count(), 2);
    assert_eq!(h.backend.subscribed_scripts.lock().unwrap().len(), 2);
    assert_eq!(h.store.address_index(), Some(1));
}
