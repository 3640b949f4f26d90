mod support;

use std::sync::Arc;
use std::time::Duration;

use common::config::RetentionConfig;
use retention::RetentionService;
use support::{FakeMeta, FakeStore, MetaCall, SweepGate};

const INTERVAL: Duration = Duration::from_secs(30 * 60);

fn config(enabled: bool) -> RetentionConfig {
    RetentionConfig {
        enabled,
        check_interval: INTERVAL,
        reconcile_orphans: true,
    }
}

fn service(enabled: bool, meta: &Arc<FakeMeta>, store: &Arc<FakeStore>) -> RetentionService {
    RetentionService::new(config(enabled), meta.clone(), store.clone())
}

fn listings(meta: &FakeMeta) -> usize {
    meta.calls()
        .iter()
        .filter(|c| **c == MetaCall::Databases)
        .count()
}

#[tokio::test(start_paused = true)]
async fn test_disabled_service_never_sweeps() {
    let meta = Arc::new(FakeMeta::new(support::two_databases()));
    let store = Arc::new(FakeStore::new(&[1, 2, 3]));
    let mut service = service(false, &meta, &store);

    service.start();
    assert!(!service.is_running());

    tokio::time::sleep(INTERVAL * 3).await;
    service.stop().await;

    assert!(meta.calls().is_empty());
    assert_eq!(store.list_calls(), 0);
    assert_eq!(service.metrics().sweeps(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_first_sweep_waits_one_interval() {
    let meta = Arc::new(FakeMeta::new(support::two_databases()));
    let store = Arc::new(FakeStore::new(&[1, 2, 3]));
    let mut service = service(true, &meta, &store);

    service.start();
    assert!(service.is_running());

    tokio::time::sleep(INTERVAL - Duration::from_secs(60)).await;
    assert_eq!(service.metrics().sweeps(), 0);
    assert!(meta.calls().is_empty());

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(service.metrics().sweeps(), 1);
    assert_eq!(listings(&meta), 1);

    service.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_sweeps_repeat_every_interval() {
    let meta = Arc::new(FakeMeta::new(support::two_databases()));
    let store = Arc::new(FakeStore::new(&[1, 2, 3]));
    let mut service = service(true, &meta, &store);

    service.start();
    tokio::time::sleep(INTERVAL * 3 + Duration::from_secs(60)).await;
    service.stop().await;

    assert_eq!(service.metrics().sweeps(), 3);
    assert_eq!(meta.prune_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_second_start_is_ignored() {
    let meta = Arc::new(FakeMeta::new(support::two_databases()));
    let store = Arc::new(FakeStore::new(&[1, 2, 3]));
    let mut service = service(true, &meta, &store);

    service.start();
    service.start();
    tokio::time::sleep(INTERVAL + Duration::from_secs(60)).await;
    service.stop().await;

    assert_eq!(listings(&meta), 1);
    assert_eq!(service.metrics().sweeps(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_without_start_is_a_no_op() {
    let meta = Arc::new(FakeMeta::new(support::two_databases()));
    let store = Arc::new(FakeStore::new(&[1, 2, 3]));
    let mut service = service(true, &meta, &store);

    service.stop().await;
    service.stop().await;

    assert!(!service.is_running());
    assert!(meta.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stop_before_first_tick_runs_no_sweep() {
    let meta = Arc::new(FakeMeta::new(support::two_databases()));
    let store = Arc::new(FakeStore::new(&[1, 2, 3]));
    let mut service = service(true, &meta, &store);

    service.start();
    service.stop().await;
    tokio::time::sleep(INTERVAL * 2).await;

    assert!(!service.is_running());
    assert!(meta.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stop_waits_for_sweep_in_progress() {
    let gate = SweepGate::default();
    let meta = Arc::new(FakeMeta::new(support::two_databases()).with_gate(gate.clone()));
    let store = Arc::new(FakeStore::new(&[1, 2, 3]));
    let mut service = service(true, &meta, &store);

    service.start();
    gate.entered.notified().await;
    assert_eq!(service.metrics().sweeps(), 0);

    let release = gate.release.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        release.notify_one();
    });

    service.stop().await;

    assert!(!service.is_running());
    assert_eq!(service.metrics().sweeps(), 1);
    assert_eq!(meta.prune_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_service_restarts_after_stop() {
    let meta = Arc::new(FakeMeta::new(support::two_databases()));
    let store = Arc::new(FakeStore::new(&[1, 2, 3]));
    let mut service = service(true, &meta, &store);

    service.start();
    tokio::time::sleep(INTERVAL + Duration::from_secs(60)).await;
    service.stop().await;
    assert_eq!(service.metrics().sweeps(), 1);

    service.start();
    assert!(service.is_running());
    tokio::time::sleep(INTERVAL + Duration::from_secs(60)).await;
    service.stop().await;

    assert_eq!(service.metrics().sweeps(), 2);
    assert_eq!(listings(&meta), 2);
}

#[tokio::test(start_paused = true)]
async fn test_service_applies_orphan_setting() {
    let meta = Arc::new(FakeMeta::new(support::two_databases()));
    let store = Arc::new(FakeStore::new(&[1, 2, 3]));
    store.fail_shard(2, 1);
    let settings = RetentionConfig {
        reconcile_orphans: false,
        ..config(true)
    };
    let mut service = RetentionService::new(settings, meta.clone(), store.clone());

    service.start();
    tokio::time::sleep(INTERVAL * 2 + Duration::from_secs(60)).await;
    service.stop().await;

    assert_eq!(service.metrics().sweeps(), 2);
    assert_eq!(service.metrics().orphans_deleted(), 0);
    assert_eq!(store.stored(), vec![2]);
}
