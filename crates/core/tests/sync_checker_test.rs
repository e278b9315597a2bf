//! Sync checker behaviour against scripted nodes, altruists and caches

mod support;

use std::sync::Arc;
use std::time::Duration;
use support::*;
use synccheck_cache::keys;
use synccheck_common::traits::CacheInstance;
use synccheck_common::types::Session;
use synccheck_common::utils::metrics::SyncCheckMetrics;
use synccheck_core::{SyncCheckConfig, SyncCheckRequest, SyncChecker};

const CHAIN: &str = "0021";
const SESSION: &str = "session-a";

fn fast_config() -> SyncCheckConfig {
    SyncCheckConfig {
        relay_timeout_ms: 200,
        ..Default::default()
    }
}

async fn run(checker: &SyncChecker, session: &Session, allowance: Option<u64>) -> Vec<String> {
    let chain = chain(CHAIN, allowance);
    let application = application("app-1");
    let synced = checker
        .check(SyncCheckRequest {
            session,
            chain: &chain,
            application: &application,
            request_id: "req-1",
        })
        .await;
    public_keys(&synced)
}

fn node(i: usize) -> String {
    format!("{}-node-{}", CHAIN, i)
}

#[tokio::test]
async fn test_lagging_and_failed_nodes_are_dropped() {
    let relay = Arc::new(ScriptedRelay::new().with_session(
        CHAIN,
        SESSION,
        &[
            Reply::Height(100),
            Reply::Height(99),
            Reply::Height(98),
            Reply::Height(0),
            Reply::Height(0),
        ],
    ));
    let altruist = Arc::new(FixedAltruist::new(97));
    let cache = Arc::new(RecordingCache::new("primary"));
    let checker = checker(
        fast_config(),
        coordinator(vec![cache.clone()]),
        relay.clone(),
        altruist.clone(),
    );

    let synced = run(&checker, &relay.session(CHAIN), Some(5)).await;

    assert_eq!(synced, vec![node(0), node(1), node(2)]);
    assert_eq!(relay.node_calls(), 5);
    assert_eq!(altruist.calls(), 1);
    // Fewer in sync than assigned triggers one challenge
    assert_eq!(relay.consensus_calls(), 1);

    let (value, ttl) = cache.last_write(&keys::result_key(SESSION)).unwrap();
    let published: Vec<String> = serde_json::from_str(&value).unwrap();
    assert_eq!(published, synced);
    assert_eq!(ttl, Duration::from_secs(300));

    let (flag, flag_ttl) = cache.last_write(&keys::failure_key(CHAIN, &node(0))).unwrap();
    assert_eq!(flag, "false");
    assert_eq!(flag_ttl, keys::FAILURE_TTL);
    assert!(cache.last_write(&keys::failure_key(CHAIN, &node(3))).is_none());
}

#[tokio::test]
async fn test_all_nodes_in_sync_sends_no_challenge() {
    let relay = Arc::new(ScriptedRelay::new().with_session(
        CHAIN,
        SESSION,
        &[Reply::Height(100), Reply::Height(100), Reply::Height(99)],
    ));
    let checker = checker(
        fast_config(),
        coordinator(vec![Arc::new(RecordingCache::new("primary"))]),
        relay.clone(),
        Arc::new(FixedAltruist::new(100)),
    );

    let synced = run(&checker, &relay.session(CHAIN), Some(5)).await;

    assert_eq!(synced.len(), 3);
    assert_eq!(relay.consensus_calls(), 0);
}

#[tokio::test]
async fn test_disagreement_without_altruist_returns_all_nodes() {
    let relay = Arc::new(ScriptedRelay::new().with_session(
        CHAIN,
        SESSION,
        &[Reply::Height(50), Reply::Height(10)],
    ));
    let cache = Arc::new(RecordingCache::new("primary"));
    let checker = checker(
        fast_config(),
        coordinator(vec![cache.clone()]),
        relay.clone(),
        Arc::new(FixedAltruist::new(0)),
    );

    let synced = run(&checker, &relay.session(CHAIN), Some(5)).await;

    assert_eq!(synced, vec![node(0), node(1)]);
    assert_eq!(relay.consensus_calls(), 0);
    assert!(cache.last_write(&keys::result_key(SESSION)).is_none());
}

#[tokio::test]
async fn test_no_valid_heights_with_altruist_yields_empty_set() {
    let relay = Arc::new(ScriptedRelay::new().with_session(
        CHAIN,
        SESSION,
        &[Reply::Height(0), Reply::Failure, Reply::Garbage, Reply::Height(0), Reply::Failure],
    ));
    let cache = Arc::new(RecordingCache::new("primary"));
    let checker = checker(
        fast_config(),
        coordinator(vec![cache.clone()]),
        relay.clone(),
        Arc::new(FixedAltruist::new(120)),
    );

    let synced = run(&checker, &relay.session(CHAIN), Some(5)).await;

    assert!(synced.is_empty());
    let (value, ttl) = cache.last_write(&keys::result_key(SESSION)).unwrap();
    assert_eq!(value, "[]");
    assert_eq!(ttl, Duration::from_secs(30));
}

#[tokio::test]
async fn test_quorum_shortfall_falls_back_without_altruist() {
    let replies = [
        Reply::Height(100),
        Reply::Height(100),
        Reply::Failure,
        Reply::Garbage,
        Reply::Hang,
    ];
    let relay = Arc::new(ScriptedRelay::new().with_session(CHAIN, SESSION, &replies));
    let checker = checker(
        fast_config(),
        coordinator(vec![Arc::new(RecordingCache::new("primary"))]),
        relay.clone(),
        Arc::new(FixedAltruist::new(0)),
    );

    let synced = run(&checker, &relay.session(CHAIN), Some(5)).await;

    assert_eq!(synced.len(), 5);
}

#[tokio::test]
async fn test_quorum_shortfall_is_filtered_when_altruist_answers() {
    let replies = [
        Reply::Height(100),
        Reply::Height(100),
        Reply::Failure,
        Reply::Garbage,
        Reply::Hang,
    ];
    let relay = Arc::new(ScriptedRelay::new().with_session(CHAIN, SESSION, &replies));
    let checker = checker(
        fast_config(),
        coordinator(vec![Arc::new(RecordingCache::new("primary"))]),
        relay.clone(),
        Arc::new(FixedAltruist::new(100)),
    );

    let started = tokio::time::Instant::now();
    let synced = run(&checker, &relay.session(CHAIN), Some(5)).await;

    assert_eq!(synced, vec![node(0), node(1)]);
    // The hung node is cut off by the relay timeout
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_single_valid_log_in_small_session_falls_back() {
    let relay = Arc::new(ScriptedRelay::new().with_session(
        CHAIN,
        SESSION,
        &[Reply::Height(100), Reply::Failure],
    ));
    let checker = checker(
        fast_config(),
        coordinator(vec![Arc::new(RecordingCache::new("primary"))]),
        relay.clone(),
        Arc::new(FixedAltruist::new(0)),
    );

    let synced = run(&checker, &relay.session(CHAIN), Some(5)).await;

    assert_eq!(synced, vec![node(0), node(1)]);
}

#[tokio::test]
async fn test_allowance_boundary_is_inclusive() {
    let relay = Arc::new(ScriptedRelay::new().with_session(
        CHAIN,
        SESSION,
        &[
            Reply::Height(100),
            Reply::Height(100),
            Reply::Height(100),
            Reply::Height(95),
            Reply::Height(94),
        ],
    ));
    let checker = checker(
        fast_config(),
        coordinator(vec![Arc::new(RecordingCache::new("primary"))]),
        relay.clone(),
        Arc::new(FixedAltruist::new(0)),
    );

    let synced = run(&checker, &relay.session(CHAIN), Some(5)).await;

    assert_eq!(synced, vec![node(0), node(1), node(2), node(3)]);
}

#[tokio::test]
async fn test_missing_allowance_uses_default() {
    let relay = Arc::new(ScriptedRelay::new().with_session(
        CHAIN,
        SESSION,
        &[Reply::Height(100), Reply::Height(100), Reply::Height(98), Reply::Height(97)],
    ));
    let config = SyncCheckConfig {
        default_allowance: 2,
        ..fast_config()
    };
    let checker = checker(
        config,
        coordinator(vec![Arc::new(RecordingCache::new("primary"))]),
        relay.clone(),
        Arc::new(FixedAltruist::new(0)),
    );

    let synced = run(&checker, &relay.session(CHAIN), Some(0)).await;

    assert_eq!(synced, vec![node(0), node(1), node(2)]);
}

#[tokio::test]
async fn test_altruist_height_is_a_floor() {
    let relay = Arc::new(ScriptedRelay::new().with_session(
        CHAIN,
        SESSION,
        &[Reply::Height(100), Reply::Height(100), Reply::Height(100)],
    ));
    let checker = checker(
        fast_config(),
        coordinator(vec![Arc::new(RecordingCache::new("primary"))]),
        relay.clone(),
        Arc::new(FixedAltruist::new(110)),
    );

    let synced = run(&checker, &relay.session(CHAIN), Some(5)).await;

    assert!(synced.is_empty());
    assert_eq!(relay.consensus_calls(), 1);
}

#[tokio::test]
async fn test_empty_session() {
    let relay = Arc::new(ScriptedRelay::new().with_session(CHAIN, SESSION, &[]));
    let altruist = Arc::new(FixedAltruist::new(0));
    let checker = checker(
        fast_config(),
        coordinator(vec![Arc::new(RecordingCache::new("primary"))]),
        relay.clone(),
        altruist.clone(),
    );

    let synced = run(&checker, &relay.session(CHAIN), Some(5)).await;

    assert!(synced.is_empty());
    assert_eq!(relay.node_calls(), 0);
    assert_eq!(relay.consensus_calls(), 0);
}

#[tokio::test]
async fn test_held_lock_skips_check() {
    let relay = Arc::new(ScriptedRelay::new().with_session(
        CHAIN,
        SESSION,
        &[Reply::Height(100), Reply::Height(10), Reply::Height(100)],
    ));
    let altruist = Arc::new(FixedAltruist::new(100));
    let cache = Arc::new(RecordingCache::new("primary"));
    cache
        .set(&keys::lock_key(SESSION), "true", Duration::from_secs(60))
        .await
        .unwrap();
    let checker = checker(
        fast_config(),
        coordinator(vec![cache.clone()]),
        relay.clone(),
        altruist.clone(),
    );

    let synced = run(&checker, &relay.session(CHAIN), Some(5)).await;

    assert_eq!(synced, vec![node(0), node(1), node(2)]);
    assert_eq!(relay.node_calls(), 0);
    assert_eq!(altruist.calls(), 0);
    assert_eq!(cache.write_count(), 1);
}

#[tokio::test]
async fn test_results_only_written_where_lock_was_taken() {
    let relay = Arc::new(ScriptedRelay::new().with_session(
        CHAIN,
        SESSION,
        &[Reply::Height(100), Reply::Height(100), Reply::Height(10)],
    ));
    let locked = Arc::new(RecordingCache::new("locked"));
    let free = Arc::new(RecordingCache::new("free"));
    locked
        .set(&keys::lock_key(SESSION), "true", Duration::from_secs(60))
        .await
        .unwrap();
    let checker = checker(
        fast_config(),
        coordinator(vec![locked.clone(), free.clone()]),
        relay.clone(),
        Arc::new(FixedAltruist::new(100)),
    );

    let synced = run(&checker, &relay.session(CHAIN), Some(5)).await;

    assert_eq!(synced, vec![node(0), node(1)]);
    assert!(free.last_write(&keys::lock_key(SESSION)).is_some());
    assert!(free.last_write(&keys::result_key(SESSION)).is_some());
    assert!(locked.last_write(&keys::result_key(SESSION)).is_none());
    assert_eq!(locked.write_count(), 1);
}

#[tokio::test]
async fn test_concurrent_checks_run_once() {
    let relay = Arc::new(
        ScriptedRelay::new()
            .with_session(
                CHAIN,
                SESSION,
                &[
                    Reply::Height(100),
                    Reply::Height(100),
                    Reply::Height(100),
                    Reply::Height(100),
                    Reply::Height(10),
                ],
            )
            .with_delay(Duration::from_millis(100)),
    );
    let checker = Arc::new(checker(
        fast_config(),
        coordinator(vec![Arc::new(RecordingCache::new("primary"))]),
        relay.clone(),
        Arc::new(FixedAltruist::new(100)),
    ));
    let session = relay.session(CHAIN);

    let first = {
        let checker = checker.clone();
        let session = session.clone();
        tokio::spawn(async move { run(&checker, &session, Some(5)).await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;

    let second = run(&checker, &session, Some(5)).await;
    let first = first.await.unwrap();

    assert_eq!(second.len(), 5);
    assert_eq!(first.len(), 4);
    assert_eq!(relay.node_calls(), 5);
}

#[tokio::test]
async fn test_released_lock_allows_recheck() {
    let relay = Arc::new(ScriptedRelay::new().with_session(
        CHAIN,
        SESSION,
        &[Reply::Height(100), Reply::Height(100), Reply::Height(100)],
    ));
    let cache = Arc::new(RecordingCache::new("primary"));
    let checker = checker(
        fast_config(),
        coordinator(vec![cache.clone()]),
        relay.clone(),
        Arc::new(FixedAltruist::new(100)),
    );
    let session = relay.session(CHAIN);

    let first = run(&checker, &session, Some(5)).await;
    let skipped = run(&checker, &session, Some(5)).await;
    assert_eq!(relay.node_calls(), 3);
    assert_eq!(skipped.len(), 3);

    cache.invalidate(&keys::lock_key(SESSION)).await;
    let second = run(&checker, &session, Some(5)).await;

    assert_eq!(relay.node_calls(), 6);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_lock_expires_after_ttl() {
    let relay = Arc::new(ScriptedRelay::new().with_session(
        CHAIN,
        SESSION,
        &[Reply::Height(100), Reply::Height(100), Reply::Height(100)],
    ));
    let config = SyncCheckConfig {
        lock_ttl_secs: 1,
        ..fast_config()
    };
    let checker = checker(
        config,
        coordinator(vec![Arc::new(RecordingCache::new("primary"))]),
        relay.clone(),
        Arc::new(FixedAltruist::new(100)),
    );
    let session = relay.session(CHAIN);

    run(&checker, &session, Some(5)).await;
    tokio::time::sleep(Duration::from_millis(1_200)).await;
    run(&checker, &session, Some(5)).await;

    assert_eq!(relay.node_calls(), 6);
}

#[tokio::test]
async fn test_unavailable_cache_does_not_block_check() {
    let relay = Arc::new(ScriptedRelay::new().with_session(
        CHAIN,
        SESSION,
        &[Reply::Height(100), Reply::Height(100), Reply::Height(10)],
    ));
    let memory = Arc::new(RecordingCache::new("memory"));
    let checker = checker(
        fast_config(),
        coordinator(vec![Arc::new(DownCache), memory.clone()]),
        relay.clone(),
        Arc::new(FixedAltruist::new(100)),
    );

    let synced = run(&checker, &relay.session(CHAIN), Some(5)).await;

    assert_eq!(synced, vec![node(0), node(1)]);
    assert!(memory.last_write(&keys::result_key(SESSION)).is_some());
}

#[tokio::test]
async fn test_all_caches_down_still_filters() {
    let relay = Arc::new(ScriptedRelay::new().with_session(
        CHAIN,
        SESSION,
        &[Reply::Height(100), Reply::Height(100), Reply::Height(10)],
    ));
    let checker = checker(
        fast_config(),
        coordinator(vec![Arc::new(DownCache)]),
        relay.clone(),
        Arc::new(FixedAltruist::new(100)),
    );

    let synced = run(&checker, &relay.session(CHAIN), Some(5)).await;

    assert_eq!(synced, vec![node(0), node(1)]);
}

#[tokio::test]
async fn test_cached_synced_nodes() {
    let relay = Arc::new(ScriptedRelay::new().with_session(
        CHAIN,
        SESSION,
        &[Reply::Height(100), Reply::Height(10), Reply::Height(100)],
    ));
    let checker = checker(
        fast_config(),
        coordinator(vec![Arc::new(RecordingCache::new("primary"))]),
        relay.clone(),
        Arc::new(FixedAltruist::new(100)),
    );
    let session = relay.session(CHAIN);

    assert!(checker.cached_synced_nodes(&session).await.is_none());

    run(&checker, &session, Some(5)).await;
    let cached = checker.cached_synced_nodes(&session).await.unwrap();

    assert_eq!(public_keys(&cached), vec![node(0), node(2)]);
}

#[tokio::test]
async fn test_metrics_are_recorded() {
    let relay = Arc::new(ScriptedRelay::new().with_session(
        CHAIN,
        SESSION,
        &[
            Reply::Height(100),
            Reply::Height(100),
            Reply::Height(100),
            Reply::Height(10),
            Reply::Failure,
        ],
    ));
    let metrics = Arc::new(SyncCheckMetrics::new().unwrap());
    let checker = checker(
        fast_config(),
        coordinator(vec![Arc::new(RecordingCache::new("primary"))]),
        relay.clone(),
        Arc::new(FixedAltruist::new(100)),
    )
    .with_metrics(metrics.clone());

    run(&checker, &relay.session(CHAIN), Some(5)).await;

    let text = metrics.gather().unwrap();
    assert!(text.contains("synccheck_checks_total 1"));
    assert!(text.contains("synccheck_nodes_in_sync_total 3"));
    assert!(text.contains("synccheck_nodes_behind_total 2"));
    assert!(text.contains("synccheck_node_failures_total 1"));
    assert!(text.contains("synccheck_consensus_relays_total 1"));
}

#[tokio::test]
async fn test_replicas_sharing_an_instance_check_once() {
    let relay = Arc::new(ScriptedRelay::new().with_session(
        CHAIN,
        SESSION,
        &[Reply::Height(100), Reply::Height(100), Reply::Height(10)],
    ));
    let shared = Arc::new(RecordingCache::new("shared"));
    let replica_a = checker(
        fast_config(),
        coordinator(vec![shared.clone()]),
        relay.clone(),
        Arc::new(FixedAltruist::new(100)),
    );
    let replica_b = checker(
        fast_config(),
        coordinator(vec![shared.clone()]),
        relay.clone(),
        Arc::new(FixedAltruist::new(100)),
    );
    let session = relay.session(CHAIN);

    let first = run(&replica_a, &session, Some(5)).await;
    let second = run(&replica_b, &session, Some(5)).await;

    assert_eq!(first, vec![node(0), node(1)]);
    // The second replica finds the lock and passes the session through
    assert_eq!(second, vec![node(0), node(1), node(2)]);
    assert_eq!(relay.node_calls(), 3);

    let cached = replica_b.cached_synced_nodes(&session).await.unwrap();
    assert_eq!(public_keys(&cached), first);
}

#[tokio::test]
async fn test_tied_heights_keep_a_stable_order() {
    let relay = Arc::new(ScriptedRelay::new().with_session(
        CHAIN,
        SESSION,
        &[Reply::Height(100), Reply::Height(101), Reply::Height(100), Reply::Height(101)],
    ));
    let cache = Arc::new(RecordingCache::new("primary"));
    let checker = checker(
        fast_config(),
        coordinator(vec![cache.clone()]),
        relay.clone(),
        Arc::new(FixedAltruist::new(100)),
    );
    let session = relay.session(CHAIN);

    let first = run(&checker, &session, Some(5)).await;
    cache.invalidate(&keys::lock_key(SESSION)).await;
    let second = run(&checker, &session, Some(5)).await;

    assert_eq!(relay.node_calls(), 8);
    assert_eq!(first, vec![node(1), node(3), node(0), node(2)]);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_slow_node_lookup_is_bounded_by_relay_timeout() {
    let relay = Arc::new(ScriptedRelay::new().with_session(
        CHAIN,
        SESSION,
        &[Reply::Height(100), Reply::Height(100), Reply::Height(100)],
    ));
    let locator = Arc::new(HangingLocator::default());
    let checker = checker_with_locator(
        fast_config(),
        coordinator(vec![Arc::new(RecordingCache::new("primary"))]),
        relay.clone(),
        Arc::new(FixedAltruist::new(100)),
        locator.clone(),
    );

    let started = tokio::time::Instant::now();
    let synced = run(&checker, &relay.session(CHAIN), Some(5)).await;

    assert_eq!(synced, vec![node(0), node(1), node(2)]);
    assert!(started.elapsed() < Duration::from_secs(2));
    // One lookup per node, shared by the result log and the classification
    assert_eq!(locator.calls(), 3);
}
