use meshwatch_devkit::fixtures::{samples, task_id};
use meshwatch_devkit::test_utils::eager_settings;
use meshwatch_devkit::{series, MeshBuilder, TestHarness, T0};
use meshwatch_kernel::cache::{CacheSettings, CachingRepo};
use meshwatch_kernel::models::{ConnectionMatrix, MeshResults};
use meshwatch_kernel::ports::LocalFileRepo;
use meshwatch_kernel::types::{AgentId, TestId};
use tempfile::tempdir;
use time::Duration;

fn limited_settings() -> CacheSettings {
    CacheSettings {
        request_interval_seconds: 3600,
        ..eager_settings()
    }
}

#[test]
fn test_shallow_then_deep_accumulation() {
    let mut harness = TestHarness::new();
    let shallow = MeshBuilder::new(&["a", "b", "c"]).full_mesh(T0, 1).build();
    let deep = MeshBuilder::new(&["a", "b", "c"])
        .connection("a", "b", T0, 10)
        .build();
    // lookback query, all connections, then the single connection
    harness.reply(shallow.clone()).reply(shallow).reply(deep);

    let all = harness.all();
    assert_eq!(samples(&all, "a", "b"), 1);

    let merged = harness.single("a", "b");
    let ab = merged.connection(&AgentId::from("a"), &AgentId::from("b")).unwrap();
    assert_eq!(ab.len(), 10);
    assert_eq!(ab.latest_measurement().unwrap().timestamp(), T0);
    assert_eq!(ab.oldest_measurement().unwrap().timestamp(), T0 - Duration::seconds(540));
    // other pairs untouched by the single-connection fetch
    assert_eq!(samples(&merged, "b", "c"), 1);

    let query = harness.repo.last_query().unwrap();
    assert_eq!(query.agent_ids, vec![AgentId::from("a")]);
    assert_eq!(query.task_ids, vec![task_id("b")]);
    assert_eq!(query.history_length_seconds, 3600);

    harness.expect_fetches(3).verify_expectations().unwrap();
    assert_eq!(harness.get_stats().health.incremental_updates, 1);
}

#[test]
fn test_configuration_change_replaces_cache() {
    let mut harness = TestHarness::new();
    let before = MeshBuilder::new(&["a", "b", "c"]).full_mesh(T0, 5).build();
    let after = MeshBuilder::new(&["a", "b", "d"])
        .full_mesh(T0 + Duration::minutes(1), 1)
        .build();
    harness.reply(before.clone()).reply(before).reply(after);

    harness.all();
    let replaced = harness.all();

    assert_eq!(replaced.agents.len(), 3);
    assert!(replaced.agents.get_by_id(&AgentId::from("c")).is_none());
    assert_eq!(samples(&replaced, "a", "c"), 0);
    assert_eq!(samples(&replaced, "c", "a"), 0);
    // history is not carried across configurations
    assert_eq!(samples(&replaced, "a", "b"), 1);
    assert_eq!(samples(&replaced, "a", "d"), 1);

    harness.expect_fetches(3).verify_expectations().unwrap();
    let health = harness.get_stats().health;
    assert_eq!(health.full_updates, 2);
    assert_eq!(health.incremental_updates, 0);
}

#[test]
fn test_upstream_failure_leaves_cache_unchanged() {
    let harness = TestHarness::new();
    let mesh = MeshBuilder::new(&["a", "b"])
        .connection("a", "b", T0, 3)
        .connection("b", "a", T0 - Duration::minutes(5), 3)
        .build();
    harness.reply(mesh.clone()).reply(mesh).fail("connection reset");

    let before = harness.all();
    let after = harness.all();

    assert_eq!(before.timestamp_oldest(), Some(T0 - Duration::minutes(5)));
    assert_eq!(after.timestamp_oldest(), before.timestamp_oldest());
    assert_eq!(after.timestamp_newest(), before.timestamp_newest());
    assert_eq!(samples(&after, "a", "b"), 3);

    let health = harness.get_stats().health;
    assert_eq!(health.fetch_failures, 1);
    assert_eq!(health.fetch_attempts, 2);
    assert!(health.populated);
}

#[test]
fn test_failure_on_empty_cache_returns_empty_results() {
    let harness = TestHarness::new();
    harness.fail("dns failure");

    let mesh = harness.all();

    assert!(mesh.is_empty());
    assert!(!harness.get_stats().health.populated);
}

#[test]
fn test_returned_copies_do_not_alias_cache() {
    let harness = TestHarness::with_settings(limited_settings());
    let mesh = MeshBuilder::new(&["a", "b"]).full_mesh(T0, 2).build();
    harness.reply(mesh.clone()).reply(mesh);

    let mut first = harness.all();
    first.agents.remove(&AgentId::from("a"));
    first.connection_matrix = ConnectionMatrix::new();

    // rate limited: served from cache
    let second = harness.all();
    assert_eq!(second.agents.len(), 2);
    assert_eq!(samples(&second, "a", "b"), 2);
    assert_eq!(harness.get_stats().health.rate_limited, 1);
}

#[test]
fn test_rate_limit_is_per_query_shape() {
    let mut harness = TestHarness::with_settings(limited_settings());
    let mesh = MeshBuilder::new(&["a", "b", "c"]).full_mesh(T0, 1).build();
    for _ in 0..4 {
        harness.reply(mesh.clone());
    }

    harness.all();
    harness.all();
    harness.single("a", "b");
    harness.single("a", "b");
    harness.single("a", "c");

    harness.expect_fetches(4).verify_expectations().unwrap();
    assert_eq!(harness.get_stats().health.rate_limited, 2);
}

#[test]
fn test_fresh_cache_skips_upstream_and_limiter() {
    let mut harness = TestHarness::with_settings(CacheSettings {
        max_data_age_seconds: u32::MAX,
        ..eager_settings()
    });
    let mesh = MeshBuilder::new(&["a", "b"]).full_mesh(T0, 1).build();
    harness.reply(mesh.clone()).reply(mesh);

    harness.all();
    harness.all();
    harness.all();

    harness.expect_fetches(2).verify_expectations().unwrap();
    assert_eq!(harness.get_stats().health.rate_limited, 0);
}

#[test]
fn test_stale_update_does_not_regress_cache() {
    let harness = TestHarness::new();
    let fresh = MeshBuilder::new(&["a", "b"]).connection("a", "b", T0, 2).build();
    let stale = MeshBuilder::new(&["a", "b"])
        .connection("a", "b", T0 - Duration::minutes(10), 5)
        .build();
    harness.reply(fresh.clone()).reply(fresh).reply(stale);

    harness.all();
    let mesh = harness.all();

    let ab = mesh.connection(&AgentId::from("a"), &AgentId::from("b")).unwrap();
    assert_eq!(ab.len(), 2);
    assert_eq!(ab.latest_measurement().unwrap().timestamp(), T0);
}

#[test]
fn test_lookback_learned_from_first_query() {
    let harness = TestHarness::new();
    let mesh = MeshBuilder::new(&["a", "b"]).period(30).full_mesh(T0, 1).build();
    harness.reply(mesh.clone()).reply(mesh);

    harness.all();

    let queries = harness.repo.queries();
    assert_eq!(queries.len(), 2);
    assert!(!queries[0].timeseries);
    assert_eq!(queries[0].history_length_seconds, 3600);
    assert!(queries[1].timeseries);
    assert_eq!(queries[1].history_length_seconds, 60);
}

#[test]
fn test_lookback_defaults_without_task_config() {
    let harness = TestHarness::new();
    let mesh = MeshBuilder::new(&["a", "b"]).without_tasks().full_mesh(T0, 1).build();
    harness.reply(mesh.clone()).reply(mesh.clone()).reply(mesh);

    harness.all();
    harness.single("a", "b");

    let queries = harness.repo.queries();
    assert_eq!(queries[1].history_length_seconds, 120);
    // no task for "b": the whole row is requested
    assert!(queries[2].task_ids.is_empty());
    assert_eq!(queries[2].agent_ids, vec![AgentId::from("a")]);
}

#[test]
fn test_renamed_agent_keeps_history() {
    let harness = TestHarness::new();
    let first = MeshBuilder::new(&["a", "b"]).connection("a", "b", T0, 3).build();
    let renamed = MeshBuilder::new(&["a", "b"])
        .rename("b", "bravo")
        .column("a", series("b", T0 + Duration::minutes(1), 1, Duration::minutes(1)))
        .build();
    harness.reply(first.clone()).reply(first).reply(renamed);

    harness.all();
    let mesh = harness.all();

    assert_eq!(mesh.agents.get_by_id(&AgentId::from("b")).unwrap().name, "bravo");
    assert!(mesh.agents.get_by_name("bravo").is_some());
    assert_eq!(samples(&mesh, "a", "b"), 4);
}

#[test]
fn test_caching_over_local_snapshot() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("mesh.json");
    let snapshot = MeshBuilder::new(&["a", "b", "c"]).full_mesh(T0, 10).build();
    LocalFileRepo::store(&path, &snapshot).unwrap();

    let repo = LocalFileRepo::open(&path).unwrap();
    let caching = CachingRepo::new(repo, TestId::from("local"), eager_settings());

    let all = caching.get_mesh_results_all_connections();
    // lookback of two periods from the cached task config: 3 samples
    assert_eq!(samples(&all, "a", "b"), 3);
    assert_eq!(all.num_connections_with_data(), 6);

    let deep = caching.get_mesh_results_single_connection(&AgentId::from("a"), &AgentId::from("b"));
    assert_eq!(samples(&deep, "a", "b"), 10);
    assert_eq!(samples(&deep, "a", "c"), 3);

    let config = caching.get_mesh_config();
    assert_eq!(config.agents.len(), 3);
    assert_eq!(config.update_period_seconds, 60);
}

#[test]
fn test_config_from_repo_before_first_fetch() {
    let harness = TestHarness::with_settings(limited_settings());
    let mesh = MeshBuilder::new(&["a", "b", "c"]).period(30).build();
    harness.repo.set_config(mesh.config());

    let config = harness.caching.get_mesh_config();
    assert_eq!(config.agents.len(), 3);
    assert_eq!(config.update_period_seconds, 30);

    // rate limited, and nothing cached to fall back on yet
    assert!(harness.caching.get_mesh_config().agents.is_empty());

    let health = harness.get_stats().health;
    assert_eq!(health.fetch_attempts, 1);
    assert_eq!(health.fetch_failures, 0);
    assert_eq!(health.rate_limited, 1);
    assert_eq!(harness.get_stats().upstream_calls, 0);
}

#[test]
fn test_concurrent_readers_share_one_rate_limited_fetch() {
    let harness = TestHarness::with_settings(limited_settings());
    harness
        .repo
        .set_fallback(MeshBuilder::new(&["a", "b", "c"]).full_mesh(T0, 2).build());

    let results: Vec<MeshResults> = std::thread::scope(|s| {
        let readers: Vec<_> = (0..8).map(|_| s.spawn(|| harness.all())).collect();
        readers.into_iter().map(|r| r.join().unwrap()).collect()
    });

    // lookback then data, for the one reader that got through
    assert_eq!(harness.repo.call_count(), 2);
    for mesh in &results {
        assert!(mesh.is_empty() || mesh.num_connections_with_data() == 6);
    }
    let health = harness.get_stats().health;
    assert_eq!(health.rate_limited, 7);
    assert_eq!(health.full_updates, 1);
    assert_eq!(health.connections_with_data, 6);
}

#[test]
fn test_concurrent_fetches_merge_into_one_cache() {
    let harness = TestHarness::new();
    harness
        .repo
        .set_fallback(MeshBuilder::new(&["a", "b", "c"]).full_mesh(T0, 2).build());

    let results: Vec<MeshResults> = std::thread::scope(|s| {
        let readers: Vec<_> = (0..8).map(|_| s.spawn(|| harness.all())).collect();
        readers.into_iter().map(|r| r.join().unwrap()).collect()
    });

    for mesh in &results {
        assert_eq!(mesh.agents.len(), 3);
        assert_eq!(mesh.num_connections_with_data(), 6);
        assert_eq!(samples(mesh, "a", "b"), 2);
    }
    let health = harness.get_stats().health;
    assert_eq!(health.full_updates, 1);
    assert_eq!(health.incremental_updates, 7);
    assert_eq!(health.fetch_failures, 0);
}
