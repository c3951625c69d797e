use std::fs;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use intake_config::{IntakeConfig, SeenPolicy, WatchPair, parse_str};
use intake_data::MetadataStore;
use intake_events::{Event, EventBus};
use intake_fsops::{FileManager, FsOpsError, ManagerDeps, ManagerSettings, WatchRegistry};
use intake_telemetry::Metrics;
use intake_test_support::fixtures::{file_names, wait_for, write_file};
use intake_test_support::mocks::{FailingStore, RecordingStore};
use tempfile::TempDir;
use tokio_stream::StreamExt;

const POLL: Duration = Duration::from_millis(50);
const PATIENCE: Duration = Duration::from_secs(3);

fn deps(registry: &WatchRegistry, store: Arc<dyn MetadataStore>) -> Result<ManagerDeps> {
    Ok(
        ManagerDeps::new(registry.clone(), store, EventBus::with_capacity(256), Metrics::new()?)
            .with_settings(ManagerSettings {
                poll_interval: POLL,
                ..ManagerSettings::default()
            }),
    )
}

fn fast_config(pairs: Vec<WatchPair>) -> IntakeConfig {
    IntakeConfig {
        watch: pairs,
        poll_interval_ms: 50,
        ..IntakeConfig::default()
    }
}

#[tokio::test]
async fn new_file_is_moved_and_recorded() -> Result<()> {
    let temp = TempDir::new()?;
    let (src, dst) = (temp.path().join("src1"), temp.path().join("dst1"));
    let store = RecordingStore::new();
    let manager = FileManager::new(deps(&WatchRegistry::new(), Arc::new(store.clone()))?).await?;
    manager.watch(&src, &dst).await?;

    write_file(&src, "a.txt", b"hello")?;
    assert!(wait_for(PATIENCE, || dst.join("a.txt").exists()).await);
    assert!(!src.join("a.txt").exists());
    assert_eq!(fs::read(dst.join("a.txt"))?, b"hello");

    assert!(wait_for(PATIENCE, || store.len() == 1).await);
    let record = manager
        .find_one_file("a.txt")
        .await?
        .ok_or_else(|| anyhow::anyhow!("record missing"))?;
    assert!(record.file_path.ends_with("a.txt"));
    manager.destroy().await?;
    Ok(())
}

#[tokio::test]
async fn second_watch_of_same_source_is_rejected() -> Result<()> {
    let temp = TempDir::new()?;
    let (src, dst) = (temp.path().join("src1"), temp.path().join("dst1"));
    let manager =
        FileManager::new(deps(&WatchRegistry::new(), Arc::new(RecordingStore::new()))?).await?;
    manager.watch(&src, &dst).await?;

    let err = manager.watch(&src, &dst).await;
    assert!(matches!(err, Err(FsOpsError::AlreadyWatched { .. })));
    assert_eq!(manager.watched_dirs().len(), 1);

    write_file(&src, "a.txt", b"a")?;
    assert!(wait_for(PATIENCE, || dst.join("a.txt").exists()).await);
    manager.destroy().await?;
    Ok(())
}

#[tokio::test]
async fn subdirectories_stay_in_place() -> Result<()> {
    let temp = TempDir::new()?;
    let (src, dst) = (temp.path().join("src1"), temp.path().join("dst1"));
    let manager =
        FileManager::new(deps(&WatchRegistry::new(), Arc::new(RecordingStore::new()))?).await?;
    manager.watch(&src, &dst).await?;

    fs::create_dir_all(src.join("sub"))?;
    tokio::time::sleep(POLL * 4).await;
    assert!(src.join("sub").is_dir());
    assert!(!dst.join("sub").exists());
    manager.destroy().await?;
    Ok(())
}

#[tokio::test]
async fn concurrent_files_each_land_once() -> Result<()> {
    let temp = TempDir::new()?;
    let (src, dst) = (temp.path().join("src1"), temp.path().join("dst1"));
    let store = RecordingStore::new();
    let manager = FileManager::new(deps(&WatchRegistry::new(), Arc::new(store.clone()))?).await?;
    manager.watch(&src, &dst).await?;

    write_file(&src, "a.txt", b"a")?;
    write_file(&src, "b.txt", b"b")?;
    assert!(wait_for(PATIENCE, || store.len() == 2).await);
    tokio::time::sleep(POLL * 3).await;

    assert_eq!(file_names(&dst)?, vec!["a.txt", "b.txt"]);
    assert!(file_names(&src)?.is_empty());
    assert_eq!(store.len(), 2);
    manager.destroy().await?;
    Ok(())
}

#[tokio::test]
async fn destroy_waits_for_in_flight_moves() -> Result<()> {
    let temp = TempDir::new()?;
    let (src, dst) = (temp.path().join("src1"), temp.path().join("dst1"));
    let store = RecordingStore::with_delay(Duration::from_millis(400));
    let manager = FileManager::new(deps(&WatchRegistry::new(), Arc::new(store.clone()))?).await?;
    manager.watch(&src, &dst).await?;

    write_file(&src, "slow.txt", b"s")?;
    assert!(wait_for(PATIENCE, || dst.join("slow.txt").exists()).await);
    assert!(store.is_empty());

    manager.destroy().await?;
    assert_eq!(store.len(), 1);
    Ok(())
}

#[tokio::test]
async fn independent_managers_do_not_interfere() -> Result<()> {
    let temp = TempDir::new()?;
    let registry = WatchRegistry::new();
    let (src1, dst1) = (temp.path().join("src1"), temp.path().join("dst1"));
    let (src2, dst2) = (temp.path().join("src2"), temp.path().join("dst2"));

    let first = FileManager::new(deps(&registry, Arc::new(RecordingStore::new()))?).await?;
    let second = FileManager::new(deps(&registry, Arc::new(RecordingStore::new()))?).await?;
    first.watch(&src1, &dst1).await?;
    second.watch(&src2, &dst2).await?;
    assert!(matches!(
        second.watch(&src1, &dst2).await,
        Err(FsOpsError::AlreadyWatched { .. })
    ));

    write_file(&src1, "one.txt", b"1")?;
    write_file(&src2, "two.txt", b"2")?;
    assert!(wait_for(PATIENCE, || dst1.join("one.txt").exists()).await);
    assert!(wait_for(PATIENCE, || dst2.join("two.txt").exists()).await);

    first.destroy().await?;
    write_file(&src2, "three.txt", b"3")?;
    assert!(wait_for(PATIENCE, || dst2.join("three.txt").exists()).await);

    let recreated = FileManager::new(deps(&registry, Arc::new(RecordingStore::new()))?).await?;
    recreated.watch(&src1, &dst1).await?;
    write_file(&src1, "four.txt", b"4")?;
    assert!(wait_for(PATIENCE, || dst1.join("four.txt").exists()).await);

    recreated.destroy().await?;
    second.destroy().await?;
    assert!(registry.is_empty());
    Ok(())
}

#[tokio::test]
async fn recreated_path_is_not_reingested_by_default() -> Result<()> {
    let temp = TempDir::new()?;
    let (src, dst) = (temp.path().join("src1"), temp.path().join("dst1"));
    let store = RecordingStore::new();
    let manager = FileManager::new(deps(&WatchRegistry::new(), Arc::new(store.clone()))?).await?;
    manager.watch(&src, &dst).await?;

    write_file(&src, "a.txt", b"first")?;
    assert!(wait_for(PATIENCE, || store.len() == 1).await);

    write_file(&src, "a.txt", b"second")?;
    tokio::time::sleep(POLL * 6).await;
    assert!(src.join("a.txt").exists());
    assert_eq!(fs::read(dst.join("a.txt"))?, b"first");
    assert_eq!(store.len(), 1);
    manager.destroy().await?;
    Ok(())
}

#[tokio::test]
async fn forget_after_move_policy_reingests_recreated_path() -> Result<()> {
    let temp = TempDir::new()?;
    let (src, dst) = (temp.path().join("src1"), temp.path().join("dst1"));
    let store = RecordingStore::new();
    let config = IntakeConfig {
        seen_policy: SeenPolicy::ForgetAfterMove,
        ..fast_config(vec![WatchPair::new(&src, &dst)])
    };
    let manager = FileManager::from_config(
        deps(&WatchRegistry::new(), Arc::new(store.clone()))?,
        &config,
    )
    .await?;

    write_file(&src, "a.txt", b"first")?;
    assert!(wait_for(PATIENCE, || store.len() == 1).await);
    write_file(&src, "a.txt", b"second")?;
    assert!(wait_for(PATIENCE, || store.len() == 2).await);
    assert!(wait_for(PATIENCE, || !src.join("a.txt").exists()).await);
    assert_eq!(fs::read(dst.join("a.txt"))?, b"second");
    manager.destroy().await?;
    Ok(())
}

#[tokio::test]
async fn nothing_moves_after_destroy() -> Result<()> {
    let temp = TempDir::new()?;
    let (src, dst) = (temp.path().join("src1"), temp.path().join("dst1"));
    let store = RecordingStore::new();
    let manager = FileManager::new(deps(&WatchRegistry::new(), Arc::new(store.clone()))?).await?;
    manager.watch(&src, &dst).await?;
    manager.destroy().await?;

    write_file(&src, "late.txt", b"late")?;
    tokio::time::sleep(POLL * 6).await;
    assert!(src.join("late.txt").exists());
    assert!(!dst.join("late.txt").exists());
    assert!(store.is_empty());
    Ok(())
}

#[tokio::test]
async fn record_failure_leaves_moved_file_in_target() -> Result<()> {
    let temp = TempDir::new()?;
    let (src, dst) = (temp.path().join("src1"), temp.path().join("dst1"));
    let store = FailingStore::new();
    let events = EventBus::with_capacity(256);
    let metrics = Metrics::new()?;
    let manager = FileManager::new(
        ManagerDeps::new(
            WatchRegistry::new(),
            Arc::new(store.clone()),
            events.clone(),
            metrics.clone(),
        )
        .with_settings(ManagerSettings {
            poll_interval: POLL,
            ..ManagerSettings::default()
        }),
    )
    .await?;
    manager.watch(&src, &dst).await?;

    write_file(&src, "a.txt", b"a")?;
    assert!(wait_for(PATIENCE, || store.attempts() == 1).await);
    manager.destroy().await?;

    assert!(dst.join("a.txt").exists());
    assert!(!src.join("a.txt").exists());
    assert!(manager.find_one_file("a.txt").await?.is_none());

    let backlog = events.backlog_since(0);
    assert!(backlog.iter().any(|env| matches!(
        env.event,
        Event::RecordFailed { .. }
    )));
    assert!(backlog.iter().any(|env| matches!(
        &env.event,
        Event::HealthChanged { degraded } if degraded == &vec!["metadata_store".to_string()]
    )));
    assert!(backlog.iter().any(|env| matches!(
        env.event,
        Event::FileIngested { record_id: None, .. }
    )));
    assert_eq!(metrics.snapshot().records_failed, 1);
    Ok(())
}

#[tokio::test]
async fn from_config_watches_every_pair() -> Result<()> {
    let temp = TempDir::new()?;
    let registry = WatchRegistry::new();
    let pairs = vec![
        WatchPair::new(temp.path().join("src1"), temp.path().join("dst1")),
        WatchPair::new(temp.path().join("src2"), temp.path().join("dst2")),
    ];
    let manager = FileManager::from_config(
        deps(&registry, Arc::new(RecordingStore::new()))?,
        &fast_config(pairs),
    )
    .await?;

    assert_eq!(manager.watched_dirs().len(), 2);
    assert_eq!(manager.settings().poll_interval, POLL);
    write_file(&temp.path().join("src2"), "b.txt", b"b")?;
    assert!(wait_for(PATIENCE, || temp.path().join("dst2").join("b.txt").exists()).await);
    manager.destroy().await?;
    assert!(registry.is_empty());
    Ok(())
}

#[tokio::test]
async fn failing_pair_unwinds_earlier_registrations() -> Result<()> {
    let temp = TempDir::new()?;
    let registry = WatchRegistry::new();
    let (src1, dst1) = (temp.path().join("src1"), temp.path().join("dst1"));
    let pairs = vec![
        WatchPair::new(&src1, &dst1),
        WatchPair::new(&src1, temp.path().join("dst2")),
    ];

    let result = FileManager::from_config(
        deps(&registry, Arc::new(RecordingStore::new()))?,
        &fast_config(pairs),
    )
    .await;
    assert!(matches!(result, Err(FsOpsError::AlreadyWatched { .. })));
    assert!(registry.is_empty());

    write_file(&src1, "a.txt", b"a")?;
    tokio::time::sleep(POLL * 4).await;
    assert!(src1.join("a.txt").exists());
    Ok(())
}

#[tokio::test]
async fn bad_configuration_documents_fail_construction() -> Result<()> {
    let temp = TempDir::new()?;
    let registry = WatchRegistry::new();
    let documents = [
        "watch:\n  - source: in\n    target: out\n    extra: true\n",
        "poll_interval_ms: 10\n",
        "watch: [source: in",
    ];
    for (index, body) in documents.iter().enumerate() {
        let path = temp.path().join(format!("bad-{index}.yaml"));
        fs::write(&path, body)?;
        let result = FileManager::from_config_path(
            deps(&registry, Arc::new(RecordingStore::new()))?,
            &path,
        )
        .await;
        assert!(
            matches!(result, Err(FsOpsError::Config { .. })),
            "document {index} should be rejected"
        );
    }

    let invalid = IntakeConfig {
        poll_interval_ms: 0,
        ..IntakeConfig::default()
    };
    let result =
        FileManager::from_config(deps(&registry, Arc::new(RecordingStore::new()))?, &invalid).await;
    assert!(matches!(result, Err(FsOpsError::Config { .. })));
    assert!(registry.is_empty());
    Ok(())
}

#[tokio::test]
async fn from_config_path_accepts_yaml_file() -> Result<()> {
    let temp = TempDir::new()?;
    let config_path = temp.path().join("intake.yaml");
    let src = temp.path().join("src1");
    let dst = temp.path().join("dst1");
    let body = format!(
        "watch:\n  - source: {}\n    target: {}\npoll_interval_ms: 50\n",
        src.display(),
        dst.display()
    );
    fs::write(&config_path, &body)?;
    assert_eq!(parse_str(&body)?.watch.len(), 1);

    let manager = FileManager::from_config_path(
        deps(&WatchRegistry::new(), Arc::new(RecordingStore::new()))?,
        &config_path,
    )
    .await?;
    write_file(&src, "c.txt", b"c")?;
    assert!(wait_for(PATIENCE, || dst.join("c.txt").exists()).await);
    manager.destroy().await?;
    Ok(())
}

#[tokio::test]
async fn lifecycle_events_are_published() -> Result<()> {
    let temp = TempDir::new()?;
    let events = EventBus::with_capacity(64);
    let manager = FileManager::new(
        ManagerDeps::new(
            WatchRegistry::new(),
            Arc::new(RecordingStore::new()),
            events.clone(),
            Metrics::new()?,
        )
        .with_settings(ManagerSettings {
            poll_interval: POLL,
            ..ManagerSettings::default()
        }),
    )
    .await?;
    let src = temp.path().join("src1");
    manager.watch(&src, temp.path().join("dst1")).await?;
    write_file(&src, "a.txt", b"a")?;
    assert!(wait_for(PATIENCE, || temp.path().join("dst1").join("a.txt").exists()).await);
    manager.destroy().await?;

    let kinds: Vec<_> = events
        .backlog_for(manager.id())
        .iter()
        .map(|env| env.event.kind())
        .collect();
    assert_eq!(
        kinds,
        vec!["watch_started", "file_queued", "file_ingested", "manager_stopped"]
    );
    Ok(())
}

#[tokio::test]
async fn subscribers_see_ingest_events_live() -> Result<()> {
    let temp = TempDir::new()?;
    let events = EventBus::with_capacity(64);
    let mut stream = events.subscribe(None);
    let manager = FileManager::new(
        ManagerDeps::new(
            WatchRegistry::new(),
            Arc::new(RecordingStore::new()),
            events.clone(),
            Metrics::new()?,
        )
        .with_settings(ManagerSettings {
            poll_interval: POLL,
            ..ManagerSettings::default()
        }),
    )
    .await?;
    let src = temp.path().join("src1");
    manager.watch(&src, temp.path().join("dst1")).await?;
    write_file(&src, "live.txt", b"l")?;

    let ingested = tokio::time::timeout(PATIENCE, async {
        while let Some(item) = stream.next().await {
            if let Ok(envelope) = item
                && let Event::FileIngested { target_path, .. } = envelope.event
            {
                return Some(target_path);
            }
        }
        None
    })
    .await?;
    assert!(ingested.is_some_and(|path| path.ends_with("live.txt")));
    manager.destroy().await?;
    Ok(())
}
