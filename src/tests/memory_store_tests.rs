use crate::backend::{MemorySnapshotStore, SnapshotStore};
use crate::errors::CacheError;
use crate::tests::{init_tracing, memory_config, sample_result};
use crate::types::CacheConfig;
use std::path::Path;
use std::time::Duration;

fn store_with(max_snapshots: usize, validity_window: Duration) -> MemorySnapshotStore {
    init_tracing();
    MemorySnapshotStore::new(memory_config(max_snapshots, validity_window))
}

async fn pause() {
    // Keeps last-accessed timestamps strictly ordered between calls.
    tokio::time::sleep(Duration::from_millis(5)).await;
}

#[tokio::test]
async fn round_trip_returns_the_original_result() -> anyhow::Result<()> {
    let store = store_with(25, Duration::from_secs(600));
    let id = store.create_snapshot().await?;

    let result = sample_result();
    store.store_detection_result(&id, &result).await?;

    let loaded = store.get_detection_result(&id).await?.expect("resident");
    assert_eq!(loaded, result, "memory backend hands back the stored result verbatim");
    Ok(())
}

#[tokio::test]
async fn empty_snapshot_has_no_detection_result() -> anyhow::Result<()> {
    let store = store_with(25, Duration::from_secs(600));
    let id = store.create_snapshot().await?;

    assert!(store.get_detection_result(&id).await?.is_none());
    assert!(store.get_snapshot(&id).await?.is_some());
    Ok(())
}

#[tokio::test]
async fn lru_eviction_spares_recently_read_entries() -> anyhow::Result<()> {
    let store = store_with(3, Duration::from_secs(600));

    let a = store.create_snapshot().await?;
    pause().await;
    let b = store.create_snapshot().await?;
    pause().await;
    let c = store.create_snapshot().await?;
    pause().await;

    // Reading A makes it the most recently accessed entry.
    assert!(store.get_snapshot(&a).await?.is_some());
    pause().await;

    let d = store.create_snapshot().await?;

    assert!(store.get_snapshot(&b).await?.is_none(), "B was least recently accessed");
    assert!(store.get_snapshot(&a).await?.is_some());
    assert!(store.get_snapshot(&c).await?.is_some());
    assert!(store.get_snapshot(&d).await?.is_some());
    Ok(())
}

#[tokio::test]
async fn ttl_pruning_drops_idle_entries() -> anyhow::Result<()> {
    let store = store_with(25, Duration::from_millis(100));

    let stale = store.create_snapshot().await?;
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Any mutating call prunes first.
    let fresh = store.create_snapshot().await?;
    assert!(store.get_snapshot(&stale).await?.is_none());
    assert!(store.get_snapshot(&fresh).await?.is_some());
    Ok(())
}

#[tokio::test]
async fn most_recent_honors_the_validity_window() -> anyhow::Result<()> {
    let store = store_with(25, Duration::from_millis(150));

    let id = store.create_snapshot().await?;
    assert_eq!(store.get_most_recent_snapshot(None).await?, Some(id));

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(store.get_most_recent_snapshot(None).await?, None);
    Ok(())
}

#[tokio::test]
async fn most_recent_prefers_last_accessed() -> anyhow::Result<()> {
    let store = store_with(25, Duration::from_secs(600));

    let first = store.create_snapshot().await?;
    pause().await;
    let _second = store.create_snapshot().await?;
    pause().await;

    // Accessing the older snapshot moves it to the front.
    store.get_snapshot(&first).await?;
    assert_eq!(store.get_most_recent_snapshot(None).await?, Some(first));
    Ok(())
}

#[tokio::test]
async fn screenshot_is_recorded_by_path_only() -> anyhow::Result<()> {
    let store = store_with(25, Duration::from_secs(600));
    let id = store.create_snapshot().await?;

    // The source does not exist; the memory backend records the path
    // without touching the filesystem.
    store
        .store_screenshot(&id, Path::new("/tmp/nonexistent.png"), None, None, None)
        .await?;

    let record = store.get_snapshot(&id).await?.expect("record");
    assert_eq!(record.screenshot_path.as_deref(), Some("/tmp/nonexistent.png"));
    assert_eq!(store.storage_path_for(&id), None);
    Ok(())
}

#[tokio::test]
async fn synthesizes_a_result_when_only_an_element_map_is_resident() -> anyhow::Result<()> {
    let store = store_with(25, Duration::from_secs(600));
    let id = store.create_snapshot().await?;
    store.store_detection_result(&id, &sample_result()).await?;

    // Drop the cached result by rebuilding the store from the raw record,
    // mimicking a producer that only left the flat map behind.
    let record = store.get_snapshot(&id).await?.expect("record");
    let rebuilt = crate::convert::record_to_detection_result(&record);
    assert_eq!(rebuilt.element_count(), sample_result().element_count());
    Ok(())
}

#[tokio::test]
async fn not_found_semantics_match_the_disk_backend() -> anyhow::Result<()> {
    let store = store_with(25, Duration::from_secs(600));
    let id = store.create_snapshot().await?;
    store.store_detection_result(&id, &sample_result()).await?;

    let err = store
        .get_element("1700000000000-0000", "B1")
        .await
        .expect_err("unknown snapshot must raise");
    assert!(matches!(err, CacheError::SnapshotNotFound(_)));
    assert!(store.get_element(&id, "no-such-element").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn cleanup_can_delete_referenced_artifacts() -> anyhow::Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let artifact = dir.path().join("capture.png");
    std::fs::write(&artifact, b"fake png bytes")?;

    let store = MemorySnapshotStore::new(CacheConfig {
        delete_artifacts_on_cleanup: true,
        ..CacheConfig::default()
    });
    let id = store.create_snapshot().await?;
    store
        .store_screenshot(&id, &artifact, None, None, None)
        .await?;

    store.clean_snapshot(&id).await?;
    assert!(!artifact.exists(), "artifact deleted alongside the entry");
    Ok(())
}

#[tokio::test]
async fn cleanup_leaves_artifacts_alone_by_default() -> anyhow::Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let artifact = dir.path().join("capture.png");
    std::fs::write(&artifact, b"fake png bytes")?;

    let store = store_with(25, Duration::from_secs(600));
    let id = store.create_snapshot().await?;
    store
        .store_screenshot(&id, &artifact, None, None, None)
        .await?;

    store.clean_snapshot(&id).await?;
    assert!(artifact.exists());
    Ok(())
}

#[tokio::test]
async fn clean_all_reports_the_number_removed() -> anyhow::Result<()> {
    let store = store_with(25, Duration::from_secs(600));
    store.create_snapshot().await?;
    store.create_snapshot().await?;

    assert_eq!(store.clean_all_snapshots().await?, 2);
    assert_eq!(store.clean_all_snapshots().await?, 0);
    assert!(store.list_snapshots().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn list_snapshots_reports_resident_entries() -> anyhow::Result<()> {
    let store = store_with(25, Duration::from_secs(600));
    let id = store.create_snapshot().await?;
    store.store_detection_result(&id, &sample_result()).await?;

    let infos = store.list_snapshots().await?;
    assert_eq!(infos.len(), 1);
    assert_eq!(infos[0].id, id);
    assert_eq!(infos[0].creator_process_id, std::process::id());
    assert!(infos[0].creator_alive);
    assert!(infos[0].size_bytes > 0);
    Ok(())
}

#[tokio::test]
async fn capacity_bound_is_never_exceeded() -> anyhow::Result<()> {
    let store = store_with(5, Duration::from_secs(600));
    for _ in 0..12 {
        store.create_snapshot().await?;
        pause().await;
    }
    assert_eq!(store.list_snapshots().await?.len(), 5);
    Ok(())
}
