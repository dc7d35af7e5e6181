//! Filesystem-backed snapshot store: one directory per snapshot under an
//! injectable root, surviving across process invocations.

use crate::backend::{element_in_record, is_process_alive, query_record, SnapshotStore};
use crate::convert;
use crate::detection::DetectionResult;
use crate::errors::CacheError;
use crate::types::{
    created_at_from_id, mint_snapshot_id, Bounds, CacheConfig, SnapshotInfo, SnapshotRecord,
    StoredElement, SNAPSHOT_VERSION,
};
use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

const RECORD_FILE: &str = "snapshot.json";
const RAW_CAPTURE_FILE: &str = "raw.png";
const ANNOTATED_CAPTURE_FILE: &str = "annotated.png";

/// Durable backend. All record I/O inside one process funnels through a
/// single mutex so two concurrent calls can never interleave partial
/// writes; across processes the atomic write-replace of `snapshot.json`
/// bounds races to last-writer-wins, never a torn file.
pub struct DiskSnapshotStore {
    config: CacheConfig,
    io_lock: Mutex<()>,
}

impl DiskSnapshotStore {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            io_lock: Mutex::new(()),
        }
    }

    pub fn storage_root(&self) -> &Path {
        &self.config.storage_root
    }

    fn snapshot_dir(&self, id: &str) -> PathBuf {
        self.config.storage_root.join(id)
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.snapshot_dir(id).join(RECORD_FILE)
    }

    /// Loads a record, self-healing on the way: a missing file reads as
    /// None, and a file that fails to decode or carries the wrong schema
    /// version is deleted and also reads as None. Callers already treat
    /// "not found" as "re-detect", so corruption degrades to a cache miss.
    async fn load_record(&self, id: &str) -> Option<SnapshotRecord> {
        let path = self.record_path(id);
        let bytes = tokio::fs::read(&path).await.ok()?;

        let record: SnapshotRecord = match serde_json::from_slice(&bytes) {
            Ok(record) => record,
            Err(e) => {
                warn!(id, error = %e, "Discarding undecodable snapshot record");
                let _ = tokio::fs::remove_file(&path).await;
                return None;
            }
        };

        if record.version != SNAPSHOT_VERSION {
            warn!(
                id,
                found = record.version,
                expected = SNAPSHOT_VERSION,
                "Discarding snapshot record with mismatched schema version"
            );
            let _ = tokio::fs::remove_file(&path).await;
            return None;
        }

        Some(record)
    }

    async fn load_or_create(&self, id: &str) -> SnapshotRecord {
        match self.load_record(id).await {
            Some(record) => record,
            None => SnapshotRecord::new(),
        }
    }

    /// Atomic write-replace: serialize to a sibling temp file, then rename
    /// over `snapshot.json`. A crash mid-write leaves the old record (or
    /// nothing) visible, never a partial file.
    async fn write_record(&self, id: &str, record: &SnapshotRecord) -> Result<(), CacheError> {
        let dir = self.snapshot_dir(id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| CacheError::file_io("creating snapshot directory", e))?;

        let bytes = serde_json::to_vec_pretty(record)?;
        let tmp = dir.join(format!("{RECORD_FILE}.tmp"));
        let path = dir.join(RECORD_FILE);

        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| CacheError::file_io("writing snapshot record", e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| CacheError::file_io("replacing snapshot record", e))?;
        Ok(())
    }

    /// Copies a capture artifact into the snapshot's own directory so the
    /// snapshot stays resolvable after the caller's temp files vanish.
    async fn copy_artifact(
        &self,
        id: &str,
        source: &Path,
        file_name: &str,
    ) -> Result<PathBuf, CacheError> {
        if !source.exists() {
            return Err(CacheError::FileIo(format!(
                "screenshot source does not exist: {}",
                source.display()
            )));
        }

        let dir = self.snapshot_dir(id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| CacheError::file_io("creating snapshot directory", e))?;

        let dest = dir.join(file_name);
        if dest.exists() {
            let _ = tokio::fs::remove_file(&dest).await;
        }
        tokio::fs::copy(source, &dest)
            .await
            .map_err(|e| CacheError::file_io("copying capture into snapshot", e))?;
        Ok(dest)
    }

    /// Snapshot ids under the root. Listing failures (including a root that
    /// was never created) read as an empty cache.
    async fn snapshot_ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.config.storage_root).await {
            Ok(entries) => entries,
            Err(_) => return ids,
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            if !is_dir {
                continue;
            }
            if let Ok(name) = entry.file_name().into_string() {
                ids.push(name);
            }
        }
        ids
    }

    async fn directory_size(&self, dir: &Path) -> u64 {
        let mut total = 0u64;
        if let Ok(mut entries) = tokio::fs::read_dir(dir).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                if let Ok(meta) = entry.metadata().await {
                    if meta.is_file() {
                        total += meta.len();
                    }
                }
            }
        }
        total
    }
}

#[async_trait::async_trait]
impl SnapshotStore for DiskSnapshotStore {
    #[instrument(skip(self))]
    async fn create_snapshot(&self) -> Result<String, CacheError> {
        let _guard = self.io_lock.lock().await;
        let id = mint_snapshot_id();
        self.write_record(&id, &SnapshotRecord::new()).await?;
        debug!(id, "Created snapshot");
        Ok(id)
    }

    #[instrument(skip(self, result), fields(elements = result.element_count()))]
    async fn store_detection_result(
        &self,
        id: &str,
        result: &DetectionResult,
    ) -> Result<(), CacheError> {
        let _guard = self.io_lock.lock().await;
        let mut record = self.load_or_create(id).await;

        record.elements = convert::elements_to_map(result);
        convert::apply_window_context(&mut record, result);
        record.merge_screenshot_path(result.screenshot_path.as_deref());
        record.last_update_time = Utc::now();

        self.write_record(id, &record).await
    }

    #[instrument(skip(self, source_path, window_bounds))]
    async fn store_screenshot(
        &self,
        id: &str,
        source_path: &Path,
        application_name: Option<&str>,
        window_title: Option<&str>,
        window_bounds: Option<Bounds>,
    ) -> Result<(), CacheError> {
        let _guard = self.io_lock.lock().await;
        let dest = self.copy_artifact(id, source_path, RAW_CAPTURE_FILE).await?;

        let mut record = self.load_or_create(id).await;
        record.screenshot_path = Some(dest.to_string_lossy().into_owned());
        if application_name.is_some() {
            record.application_name = application_name.map(str::to_string);
        }
        if window_title.is_some() {
            record.window_title = window_title.map(str::to_string);
        }
        if window_bounds.is_some() {
            record.window_bounds = window_bounds;
        }
        record.last_update_time = Utc::now();

        self.write_record(id, &record).await
    }

    #[instrument(skip(self, source_path))]
    async fn store_annotated_screenshot(
        &self,
        id: &str,
        source_path: &Path,
    ) -> Result<(), CacheError> {
        let _guard = self.io_lock.lock().await;
        let dest = self
            .copy_artifact(id, source_path, ANNOTATED_CAPTURE_FILE)
            .await?;

        let mut record = self.load_or_create(id).await;
        record.annotated_path = Some(dest.to_string_lossy().into_owned());
        record.last_update_time = Utc::now();

        self.write_record(id, &record).await
    }

    async fn get_detection_result(
        &self,
        id: &str,
    ) -> Result<Option<DetectionResult>, CacheError> {
        let _guard = self.io_lock.lock().await;
        let record = match self.load_record(id).await {
            Some(record) => record,
            None => return Ok(None),
        };
        // A record that never received elements or a screenshot has nothing
        // to synthesize a result from.
        if record.elements.is_empty() && record.screenshot_path.is_none() {
            return Ok(None);
        }
        Ok(Some(convert::record_to_detection_result(&record)))
    }

    #[instrument(skip(self))]
    async fn get_most_recent_snapshot(
        &self,
        bundle_id: Option<&str>,
    ) -> Result<Option<String>, CacheError> {
        let _guard = self.io_lock.lock().await;
        let now = Utc::now();
        let window = chrono::Duration::from_std(self.config.validity_window)
            .unwrap_or_else(|_| chrono::Duration::seconds(600));

        let mut best: Option<(chrono::DateTime<Utc>, String)> = None;
        for id in self.snapshot_ids().await {
            let created = match created_at_from_id(&id) {
                Some(created) => created,
                None => match self.load_record(&id).await {
                    Some(record) => record.created_at,
                    None => continue,
                },
            };
            if now.signed_duration_since(created) > window {
                continue;
            }
            if let Some(wanted) = bundle_id {
                let matches = self
                    .load_record(&id)
                    .await
                    .and_then(|r| r.application_bundle_id)
                    .map(|b| b == wanted)
                    .unwrap_or(false);
                if !matches {
                    continue;
                }
            }
            if best.as_ref().map(|(t, _)| created > *t).unwrap_or(true) {
                best = Some((created, id));
            }
        }
        Ok(best.map(|(_, id)| id))
    }

    async fn list_snapshots(&self) -> Result<Vec<SnapshotInfo>, CacheError> {
        let _guard = self.io_lock.lock().await;
        let mut infos = Vec::new();
        for id in self.snapshot_ids().await {
            let record = match self.load_record(&id).await {
                Some(record) => record,
                None => continue,
            };
            let dir = self.snapshot_dir(&id);
            let screenshot_count = [RAW_CAPTURE_FILE, ANNOTATED_CAPTURE_FILE]
                .iter()
                .filter(|f| dir.join(f).exists())
                .count();
            infos.push(SnapshotInfo {
                id: id.clone(),
                creator_process_id: record.creator_process_id,
                created_at: record.created_at,
                last_accessed_at: record.last_update_time,
                size_bytes: self.directory_size(&dir).await,
                screenshot_count,
                creator_alive: is_process_alive(record.creator_process_id),
            });
        }
        infos.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(infos)
    }

    #[instrument(skip(self))]
    async fn clean_snapshot(&self, id: &str) -> Result<(), CacheError> {
        let _guard = self.io_lock.lock().await;
        match tokio::fs::remove_dir_all(self.snapshot_dir(id)).await {
            Ok(()) => {
                debug!(id, "Removed snapshot");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::file_io("removing snapshot directory", e)),
        }
    }

    #[instrument(skip(self))]
    async fn clean_snapshots_older_than(&self, days: u64) -> Result<usize, CacheError> {
        let _guard = self.io_lock.lock().await;
        let cutoff = Utc::now() - chrono::Duration::days(days as i64);
        let mut removed = 0;
        for id in self.snapshot_ids().await {
            let created = match created_at_from_id(&id) {
                Some(created) => created,
                None => match self.load_record(&id).await {
                    Some(record) => record.created_at,
                    None => continue,
                },
            };
            if created < cutoff && tokio::fs::remove_dir_all(self.snapshot_dir(&id)).await.is_ok()
            {
                removed += 1;
            }
        }
        debug!(removed, "Pruned snapshots by age");
        Ok(removed)
    }

    #[instrument(skip(self))]
    async fn clean_all_snapshots(&self) -> Result<usize, CacheError> {
        let _guard = self.io_lock.lock().await;
        let mut removed = 0;
        for id in self.snapshot_ids().await {
            if tokio::fs::remove_dir_all(self.snapshot_dir(&id)).await.is_ok() {
                removed += 1;
            }
        }
        debug!(removed, "Cleared snapshot cache");
        Ok(removed)
    }

    async fn get_element(
        &self,
        id: &str,
        element_id: &str,
    ) -> Result<Option<StoredElement>, CacheError> {
        let _guard = self.io_lock.lock().await;
        let record = self
            .load_record(id)
            .await
            .ok_or_else(|| CacheError::SnapshotNotFound(id.to_string()))?;
        Ok(element_in_record(&record, element_id))
    }

    async fn find_elements(
        &self,
        id: &str,
        query: &str,
    ) -> Result<Vec<StoredElement>, CacheError> {
        let _guard = self.io_lock.lock().await;
        let record = self
            .load_record(id)
            .await
            .ok_or_else(|| CacheError::SnapshotNotFound(id.to_string()))?;
        Ok(query_record(&record, query))
    }

    async fn get_snapshot(&self, id: &str) -> Result<Option<SnapshotRecord>, CacheError> {
        let _guard = self.io_lock.lock().await;
        Ok(self.load_record(id).await)
    }

    fn storage_path_for(&self, id: &str) -> Option<PathBuf> {
        Some(self.snapshot_dir(id))
    }
}
