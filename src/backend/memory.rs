//! Process-resident snapshot store: bounded, time- and access-ordered,
//! no disk footprint. Suited to a long-lived host process that owns all
//! cache calls; nothing survives the process.

use crate::backend::{element_in_record, is_process_alive, query_record, SnapshotStore};
use crate::convert;
use crate::detection::DetectionResult;
use crate::errors::CacheError;
use crate::types::{
    mint_snapshot_id, Bounds, CacheConfig, SnapshotInfo, SnapshotRecord, StoredElement,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, instrument};

struct MemoryEntry {
    created_at: DateTime<Utc>,
    last_accessed_at: DateTime<Utc>,
    creator_process_id: u32,
    /// Original detection result, kept verbatim so reads skip the reverse
    /// conversion when possible.
    detection_result: Option<DetectionResult>,
    record: SnapshotRecord,
}

impl MemoryEntry {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            last_accessed_at: now,
            creator_process_id: std::process::id(),
            detection_result: None,
            record: SnapshotRecord::new(),
        }
    }

    fn touch(&mut self) {
        self.last_accessed_at = Utc::now();
    }
}

/// Volatile backend. Holds at most `max_snapshots` entries; stale entries
/// are pruned by TTL and overflow is evicted strictly least-recently-read
/// first, so an old-but-recently-read entry survives over a
/// newer-but-unread one.
pub struct MemorySnapshotStore {
    config: CacheConfig,
    entries: Mutex<HashMap<String, MemoryEntry>>,
}

impl MemorySnapshotStore {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, MemoryEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// TTL prune, then LRU eviction down to capacity. Runs on every
    /// mutating call.
    fn housekeep(&self, entries: &mut HashMap<String, MemoryEntry>) {
        let now = Utc::now();
        let window = chrono::Duration::from_std(self.config.validity_window)
            .unwrap_or_else(|_| chrono::Duration::seconds(600));

        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, e)| now.signed_duration_since(e.last_accessed_at) > window)
            .map(|(id, _)| id.clone())
            .collect();
        for id in expired {
            debug!(id, "Pruning expired snapshot");
            self.remove_entry(entries, &id);
        }

        while entries.len() > self.config.max_snapshots {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.last_accessed_at)
                .map(|(id, _)| id.clone());
            match oldest {
                Some(id) => {
                    debug!(id, "Evicting least-recently-accessed snapshot");
                    self.remove_entry(entries, &id);
                }
                None => break,
            }
        }
    }

    fn remove_entry(&self, entries: &mut HashMap<String, MemoryEntry>, id: &str) {
        if let Some(entry) = entries.remove(id) {
            if self.config.delete_artifacts_on_cleanup {
                for path in [&entry.record.screenshot_path, &entry.record.annotated_path]
                    .into_iter()
                    .flatten()
                {
                    let _ = std::fs::remove_file(path);
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl SnapshotStore for MemorySnapshotStore {
    #[instrument(skip(self))]
    async fn create_snapshot(&self) -> Result<String, CacheError> {
        let mut entries = self.lock();
        let id = mint_snapshot_id();
        entries.insert(id.clone(), MemoryEntry::new());
        self.housekeep(&mut entries);
        debug!(id, "Created snapshot");
        Ok(id)
    }

    #[instrument(skip(self, result), fields(elements = result.element_count()))]
    async fn store_detection_result(
        &self,
        id: &str,
        result: &DetectionResult,
    ) -> Result<(), CacheError> {
        let mut entries = self.lock();
        let entry = entries
            .entry(id.to_string())
            .or_insert_with(MemoryEntry::new);

        entry.record.elements = convert::elements_to_map(result);
        convert::apply_window_context(&mut entry.record, result);
        entry
            .record
            .merge_screenshot_path(result.screenshot_path.as_deref());
        entry.record.last_update_time = Utc::now();
        entry.detection_result = Some(result.clone());
        entry.touch();

        self.housekeep(&mut entries);
        Ok(())
    }

    /// Records the path only; the volatile backend never copies files.
    async fn store_screenshot(
        &self,
        id: &str,
        source_path: &Path,
        application_name: Option<&str>,
        window_title: Option<&str>,
        window_bounds: Option<Bounds>,
    ) -> Result<(), CacheError> {
        let mut entries = self.lock();
        let entry = entries
            .entry(id.to_string())
            .or_insert_with(MemoryEntry::new);

        entry.record.screenshot_path = Some(source_path.to_string_lossy().into_owned());
        if application_name.is_some() {
            entry.record.application_name = application_name.map(str::to_string);
        }
        if window_title.is_some() {
            entry.record.window_title = window_title.map(str::to_string);
        }
        if window_bounds.is_some() {
            entry.record.window_bounds = window_bounds;
        }
        entry.record.last_update_time = Utc::now();
        entry.touch();

        self.housekeep(&mut entries);
        Ok(())
    }

    async fn store_annotated_screenshot(
        &self,
        id: &str,
        source_path: &Path,
    ) -> Result<(), CacheError> {
        let mut entries = self.lock();
        let entry = entries
            .entry(id.to_string())
            .or_insert_with(MemoryEntry::new);
        entry.record.annotated_path = Some(source_path.to_string_lossy().into_owned());
        entry.record.last_update_time = Utc::now();
        entry.touch();
        self.housekeep(&mut entries);
        Ok(())
    }

    async fn get_detection_result(
        &self,
        id: &str,
    ) -> Result<Option<DetectionResult>, CacheError> {
        let mut entries = self.lock();
        let entry = match entries.get_mut(id) {
            Some(entry) => entry,
            None => return Ok(None),
        };
        entry.touch();

        if let Some(result) = &entry.detection_result {
            return Ok(Some(result.clone()));
        }
        // Producer only stored screenshots plus an element map; synthesize
        // a result from what is resident.
        if !entry.record.elements.is_empty() || entry.record.screenshot_path.is_some() {
            return Ok(Some(convert::record_to_detection_result(&entry.record)));
        }
        Ok(None)
    }

    #[instrument(skip(self))]
    async fn get_most_recent_snapshot(
        &self,
        bundle_id: Option<&str>,
    ) -> Result<Option<String>, CacheError> {
        let entries = self.lock();
        let now = Utc::now();
        let window = chrono::Duration::from_std(self.config.validity_window)
            .unwrap_or_else(|_| chrono::Duration::seconds(600));

        let best = entries
            .iter()
            .filter(|(_, e)| now.signed_duration_since(e.last_accessed_at) <= window)
            .filter(|(_, e)| match bundle_id {
                Some(wanted) => e
                    .record
                    .application_bundle_id
                    .as_deref()
                    .map(|b| b == wanted)
                    .unwrap_or(false),
                None => true,
            })
            .max_by_key(|(_, e)| e.last_accessed_at)
            .map(|(id, _)| id.clone());
        Ok(best)
    }

    async fn list_snapshots(&self) -> Result<Vec<SnapshotInfo>, CacheError> {
        let entries = self.lock();
        let mut infos: Vec<SnapshotInfo> = entries
            .iter()
            .map(|(id, entry)| {
                let size_bytes = serde_json::to_vec(&entry.record)
                    .map(|b| b.len() as u64)
                    .unwrap_or(0);
                let screenshot_count = [
                    &entry.record.screenshot_path,
                    &entry.record.annotated_path,
                ]
                .iter()
                .filter(|p| p.is_some())
                .count();
                SnapshotInfo {
                    id: id.clone(),
                    creator_process_id: entry.creator_process_id,
                    created_at: entry.created_at,
                    last_accessed_at: entry.last_accessed_at,
                    size_bytes,
                    screenshot_count,
                    creator_alive: is_process_alive(entry.creator_process_id),
                }
            })
            .collect();
        infos.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(infos)
    }

    #[instrument(skip(self))]
    async fn clean_snapshot(&self, id: &str) -> Result<(), CacheError> {
        let mut entries = self.lock();
        self.remove_entry(&mut entries, id);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn clean_snapshots_older_than(&self, days: u64) -> Result<usize, CacheError> {
        let mut entries = self.lock();
        let cutoff = Utc::now() - chrono::Duration::days(days as i64);
        let stale: Vec<String> = entries
            .iter()
            .filter(|(_, e)| e.created_at < cutoff)
            .map(|(id, _)| id.clone())
            .collect();
        let removed = stale.len();
        for id in stale {
            self.remove_entry(&mut entries, &id);
        }
        Ok(removed)
    }

    #[instrument(skip(self))]
    async fn clean_all_snapshots(&self) -> Result<usize, CacheError> {
        let mut entries = self.lock();
        let ids: Vec<String> = entries.keys().cloned().collect();
        let removed = ids.len();
        for id in ids {
            self.remove_entry(&mut entries, &id);
        }
        Ok(removed)
    }

    async fn get_element(
        &self,
        id: &str,
        element_id: &str,
    ) -> Result<Option<StoredElement>, CacheError> {
        let mut entries = self.lock();
        let entry = entries
            .get_mut(id)
            .ok_or_else(|| CacheError::SnapshotNotFound(id.to_string()))?;
        entry.touch();
        Ok(element_in_record(&entry.record, element_id))
    }

    async fn find_elements(
        &self,
        id: &str,
        query: &str,
    ) -> Result<Vec<StoredElement>, CacheError> {
        let mut entries = self.lock();
        let entry = entries
            .get_mut(id)
            .ok_or_else(|| CacheError::SnapshotNotFound(id.to_string()))?;
        entry.touch();
        Ok(query_record(&entry.record, query))
    }

    async fn get_snapshot(&self, id: &str) -> Result<Option<SnapshotRecord>, CacheError> {
        let mut entries = self.lock();
        Ok(entries.get_mut(id).map(|entry| {
            entry.touch();
            entry.record.clone()
        }))
    }

    fn storage_path_for(&self, _id: &str) -> Option<PathBuf> {
        None
    }
}
