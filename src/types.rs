//! Value types shared by both cache backends.

use chrono::{DateTime, TimeZone, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Schema version written into every persisted record. A record whose
/// version does not match is treated as nonexistent and deleted; there is
/// no migration path.
pub const SNAPSHOT_VERSION: i64 = 3;

/// Default validity window for "most recent snapshot" queries and for
/// in-memory TTL pruning.
pub const DEFAULT_VALIDITY_WINDOW: Duration = Duration::from_secs(600);

/// Default capacity bound of the in-memory backend.
pub const DEFAULT_MAX_SNAPSHOTS: usize = 25;

/// Mints a new snapshot id: `<epoch-millis>-<4-digit-random>`.
///
/// Uniqueness is probabilistic but ids sort chronologically by prefix, so
/// no global counter or lock is needed.
pub fn mint_snapshot_id() -> String {
    let millis = Utc::now().timestamp_millis();
    let suffix: u16 = rand::thread_rng().gen_range(0..10_000);
    format!("{millis}-{suffix:04}")
}

/// Extracts the creation time encoded in a snapshot id prefix.
pub fn created_at_from_id(id: &str) -> Option<DateTime<Utc>> {
    let millis: i64 = id.split('-').next()?.parse().ok()?;
    Utc.timestamp_millis_opt(millis).single()
}

/// An axis-aligned rectangle in screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Bounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Bounds {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Center point, the usual target for click/type actions.
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// Window/application context captured alongside a detection result, used
/// to disambiguate "most recent snapshot for app X".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct WindowContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_bundle_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_pid: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_bounds: Option<Bounds>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_ax_identifier: Option<String>,
}

/// Flat, storage-oriented representation of one detected element inside a
/// snapshot. Interaction services resolve these back to screen coordinates
/// through `frame`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredElement {
    /// Id carried over from the detection result.
    pub id: String,
    /// Synthetic sequential label (`element_0`, `element_1`, ...), assigned
    /// in encounter order. Not stable across re-stores.
    pub element_id: String,
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    pub frame: Bounds,
    pub is_actionable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyboard_shortcut: Option<String>,
}

/// The durable unit of cache state: metadata plus a flat map of addressable
/// elements, versioned for compatibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotRecord {
    pub version: i64,
    pub creator_process_id: u32,
    pub created_at: DateTime<Utc>,
    pub last_update_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotated_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_bundle_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_process_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_bounds: Option<Bounds>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_ax_identifier: Option<String>,
    #[serde(default)]
    pub elements: HashMap<String, StoredElement>,
}

impl SnapshotRecord {
    /// An empty record stamped with the current process and time.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            version: SNAPSHOT_VERSION,
            creator_process_id: std::process::id(),
            created_at: now,
            last_update_time: now,
            screenshot_path: None,
            annotated_path: None,
            application_name: None,
            application_bundle_id: None,
            application_process_id: None,
            window_title: None,
            window_bounds: None,
            window_id: None,
            window_ax_identifier: None,
            elements: HashMap::new(),
        }
    }

    /// Screenshot path is monotonic: an empty incoming path never clears a
    /// previously stored one.
    pub fn merge_screenshot_path(&mut self, incoming: Option<&str>) {
        if let Some(path) = incoming {
            if !path.is_empty() {
                self.screenshot_path = Some(path.to_string());
            }
        }
    }
}

impl Default for SnapshotRecord {
    fn default() -> Self {
        Self::new()
    }
}

/// Summary row returned by `list_snapshots`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotInfo {
    pub id: String,
    pub creator_process_id: u32,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub size_bytes: u64,
    pub screenshot_count: usize,
    pub creator_alive: bool,
}

/// Configuration shared by both backends. The storage root is injectable so
/// the persistent backend is testable without touching the real user
/// directory.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Root directory for the persistent backend; one subdirectory per
    /// snapshot id. Created lazily on first access.
    pub storage_root: PathBuf,
    /// Time span after creation/last access during which a snapshot is
    /// eligible to be "most recent" (and, in memory, to survive pruning).
    pub validity_window: Duration,
    /// Capacity bound of the in-memory backend.
    pub max_snapshots: usize,
    /// In-memory backend only: also delete referenced screenshot files from
    /// disk when an entry is evicted or cleaned.
    pub delete_artifacts_on_cleanup: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let base = dirs::cache_dir().unwrap_or_else(std::env::temp_dir);
        Self {
            storage_root: base.join("snapshot-cache").join("snapshots"),
            validity_window: DEFAULT_VALIDITY_WINDOW,
            max_snapshots: DEFAULT_MAX_SNAPSHOTS,
            delete_artifacts_on_cleanup: false,
        }
    }
}
