//! The common contract both cache backends implement, plus the query
//! helpers they share.

use crate::detection::DetectionResult;
use crate::errors::CacheError;
use crate::types::{Bounds, SnapshotInfo, SnapshotRecord, StoredElement};
use std::path::{Path, PathBuf};
use sysinfo::{Pid, ProcessesToUpdate, System};

pub mod disk;
pub mod memory;

pub use disk::DiskSnapshotStore;
pub use memory::MemorySnapshotStore;

/// Vertical tolerance used when ordering query results: elements whose
/// frames start within this many units of each other are treated as the
/// same visual row and ordered left-to-right.
const ROW_TOLERANCE: f64 = 10.0;

/// The snapshot cache contract.
///
/// Every operation is async so the two backends present a uniform
/// interface; only the disk backend actually performs blocking work. Both
/// implementations must satisfy the same invariants: version-mismatched
/// records read as absent, screenshot paths are monotonic, cleanup is
/// idempotent, and `get_element` distinguishes an unknown snapshot (error)
/// from an unknown element (None).
#[async_trait::async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Mints a fresh snapshot id and writes an empty record under it.
    async fn create_snapshot(&self) -> Result<String, CacheError>;

    /// Stores a detection result, creating the record if the id is unknown.
    /// Runs the conversion layer to populate the element map and whatever
    /// window/application context the result carries.
    async fn store_detection_result(
        &self,
        id: &str,
        result: &DetectionResult,
    ) -> Result<(), CacheError>;

    /// Attaches a raw capture to a snapshot, along with optional window
    /// context gathered at capture time.
    async fn store_screenshot(
        &self,
        id: &str,
        source_path: &Path,
        application_name: Option<&str>,
        window_title: Option<&str>,
        window_bounds: Option<Bounds>,
    ) -> Result<(), CacheError>;

    /// Attaches an annotated capture to a snapshot.
    async fn store_annotated_screenshot(
        &self,
        id: &str,
        source_path: &Path,
    ) -> Result<(), CacheError>;

    /// Rebuilds the categorized detection result for a snapshot, or None if
    /// the id is unknown. When no detection result was ever stored but an
    /// element map is resident, one is synthesized from it.
    async fn get_detection_result(&self, id: &str)
        -> Result<Option<DetectionResult>, CacheError>;

    /// The most recently created/accessed snapshot inside the validity
    /// window, optionally restricted to a bundle id.
    async fn get_most_recent_snapshot(
        &self,
        bundle_id: Option<&str>,
    ) -> Result<Option<String>, CacheError>;

    /// Summaries of every resident snapshot. Best-effort: backend listing
    /// failures degrade to an empty list.
    async fn list_snapshots(&self) -> Result<Vec<SnapshotInfo>, CacheError>;

    /// Removes one snapshot. Cleaning an unknown id is a no-op.
    async fn clean_snapshot(&self, id: &str) -> Result<(), CacheError>;

    /// Removes snapshots older than the given number of days. Returns the
    /// number removed.
    async fn clean_snapshots_older_than(&self, days: u64) -> Result<usize, CacheError>;

    /// Removes every snapshot. Returns the number removed.
    async fn clean_all_snapshots(&self) -> Result<usize, CacheError>;

    /// Looks up one element by detector id or synthetic `element_N` label.
    /// Unknown snapshot id is an error; unknown element id is None.
    async fn get_element(
        &self,
        id: &str,
        element_id: &str,
    ) -> Result<Option<StoredElement>, CacheError>;

    /// Case-insensitive substring search over title/label/value/role,
    /// ordered top-to-bottom then left-to-right.
    async fn find_elements(
        &self,
        id: &str,
        query: &str,
    ) -> Result<Vec<StoredElement>, CacheError>;

    /// Raw record access for advanced callers.
    async fn get_snapshot(&self, id: &str) -> Result<Option<SnapshotRecord>, CacheError>;

    /// Directory holding a snapshot's artifacts, when the backend has one.
    /// The in-memory backend returns None.
    fn storage_path_for(&self, id: &str) -> Option<PathBuf>;
}

/// Looks an element up by either of its two addressable ids.
pub(crate) fn element_in_record(
    record: &SnapshotRecord,
    element_id: &str,
) -> Option<StoredElement> {
    if let Some(found) = record.elements.get(element_id) {
        return Some(found.clone());
    }
    record
        .elements
        .values()
        .find(|e| e.element_id == element_id)
        .cloned()
}

/// Substring query over a record's elements, reading order applied.
pub(crate) fn query_record(record: &SnapshotRecord, query: &str) -> Vec<StoredElement> {
    let needle = query.to_lowercase();
    let mut matches: Vec<StoredElement> = record
        .elements
        .values()
        .filter(|e| haystack(e).contains(&needle))
        .cloned()
        .collect();
    sort_reading_order(&mut matches);
    matches
}

fn haystack(element: &StoredElement) -> String {
    let mut text = String::new();
    for part in [&element.title, &element.label, &element.value] {
        if let Some(part) = part {
            text.push_str(part);
            text.push(' ');
        }
    }
    text.push_str(&element.role);
    text.to_lowercase()
}

/// Top-to-bottom, then left-to-right. Elements are clustered into rows
/// first: a row opens at an element's y origin and absorbs every element
/// within [`ROW_TOLERANCE`] of it, so the ordering is total and does not
/// depend on input order even when bands overlap in a chain.
pub(crate) fn sort_reading_order(elements: &mut Vec<StoredElement>) {
    elements.sort_by(|a, b| {
        a.frame
            .y
            .partial_cmp(&b.frame.y)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut ordered: Vec<StoredElement> = Vec::with_capacity(elements.len());
    let mut row: Vec<StoredElement> = Vec::new();
    let mut row_anchor_y = f64::NEG_INFINITY;

    for element in elements.drain(..) {
        if !row.is_empty() && element.frame.y - row_anchor_y > ROW_TOLERANCE {
            flush_row(&mut row, &mut ordered);
        }
        if row.is_empty() {
            row_anchor_y = element.frame.y;
        }
        row.push(element);
    }
    flush_row(&mut row, &mut ordered);
    *elements = ordered;
}

fn flush_row(row: &mut Vec<StoredElement>, ordered: &mut Vec<StoredElement>) {
    row.sort_by(|a, b| {
        a.frame
            .x
            .partial_cmp(&b.frame.x)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ordered.append(row);
}

/// Zero-cost liveness probe for a creator pid.
pub(crate) fn is_process_alive(pid: u32) -> bool {
    let target = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[target]), true);
    system.process(target).is_some()
}
