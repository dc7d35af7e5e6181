//! Conversion between the categorized detection result tree and the flat
//! element map stored inside a snapshot record.

use crate::detection::{DetectedElement, DetectionResult, ElementType};
use crate::types::{Bounds, SnapshotRecord, StoredElement, WindowContext};
use std::collections::HashMap;
use tracing::{debug, warn};

const ATTR_IDENTIFIER: &str = "identifier";
const ATTR_KEYBOARD_SHORTCUT: &str = "keyboardShortcut";

/// Window context decoded from the legacy warning-string side channel.
///
/// Historical producers had no structured context field and encoded it as
/// prefixed free-text warnings instead. The structured
/// [`WindowContext`] path is primary; this decoder exists only for
/// compatibility with those producers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LegacyWindowTags {
    pub application_name: Option<String>,
    pub window_title: Option<String>,
    pub window_bounds: Option<Bounds>,
    pub window_id: Option<u32>,
    pub window_ax_identifier: Option<String>,
}

impl LegacyWindowTags {
    /// Scans a warning list for `APP:`, `WINDOW:`, `BOUNDS:`, `WINDOW_ID:`
    /// and `AX_IDENTIFIER:` tags. Unknown lines and malformed payloads are
    /// skipped, not errors.
    pub fn decode(warnings: &[String]) -> Self {
        let mut tags = LegacyWindowTags::default();
        for line in warnings {
            if let Some(rest) = line.strip_prefix("APP:") {
                tags.application_name = non_empty(rest);
            } else if let Some(rest) = line.strip_prefix("WINDOW_ID:") {
                match rest.trim().parse::<u32>() {
                    Ok(id) => tags.window_id = Some(id),
                    Err(e) => warn!("Ignoring malformed WINDOW_ID tag '{rest}': {e}"),
                }
            } else if let Some(rest) = line.strip_prefix("WINDOW:") {
                tags.window_title = non_empty(rest);
            } else if let Some(rest) = line.strip_prefix("BOUNDS:") {
                match serde_json::from_str::<Bounds>(rest.trim()) {
                    Ok(bounds) => tags.window_bounds = Some(bounds),
                    Err(e) => warn!("Ignoring malformed BOUNDS tag '{rest}': {e}"),
                }
            } else if let Some(rest) = line.strip_prefix("AX_IDENTIFIER:") {
                tags.window_ax_identifier = non_empty(rest);
            }
        }
        tags
    }

    pub fn is_empty(&self) -> bool {
        *self == LegacyWindowTags::default()
    }
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Flattens a detection result into the stored element map.
///
/// `element_N` labels are assigned in bucket encounter order and are not
/// stable across re-stores. Duplicate detector ids keep the first
/// occurrence so the map invariant holds.
pub fn elements_to_map(result: &DetectionResult) -> HashMap<String, StoredElement> {
    let mut map = HashMap::new();
    for (index, element) in result.all_elements().enumerate() {
        let stored = to_stored(element, index);
        if map.contains_key(&stored.id) {
            warn!(
                id = %stored.id,
                "Duplicate element id in detection result, keeping first occurrence"
            );
            continue;
        }
        map.insert(stored.id.clone(), stored);
    }
    debug!(count = map.len(), "Flattened detection result");
    map
}

fn to_stored(element: &DetectedElement, index: usize) -> StoredElement {
    StoredElement {
        id: element.id.clone(),
        element_id: format!("element_{index}"),
        role: element.kind.ax_role().to_string(),
        title: element.label.clone(),
        label: element.label.clone(),
        value: element.value.clone(),
        identifier: element.attributes.get(ATTR_IDENTIFIER).cloned(),
        frame: element.bounds,
        is_actionable: element.is_enabled && element.kind.is_actionable_kind(),
        keyboard_shortcut: element.attributes.get(ATTR_KEYBOARD_SHORTCUT).cloned(),
    }
}

/// Copies window/application context from a detection result onto a record.
///
/// The structured context wins when present; otherwise the legacy warning
/// tags are decoded. Fields absent from both sources are left untouched so
/// repeated stores never erase context.
pub fn apply_window_context(record: &mut SnapshotRecord, result: &DetectionResult) {
    if let Some(ctx) = &result.window_context {
        merge(&mut record.application_name, ctx.application_name.clone());
        merge(
            &mut record.application_bundle_id,
            ctx.application_bundle_id.clone(),
        );
        merge(
            &mut record.application_process_id,
            ctx.application_pid,
        );
        merge(&mut record.window_title, ctx.window_title.clone());
        merge(&mut record.window_bounds, ctx.window_bounds);
        merge(&mut record.window_id, ctx.window_id);
        merge(
            &mut record.window_ax_identifier,
            ctx.window_ax_identifier.clone(),
        );
        return;
    }

    let tags = LegacyWindowTags::decode(&result.warnings);
    if tags.is_empty() {
        return;
    }
    debug!("Window context recovered from legacy warning tags");
    merge(&mut record.application_name, tags.application_name);
    merge(&mut record.window_title, tags.window_title);
    merge(&mut record.window_bounds, tags.window_bounds);
    merge(&mut record.window_id, tags.window_id);
    merge(&mut record.window_ax_identifier, tags.window_ax_identifier);
}

fn merge<T>(slot: &mut Option<T>, incoming: Option<T>) {
    if incoming.is_some() {
        *slot = incoming;
    }
}

/// Rebuilds a categorized detection result from a stored record.
///
/// This is both the normal read path and the best-effort fallback when a
/// producer only ever stored screenshots plus an element map. Elements come
/// back in `element_N` order; ambiguous roles collapse to `Other`.
pub fn record_to_detection_result(record: &SnapshotRecord) -> DetectionResult {
    let mut stored: Vec<&StoredElement> = record.elements.values().collect();
    stored.sort_by_key(|e| element_index(&e.element_id));

    let mut result = DetectionResult::default();
    for element in stored {
        result.push(to_detected(element));
    }

    result.window_context = window_context_of(record);
    result.screenshot_path = record.screenshot_path.clone();
    result
}

fn window_context_of(record: &SnapshotRecord) -> Option<WindowContext> {
    let ctx = WindowContext {
        application_name: record.application_name.clone(),
        application_bundle_id: record.application_bundle_id.clone(),
        application_pid: record.application_process_id,
        window_title: record.window_title.clone(),
        window_bounds: record.window_bounds,
        window_id: record.window_id,
        window_ax_identifier: record.window_ax_identifier.clone(),
    };
    (ctx != WindowContext::default()).then_some(ctx)
}

fn to_detected(element: &StoredElement) -> DetectedElement {
    let mut attributes = HashMap::new();
    if let Some(identifier) = &element.identifier {
        attributes.insert(ATTR_IDENTIFIER.to_string(), identifier.clone());
    }
    if let Some(shortcut) = &element.keyboard_shortcut {
        attributes.insert(ATTR_KEYBOARD_SHORTCUT.to_string(), shortcut.clone());
    }

    DetectedElement {
        id: element.id.clone(),
        kind: ElementType::from_ax_role(&element.role),
        label: element.label.clone().or_else(|| element.title.clone()),
        value: element.value.clone(),
        bounds: element.frame,
        is_enabled: element.is_actionable
            || !ElementType::from_ax_role(&element.role).is_actionable_kind(),
        attributes,
    }
}

fn element_index(element_id: &str) -> usize {
    element_id
        .strip_prefix("element_")
        .and_then(|n| n.parse().ok())
        .unwrap_or(usize::MAX)
}
