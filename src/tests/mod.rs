mod conversion_tests;
mod memory_store_tests;

use crate::detection::{DetectedElement, DetectionResult, ElementType};
use crate::types::{Bounds, CacheConfig};
use std::time::Duration;

// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()))
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .try_init();
}

pub fn element(
    id: &str,
    kind: ElementType,
    x: f64,
    y: f64,
    label: Option<&str>,
) -> DetectedElement {
    let mut el = DetectedElement::new(id, kind, Bounds::new(x, y, 80.0, 24.0));
    el.label = label.map(str::to_string);
    el
}

/// A small mixed-type detection result used across backend tests.
pub fn sample_result() -> DetectionResult {
    let mut result = DetectionResult::default();
    result.push(element("B1", ElementType::Button, 10.0, 10.0, Some("Save")));
    result.push(element("B2", ElementType::Button, 100.0, 10.0, Some("Cancel")));
    result.push(element(
        "T1",
        ElementType::TextField,
        10.0,
        50.0,
        Some("Name"),
    ));
    result.push(element("L1", ElementType::Link, 10.0, 90.0, Some("Help")));
    result.push(element(
        "S1",
        ElementType::StaticText,
        10.0,
        130.0,
        Some("Ready"),
    ));
    result
}

pub fn test_config(root: &std::path::Path) -> CacheConfig {
    CacheConfig {
        storage_root: root.to_path_buf(),
        ..CacheConfig::default()
    }
}

pub fn memory_config(max_snapshots: usize, validity_window: Duration) -> CacheConfig {
    CacheConfig {
        max_snapshots,
        validity_window,
        ..CacheConfig::default()
    }
}
