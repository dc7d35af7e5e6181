use crate::convert::{self, LegacyWindowTags};
use crate::detection::{DetectionResult, ElementType};
use crate::tests::{element, sample_result};
use crate::types::{Bounds, SnapshotRecord, WindowContext};

#[test]
fn type_to_role_round_trips_for_every_variant() {
    for kind in ElementType::ALL {
        let role = kind.ax_role();
        assert_eq!(
            ElementType::from_ax_role(role),
            kind,
            "round trip failed for role {role}"
        );
    }
}

#[test]
fn unknown_roles_collapse_to_other() {
    assert_eq!(ElementType::from_ax_role("AXToolbar"), ElementType::Other);
    assert_eq!(ElementType::from_ax_role(""), ElementType::Other);
}

#[test]
fn actionability_requires_enabled_and_actionable_kind() {
    let mut result = DetectionResult::default();
    result.push(element("B1", ElementType::Button, 0.0, 0.0, Some("OK")));
    let mut disabled = element("B2", ElementType::Button, 0.0, 30.0, Some("No"));
    disabled.is_enabled = false;
    result.push(disabled);
    result.push(element("S1", ElementType::StaticText, 0.0, 60.0, Some("hint")));

    let map = convert::elements_to_map(&result);
    assert!(map["B1"].is_actionable);
    assert!(!map["B2"].is_actionable, "disabled button is not actionable");
    assert!(
        !map["S1"].is_actionable,
        "static text is never actionable even when enabled"
    );
}

#[test]
fn element_labels_follow_encounter_order() {
    let result = sample_result();
    let map = convert::elements_to_map(&result);

    // Bucket order: buttons, then text fields, links, and other.
    assert_eq!(map["B1"].element_id, "element_0");
    assert_eq!(map["B2"].element_id, "element_1");
    assert_eq!(map["T1"].element_id, "element_2");
    assert_eq!(map["L1"].element_id, "element_3");
    assert_eq!(map["S1"].element_id, "element_4");
}

#[test]
fn duplicate_ids_keep_first_occurrence() {
    let mut result = DetectionResult::default();
    result.push(element("X", ElementType::Button, 0.0, 0.0, Some("first")));
    result.push(element("X", ElementType::Link, 0.0, 40.0, Some("second")));

    let map = convert::elements_to_map(&result);
    assert_eq!(map.len(), 1);
    assert_eq!(map["X"].role, "AXButton");
}

#[test]
fn record_round_trip_preserves_kinds_and_bounds() {
    let result = sample_result();
    let mut record = SnapshotRecord::new();
    record.elements = convert::elements_to_map(&result);

    let rebuilt = convert::record_to_detection_result(&record);
    assert_eq!(rebuilt.element_count(), result.element_count());
    for original in result.all_elements() {
        let round_tripped = rebuilt
            .find_by_id(&original.id)
            .unwrap_or_else(|| panic!("element {} lost in round trip", original.id));
        assert_eq!(round_tripped.kind, original.kind);
        assert_eq!(round_tripped.bounds, original.bounds);
        assert_eq!(round_tripped.label, original.label);
    }
}

#[test]
fn attributes_survive_round_trip() {
    let mut result = DetectionResult::default();
    let mut el = element("B1", ElementType::Button, 0.0, 0.0, Some("Save"));
    el.attributes
        .insert("identifier".to_string(), "save-button".to_string());
    el.attributes
        .insert("keyboardShortcut".to_string(), "cmd+s".to_string());
    result.push(el);

    let mut record = SnapshotRecord::new();
    record.elements = convert::elements_to_map(&result);
    assert_eq!(record.elements["B1"].identifier.as_deref(), Some("save-button"));
    assert_eq!(
        record.elements["B1"].keyboard_shortcut.as_deref(),
        Some("cmd+s")
    );

    let rebuilt = convert::record_to_detection_result(&record);
    let el = rebuilt.find_by_id("B1").expect("element missing");
    assert_eq!(el.attributes.get("identifier").map(String::as_str), Some("save-button"));
    assert_eq!(
        el.attributes.get("keyboardShortcut").map(String::as_str),
        Some("cmd+s")
    );
}

#[test]
fn structured_context_wins_over_legacy_tags() {
    let mut result = sample_result();
    result.window_context = Some(WindowContext {
        application_name: Some("Safari".to_string()),
        application_bundle_id: Some("com.apple.Safari".to_string()),
        ..WindowContext::default()
    });
    result.warnings = vec!["APP: Finder".to_string()];

    let mut record = SnapshotRecord::new();
    convert::apply_window_context(&mut record, &result);
    assert_eq!(record.application_name.as_deref(), Some("Safari"));
    assert_eq!(
        record.application_bundle_id.as_deref(),
        Some("com.apple.Safari")
    );
}

#[test]
fn legacy_tags_decode_all_known_prefixes() {
    let warnings = vec![
        "APP: Notes".to_string(),
        "WINDOW: Untitled".to_string(),
        r#"BOUNDS: {"x":10.0,"y":20.0,"width":800.0,"height":600.0}"#.to_string(),
        "WINDOW_ID: 42".to_string(),
        "AX_IDENTIFIER: main-window".to_string(),
        "low contrast region detected".to_string(),
    ];
    let tags = LegacyWindowTags::decode(&warnings);
    assert_eq!(tags.application_name.as_deref(), Some("Notes"));
    assert_eq!(tags.window_title.as_deref(), Some("Untitled"));
    assert_eq!(tags.window_bounds, Some(Bounds::new(10.0, 20.0, 800.0, 600.0)));
    assert_eq!(tags.window_id, Some(42));
    assert_eq!(tags.window_ax_identifier.as_deref(), Some("main-window"));
}

#[test]
fn malformed_legacy_payloads_are_skipped() {
    let warnings = vec![
        "BOUNDS: not-json".to_string(),
        "WINDOW_ID: forty-two".to_string(),
        "APP:".to_string(),
    ];
    let tags = LegacyWindowTags::decode(&warnings);
    assert!(tags.is_empty());
}

#[test]
fn legacy_tags_populate_record_when_no_structured_context() {
    let mut result = sample_result();
    result.warnings = vec!["APP: Notes".to_string(), "WINDOW: Untitled".to_string()];

    let mut record = SnapshotRecord::new();
    convert::apply_window_context(&mut record, &result);
    assert_eq!(record.application_name.as_deref(), Some("Notes"));
    assert_eq!(record.window_title.as_deref(), Some("Untitled"));
}
