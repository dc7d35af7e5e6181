//! Detection result model: the categorized, typed tree of UI elements as
//! produced by the (external) detector. This crate stores it and hands it
//! back; it never runs detection itself.

use crate::types::{Bounds, WindowContext};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Category assigned to an element by the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ElementType {
    Button,
    TextField,
    Link,
    Image,
    Group,
    Slider,
    Checkbox,
    Menu,
    MenuItem,
    StaticText,
    RadioButton,
    Window,
    Dialog,
    Other,
}

impl ElementType {
    /// Every variant, in declaration order. Used by the conversion tables
    /// and their round-trip tests.
    pub const ALL: [ElementType; 14] = [
        ElementType::Button,
        ElementType::TextField,
        ElementType::Link,
        ElementType::Image,
        ElementType::Group,
        ElementType::Slider,
        ElementType::Checkbox,
        ElementType::Menu,
        ElementType::MenuItem,
        ElementType::StaticText,
        ElementType::RadioButton,
        ElementType::Window,
        ElementType::Dialog,
        ElementType::Other,
    ];

    /// Fixed type-to-role table used when flattening for storage.
    pub fn ax_role(&self) -> &'static str {
        match self {
            ElementType::Button => "AXButton",
            ElementType::TextField => "AXTextField",
            ElementType::Link => "AXLink",
            ElementType::Image => "AXImage",
            ElementType::Group => "AXGroup",
            ElementType::Slider => "AXSlider",
            ElementType::Checkbox => "AXCheckBox",
            ElementType::Menu => "AXMenu",
            ElementType::MenuItem => "AXMenuItem",
            ElementType::StaticText => "AXStaticText",
            ElementType::RadioButton => "AXRadioButton",
            ElementType::Window => "AXWindow",
            ElementType::Dialog => "AXSheet",
            ElementType::Other => "AXUnknown",
        }
    }

    /// Inverse of [`ax_role`](Self::ax_role). Roles with no table entry
    /// collapse to `Other`.
    pub fn from_ax_role(role: &str) -> Self {
        match role {
            "AXButton" => ElementType::Button,
            "AXTextField" => ElementType::TextField,
            "AXLink" => ElementType::Link,
            "AXImage" => ElementType::Image,
            "AXGroup" => ElementType::Group,
            "AXSlider" => ElementType::Slider,
            "AXCheckBox" => ElementType::Checkbox,
            "AXMenu" => ElementType::Menu,
            "AXMenuItem" => ElementType::MenuItem,
            "AXStaticText" => ElementType::StaticText,
            "AXRadioButton" => ElementType::RadioButton,
            "AXWindow" => ElementType::Window,
            "AXSheet" => ElementType::Dialog,
            _ => ElementType::Other,
        }
    }

    /// Whether an enabled element of this type can be targeted by an input
    /// action.
    pub fn is_actionable_kind(&self) -> bool {
        matches!(
            self,
            ElementType::Button
                | ElementType::TextField
                | ElementType::Link
                | ElementType::Checkbox
                | ElementType::Slider
                | ElementType::Menu
                | ElementType::MenuItem
                | ElementType::RadioButton
        )
    }
}

/// One element as reported by the detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedElement {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ElementType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub bounds: Bounds,
    pub is_enabled: bool,
    /// Free-form detector attributes, e.g. `identifier`, `keyboardShortcut`.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, String>,
}

impl DetectedElement {
    pub fn new(id: impl Into<String>, kind: ElementType, bounds: Bounds) -> Self {
        Self {
            id: id.into(),
            kind,
            label: None,
            value: None,
            bounds,
            is_enabled: true,
            attributes: HashMap::new(),
        }
    }
}

/// The categorized detection result consumers iterate over by type.
///
/// Menu items share the `menus` bucket; types without a bucket of their own
/// (static text, radio buttons, windows, dialogs) land in `other`. The
/// element's `kind` is authoritative either way.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResult {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buttons: Vec<DetectedElement>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub text_fields: Vec<DetectedElement>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<DetectedElement>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<DetectedElement>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<DetectedElement>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sliders: Vec<DetectedElement>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub checkboxes: Vec<DetectedElement>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub menus: Vec<DetectedElement>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub other: Vec<DetectedElement>,
    /// Structured window/application context. Primary source; the tagged
    /// warning strings below are a compatibility fallback only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_context: Option<WindowContext>,
    /// Path of the raw capture the detector worked from, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot_path: Option<String>,
    /// Free-text detector warnings. Legacy producers smuggle structured
    /// context through `APP:`/`WINDOW:`/`BOUNDS:`/`WINDOW_ID:`/
    /// `AX_IDENTIFIER:` prefixes; see `convert::LegacyWindowTags`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl DetectionResult {
    /// Places an element into the bucket matching its kind.
    pub fn push(&mut self, element: DetectedElement) {
        match element.kind {
            ElementType::Button => self.buttons.push(element),
            ElementType::TextField => self.text_fields.push(element),
            ElementType::Link => self.links.push(element),
            ElementType::Image => self.images.push(element),
            ElementType::Group => self.groups.push(element),
            ElementType::Slider => self.sliders.push(element),
            ElementType::Checkbox => self.checkboxes.push(element),
            ElementType::Menu | ElementType::MenuItem => self.menus.push(element),
            _ => self.other.push(element),
        }
    }

    /// All elements in fixed bucket order. This order defines the synthetic
    /// `element_N` labels assigned at store time.
    pub fn all_elements(&self) -> impl Iterator<Item = &DetectedElement> {
        self.buttons
            .iter()
            .chain(self.text_fields.iter())
            .chain(self.links.iter())
            .chain(self.images.iter())
            .chain(self.groups.iter())
            .chain(self.sliders.iter())
            .chain(self.checkboxes.iter())
            .chain(self.menus.iter())
            .chain(self.other.iter())
    }

    pub fn element_count(&self) -> usize {
        self.all_elements().count()
    }

    pub fn find_by_id(&self, id: &str) -> Option<&DetectedElement> {
        self.all_elements().find(|e| e.id == id)
    }
}
