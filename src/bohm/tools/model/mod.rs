use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

mod project;
mod snapshot;

pub use project::{Project, ProjectKey, Schedule, ScheduleField, ScheduleSheet, SheetType};
pub use snapshot::{ElementSnapshot, SnapshotLabels, SnapshotOrigin};

/// Property name → optional value, in schema declaration order.
pub type PropertyValues = IndexMap<String, Option<String>>;

/// Property group name → property values.
pub type PropertyGroups = IndexMap<String, PropertyValues>;

/// A `{code, name, full}` classification as carried by elements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    /// Taxonomy code, e.g. `Pr_20`.
    pub code: Option<String>,
    /// Human readable name, e.g. `Doors`.
    pub name: Option<String>,
    /// `"{code} {name}"`. Always derived from the other two fields.
    pub full: Option<String>,
}

impl Classification {
    pub fn new(code: Option<String>, name: Option<String>) -> Self {
        let mut classification = Self {
            code,
            name,
            full: None,
        };
        classification.refresh_full();
        classification
    }

    /// Splits a `"{code} {name}"` string on its first space.
    pub fn from_full(full: &str) -> Self {
        let full = full.trim();
        let (code, name) = match full.split_once(' ') {
            Some((code, name)) => (code, name.trim()),
            None => (full, ""),
        };
        Self::new(non_empty(code), non_empty(name))
    }

    /// Recomputes `full` from `code` and `name`.
    pub fn refresh_full(&mut self) {
        self.full = compose_full(self.code.as_deref(), self.name.as_deref());
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_none() && self.name.is_none()
    }
}

/// Joins the non-empty parts of a classification with a single space.
pub fn compose_full(code: Option<&str>, name: Option<&str>) -> Option<String> {
    let parts: Vec<&str> = [code, name]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}

/// Trims a value and maps the empty string to `None`.
pub fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Authoring-tool template an element instantiates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryPart {
    pub index: Option<String>,
    pub document_name: Option<String>,
    pub unique_id: Option<String>,
}

/// The canonical representation of one building element.
///
/// The serialised form doubles as the document store record, so field names
/// follow the store's camelCase convention.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Element {
    /// Identifier assigned by the authoring tool.
    pub guid: String,
    /// Project the element belongs to. GUIDs are only unique within it.
    #[serde(default)]
    pub project_code: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type", default)]
    pub element_type: Option<String>,
    #[serde(default)]
    pub variation: Option<String>,
    /// Modification stamp reported by the authoring tool.
    #[serde(default)]
    pub modi_stamp: Option<String>,
    #[serde(default)]
    pub classification: Classification,
    #[serde(default)]
    pub classification_group: Classification,
    #[serde(default)]
    pub library_part: LibraryPart,
    /// Core group storage key → property storage key → value.
    #[serde(default)]
    pub core_properties: PropertyGroups,
    /// At most one custom group, selected by the classification group.
    #[serde(default)]
    pub custom_properties: PropertyGroups,
}

impl Element {
    pub fn new(guid: impl Into<String>) -> Self {
        Self {
            guid: guid.into(),
            ..Self::default()
        }
    }

    pub fn with_project_code(mut self, code: impl Into<String>) -> Self {
        self.project_code = Some(code.into());
        self
    }

    /// Recomputes both derived `full` names.
    pub fn refresh_derived(&mut self) {
        self.classification.refresh_full();
        self.classification_group.refresh_full();
    }
}

/// Record of the classification taxonomy held in the document store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationRecord {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub parent_code: Option<String>,
    #[serde(default)]
    pub group_code: Option<String>,
}

impl ClassificationRecord {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        let code = code.into();
        Self {
            parent_code: parent_code(&code),
            group_code: group_code(&code),
            code,
            name: name.into(),
        }
    }

    pub fn to_classification(&self) -> Classification {
        Classification::new(non_empty(&self.code), non_empty(&self.name))
    }
}

/// First three `_`-separated segments of a code, when the code is deeper.
pub fn parent_code(code: &str) -> Option<String> {
    code_prefix(code, 3)
}

/// First two `_`-separated segments of a code, when the code is deeper.
pub fn group_code(code: &str) -> Option<String> {
    code_prefix(code, 2)
}

fn code_prefix(code: &str, depth: usize) -> Option<String> {
    let segments: Vec<&str> = code.split('_').collect();
    if segments.len() <= depth {
        return None;
    }
    Some(segments[..depth].join("_"))
}
