use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::bohm::tools::path::{ClassificationField, FieldPath, LibraryPartField};
use crate::bohm::tools::schema::{PropertyGroup, Schema};

/// Name of the general sheet in schedules derived from a schema.
pub const GENERAL_SHEET_NAME: &str = "Element Name & Classification";

/// How a run identifies its project in the document store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectKey {
    Name(String),
    Code(String),
}

impl ProjectKey {
    /// Store field the key matches on.
    pub fn field(&self) -> &'static str {
        match self {
            Self::Name(_) => "name",
            Self::Code(_) => "code",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Self::Name(value) | Self::Code(value) => value,
        }
    }
}

impl fmt::Display for ProjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.field(), self.value())
    }
}

/// Project record as held in the document store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub name: String,
    pub code: String,
    /// GUIDs of the elements currently in the project.
    #[serde(default)]
    pub elements: Vec<String>,
    /// GUIDs removed from the project by the authoring tool.
    #[serde(default)]
    pub deleted_elements: Vec<String>,
    #[serde(default)]
    pub schedules: Vec<Schedule>,
}

impl Project {
    pub fn new(name: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
            ..Self::default()
        }
    }
}

/// Binds a spreadsheet to the sheets and fields it exposes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
    /// Spreadsheet id; `None` until the spreadsheet has been created.
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub external_name: Option<String>,
    #[serde(default)]
    pub external_url: Option<String>,
    pub sheets: Vec<ScheduleSheet>,
    /// Fields changed in the store but not yet exported to this schedule's
    /// spreadsheet, by GUID. Cleared once an export of the schedule completes.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub pending_export: IndexMap<String, Vec<FieldPath>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SheetType {
    General,
    Core,
    Custom,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleSheet {
    pub sheet_type: SheetType,
    pub sheet_name: String,
    pub fields: Vec<ScheduleField>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleField {
    pub path: FieldPath,
    pub column_name: String,
    #[serde(default)]
    pub editable: bool,
}

impl ScheduleField {
    pub fn new(path: FieldPath, column_name: impl Into<String>, editable: bool) -> Self {
        Self {
            path,
            column_name: column_name.into(),
            editable,
        }
    }
}

impl Schedule {
    /// Derives a schedule exposing every schema group on its own sheet.
    pub fn from_schema(name: impl Into<String>, schema: &Schema) -> Self {
        let general = ScheduleSheet {
            sheet_type: SheetType::General,
            sheet_name: GENERAL_SHEET_NAME.to_string(),
            fields: vec![
                ScheduleField::new(FieldPath::Guid, "Element GUID", false),
                ScheduleField::new(FieldPath::Name, "Element Name", true),
                ScheduleField::new(
                    FieldPath::Classification(ClassificationField::Full),
                    "Classification",
                    true,
                ),
                ScheduleField::new(
                    FieldPath::ClassificationGroup(ClassificationField::Full),
                    "Classification Group",
                    true,
                ),
                ScheduleField::new(FieldPath::Type, "Element Type", false),
                ScheduleField::new(FieldPath::Variation, "Type Variation", false),
                ScheduleField::new(
                    FieldPath::LibraryPart(LibraryPartField::DocumentName),
                    "Library Part Name",
                    false,
                ),
                ScheduleField::new(
                    FieldPath::LibraryPart(LibraryPartField::Index),
                    "Library Part Index",
                    false,
                ),
                ScheduleField::new(
                    FieldPath::LibraryPart(LibraryPartField::UniqueId),
                    "Library Part GUID",
                    false,
                ),
                ScheduleField::new(FieldPath::ModiStamp, "MOD Stamp", false),
            ],
        };

        let mut sheets = vec![general];
        sheets.extend(
            schema
                .core_groups()
                .map(|group| group_sheet(SheetType::Core, group, |g, p| FieldPath::core(g, p))),
        );
        sheets.extend(
            schema
                .custom_groups()
                .map(|group| group_sheet(SheetType::Custom, group, |g, p| FieldPath::custom(g, p))),
        );

        Self {
            name: name.into(),
            sheets,
            ..Self::default()
        }
    }

    pub fn general_sheet(&self) -> Option<&ScheduleSheet> {
        self.sheets
            .iter()
            .find(|sheet| sheet.sheet_type == SheetType::General)
    }

    pub fn sheets_of(&self, sheet_type: SheetType) -> impl Iterator<Item = &ScheduleSheet> {
        self.sheets
            .iter()
            .filter(move |sheet| sheet.sheet_type == sheet_type)
    }

    pub fn is_bound(&self) -> bool {
        self.external_id.is_some()
    }

    /// Adds `paths` to the fields awaiting export for `guid`. Returns whether
    /// anything new was recorded.
    pub fn record_pending(
        &mut self,
        guid: &str,
        paths: impl IntoIterator<Item = FieldPath>,
    ) -> bool {
        let mut recorded = false;
        for path in paths {
            let pending = self.pending_export.entry(guid.to_string()).or_default();
            if !pending.contains(&path) {
                pending.push(path);
                recorded = true;
            }
        }
        recorded
    }

    /// Whether `path` of `guid` still has to reach the spreadsheet.
    pub fn is_pending(&self, guid: &str, path: &FieldPath) -> bool {
        self.pending_export
            .get(guid)
            .is_some_and(|paths| paths.contains(path))
    }
}

fn group_sheet(
    sheet_type: SheetType,
    group: &PropertyGroup,
    path: fn(String, String) -> FieldPath,
) -> ScheduleSheet {
    ScheduleSheet {
        sheet_type,
        sheet_name: group.name.clone(),
        fields: group
            .properties
            .iter()
            .map(|property| {
                ScheduleField::new(
                    path(group.storage_key.clone(), property.storage_key.clone()),
                    property.column_name.clone(),
                    property.editable,
                )
            })
            .collect(),
    }
}
