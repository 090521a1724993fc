//! Element ↔ spreadsheet row mapping.
//!
//! Row 0 of every sheet is the header. On core sheets the first three columns
//! are GUID, name and classification, where name and classification are
//! formulas pointing at the element's general sheet row; on custom sheets
//! only the GUID precedes the fields. Data rows start at spreadsheet row 2.

use indexmap::IndexMap;
use tracing::warn;

use crate::bohm::tools::io::document::conform;
use crate::bohm::tools::model::{Element, Schedule, ScheduleSheet, SheetType, non_empty};
use crate::bohm::tools::path::{ClassificationField, FieldPath};
use crate::bohm::tools::schema::Schema;
use crate::bohm::tools::sheets::{Row, column_letter, quote_sheet_name};

/// Leading columns of every core sheet.
pub const CORE_PREFIX_COLUMNS: [&str; 3] = ["Element GUID", "Element Name", "Classification"];

/// Spreadsheet row number of the first data row.
pub const FIRST_DATA_ROW: u32 = 2;

/// Columns that precede the schedule fields on a sheet.
pub fn field_offset(sheet_type: SheetType) -> usize {
    match sheet_type {
        SheetType::General => 0,
        SheetType::Core => CORE_PREFIX_COLUMNS.len(),
        SheetType::Custom => 1,
    }
}

pub fn header_row(sheet: &ScheduleSheet) -> Row {
    let prefix: &[&str] = match sheet.sheet_type {
        SheetType::General => &[],
        SheetType::Core => &CORE_PREFIX_COLUMNS,
        SheetType::Custom => &CORE_PREFIX_COLUMNS[..1],
    };
    prefix
        .iter()
        .map(|column| column.to_string())
        .chain(sheet.fields.iter().map(|field| field.column_name.clone()))
        .collect()
}

/// Column holding the GUID on a sheet.
pub fn guid_column(sheet: &ScheduleSheet) -> usize {
    match sheet.sheet_type {
        SheetType::General => sheet
            .fields
            .iter()
            .position(|field| field.path == FieldPath::Guid)
            .unwrap_or(0),
        SheetType::Core | SheetType::Custom => 0,
    }
}

/// Custom group key a custom sheet exposes.
pub fn sheet_group_key(sheet: &ScheduleSheet) -> Option<&str> {
    sheet.fields.iter().find_map(|field| match &field.path {
        FieldPath::CustomProperty { group, .. } => Some(group.as_str()),
        _ => None,
    })
}

/// Whether `element` has a row on `sheet`.
pub fn sheet_applies(sheet: &ScheduleSheet, element: &Element) -> bool {
    match sheet.sheet_type {
        SheetType::General | SheetType::Core => true,
        SheetType::Custom => sheet_group_key(sheet)
            .is_some_and(|key| element.custom_properties.contains_key(key)),
    }
}

/// Formula targets on the general sheet for core sheet rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneralReferences {
    sheet: String,
    name_column: String,
    classification_column: String,
}

impl GeneralReferences {
    pub fn for_schedule(schedule: &Schedule) -> Self {
        let general = schedule.general_sheet();
        let column_of = |path: &FieldPath, fallback: usize| {
            let index = general
                .and_then(|sheet| sheet.fields.iter().position(|field| &field.path == path))
                .unwrap_or(fallback);
            column_letter(index)
        };
        Self {
            sheet: general
                .map(|sheet| sheet.sheet_name.clone())
                .unwrap_or_default(),
            name_column: column_of(&FieldPath::Name, 1),
            classification_column: column_of(
                &FieldPath::Classification(ClassificationField::Full),
                2,
            ),
        }
    }

    /// `='General'!B{row}` and `='General'!C{row}` for a general sheet row number.
    pub fn formulas(&self, general_row: u32) -> [String; 2] {
        let sheet = quote_sheet_name(&self.sheet);
        [
            format!("={sheet}!{}{general_row}", self.name_column),
            format!("={sheet}!{}{general_row}", self.classification_column),
        ]
    }
}

/// Renders one element as a row of `sheet`.
pub fn compose_row(
    sheet: &ScheduleSheet,
    element: &Element,
    references: &GeneralReferences,
    general_row: u32,
) -> Row {
    let mut row = Row::with_capacity(field_offset(sheet.sheet_type) + sheet.fields.len());
    match sheet.sheet_type {
        SheetType::General => {}
        SheetType::Core => {
            row.push(element.guid.clone());
            row.extend(references.formulas(general_row));
        }
        SheetType::Custom => row.push(element.guid.clone()),
    }
    row.extend(sheet.fields.iter().map(|field| {
        field
            .path
            .get(element)
            .map(str::to_string)
            .unwrap_or_default()
    }));
    row
}

/// Renders the data rows of `sheet` for a full write. General and core rows
/// follow `elements` order so that row `i` of both refers to the same element.
pub fn write_sheet(elements: &[Element], sheet: &ScheduleSheet, schedule: &Schedule) -> Vec<Row> {
    let references = GeneralReferences::for_schedule(schedule);
    elements
        .iter()
        .enumerate()
        .filter(|(_, element)| sheet_applies(sheet, element))
        .map(|(index, element)| {
            compose_row(sheet, element, &references, FIRST_DATA_ROW + index as u32)
        })
        .collect()
}

/// Index into `rows` of the data row for `guid`, by linear scan.
pub fn find_row(rows: &[Row], guid_column: usize, guid: &str) -> Option<usize> {
    rows.iter()
        .enumerate()
        .skip(1)
        .find(|(_, row)| row.get(guid_column).map(|cell| cell.trim()) == Some(guid))
        .map(|(index, _)| index)
}

fn apply_row(element: &mut Element, row: Option<&Row>, sheet: &ScheduleSheet) {
    let offset = field_offset(sheet.sheet_type);
    for (index, field) in sheet.fields.iter().enumerate() {
        if field.path == FieldPath::Guid {
            continue;
        }
        let value = row
            .and_then(|row| row.get(offset + index))
            .and_then(|cell| non_empty(cell));
        field.path.set(element, value);
    }
}

/// Reads each data row of a single sheet into an element holding only the
/// fields that sheet exposes.
pub fn read_sheet(rows: &[Row], sheet: &ScheduleSheet) -> Vec<Element> {
    let guid_column = guid_column(sheet);
    rows.iter()
        .skip(1)
        .enumerate()
        .filter_map(|(position, row)| {
            let Some(guid) = row.get(guid_column).and_then(|cell| non_empty(cell)) else {
                warn!(
                    sheet = %sheet.sheet_name,
                    row = position as u32 + FIRST_DATA_ROW,
                    "row without a guid skipped"
                );
                return None;
            };
            let mut element = Element::new(guid);
            apply_row(&mut element, Some(row), sheet);
            Some(element)
        })
        .collect()
}

/// An element assembled from every sheet of a schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetElement {
    pub element: Element,
    /// Property sheets that had no row for the element; their fields read as empty.
    pub missing_sheets: Vec<String>,
}

/// Assembles schema-complete elements from the raw rows of a schedule's sheets.
///
/// The general sheet defines the element set. Core sheets and the custom sheet
/// selected by the classification group contribute property values; a missing
/// row yields empty values and is recorded in `missing_sheets`.
pub fn read_schedule(
    schedule: &Schedule,
    sheets: &IndexMap<String, Vec<Row>>,
    schema: &Schema,
) -> Vec<SheetElement> {
    let Some(general) = schedule.general_sheet() else {
        warn!(schedule = %schedule.name, "schedule has no general sheet");
        return Vec::new();
    };
    let empty: Vec<Row> = Vec::new();
    let rows_of = |name: &str| sheets.get(name).unwrap_or(&empty);

    read_sheet(rows_of(&general.sheet_name), general)
        .into_iter()
        .map(|mut element| {
            let mut missing_sheets = Vec::new();

            let custom_sheet = schema
                .custom_group_for(&element.classification_group)
                .and_then(|group| {
                    schedule.sheets_of(SheetType::Custom).find(|sheet| {
                        sheet_group_key(sheet) == Some(group.storage_key.as_str())
                            || sheet.sheet_name == group.name
                    })
                });

            for sheet in schedule.sheets_of(SheetType::Core).chain(custom_sheet) {
                let rows = rows_of(&sheet.sheet_name);
                let row =
                    find_row(rows, guid_column(sheet), &element.guid).map(|index| &rows[index]);
                if row.is_none() {
                    missing_sheets.push(sheet.sheet_name.clone());
                }
                apply_row(&mut element, row, sheet);
            }

            SheetElement {
                element: conform(element, schema),
                missing_sheets,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bohm::tools::model::ScheduleField;

    fn custom_sheet() -> ScheduleSheet {
        ScheduleSheet {
            sheet_type: SheetType::Custom,
            sheet_name: "Pr Products".into(),
            fields: vec![ScheduleField::new(
                FieldPath::custom("Pr Products", "Finish"),
                "Finish",
                true,
            )],
        }
    }

    #[test]
    fn custom_rows_only_for_elements_in_the_group() {
        let mut inside = Element::new("G1");
        inside
            .custom_properties
            .entry("Pr Products".into())
            .or_default()
            .insert("Finish".into(), Some("Oak".into()));
        let outside = Element::new("G2");

        let schedule = Schedule::default();
        let rows = write_sheet(&[inside, outside], &custom_sheet(), &schedule);
        assert_eq!(rows, vec![vec!["G1".to_string(), "Oak".to_string()]]);
    }

    #[test]
    fn find_row_skips_the_header() {
        let rows = vec![
            vec!["Element GUID".to_string()],
            vec!["G1".to_string()],
            vec![" G2 ".to_string()],
        ];
        assert_eq!(find_row(&rows, 0, "G2"), Some(2));
        assert_eq!(find_row(&rows, 0, "Element GUID"), None);
    }
}
