//! Spreadsheet layout derived from a schedule and the schema: sheet order,
//! header rows, protection, dropdown validation and row deletion plans.

use chrono::{DateTime, TimeZone};

use crate::bohm::tools::io::sheet::{field_offset, header_row};
use crate::bohm::tools::model::{Schedule, ScheduleSheet, SheetType};
use crate::bohm::tools::path::{ClassificationField, FieldPath};
use crate::bohm::tools::schema::Schema;
use crate::bohm::tools::sheets::{
    FormatRequest, SpreadsheetMetadata, ValueRange, quote_sheet_name,
};

pub const PROJECT_INFO_SHEET: &str = "Project Information";
pub const CLASSIFICATION_LIST_SHEET: &str = "[Reserved] Classification List";
pub const CLASSIFICATION_GROUP_LIST_SHEET: &str = "[Reserved] Classification Group List";

pub const COLUMN_WIDTH_PIXELS: u16 = 300;

/// `"{project} - {schedule} [YYYY-MM-DD HH:MM:SS]"`.
pub fn spreadsheet_title<Tz: TimeZone>(project: &str, schedule: &str, at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("{project} - {schedule} [{}]", at.format("%Y-%m-%d %H:%M:%S"))
}

/// Sheets of a schedule's spreadsheet: project information, general, core,
/// custom, then the two reserved option lists.
pub fn sheet_names(schedule: &Schedule) -> Vec<String> {
    let mut names = vec![PROJECT_INFO_SHEET.to_string()];
    for sheet_type in [SheetType::General, SheetType::Core, SheetType::Custom] {
        names.extend(
            schedule
                .sheets_of(sheet_type)
                .map(|sheet| sheet.sheet_name.clone()),
        );
    }
    names.push(CLASSIFICATION_LIST_SHEET.to_string());
    names.push(CLASSIFICATION_GROUP_LIST_SHEET.to_string());
    names
}

/// Headers, project information and option lists written into a new spreadsheet.
pub fn initial_values(schedule: &Schedule, schema: &Schema, project_name: &str) -> Vec<ValueRange> {
    let mut values = vec![ValueRange::new(
        PROJECT_INFO_SHEET,
        0,
        0,
        vec![vec!["Project Name".to_string(), project_name.to_string()]],
    )];
    values.extend(
        schedule
            .sheets
            .iter()
            .map(|sheet| ValueRange::new(sheet.sheet_name.as_str(), 0, 0, vec![header_row(sheet)])),
    );
    let column = |labels: Vec<String>| {
        labels
            .into_iter()
            .map(|label| vec![label])
            .collect::<Vec<_>>()
    };
    let classifications = schema.classification_labels();
    if !classifications.is_empty() {
        values.push(ValueRange::new(CLASSIFICATION_LIST_SHEET, 0, 0, column(classifications)));
    }
    let groups = schema.classification_group_labels();
    if !groups.is_empty() {
        values.push(ValueRange::new(CLASSIFICATION_GROUP_LIST_SHEET, 0, 0, column(groups)));
    }
    values
}

fn header_requests(sheet_id: u32) -> [FormatRequest; 3] {
    [
        FormatRequest::FreezeRows { sheet_id, rows: 1 },
        FormatRequest::HeaderStyle { sheet_id },
        FormatRequest::ColumnWidth {
            sheet_id,
            start_column: 0,
            end_column: None,
            pixels: COLUMN_WIDTH_PIXELS,
        },
    ]
}

fn protect(sheet_id: u32, start_column: usize, end_column: usize) -> FormatRequest {
    FormatRequest::ProtectRange {
        sheet_id,
        start_row: 1,
        start_column: start_column as u16,
        end_column: end_column as u16,
    }
}

fn field_column(sheet: &ScheduleSheet, path: &FieldPath) -> Option<usize> {
    sheet.fields.iter().position(|field| &field.path == path)
}

/// Formatting applied once when a schedule's spreadsheet is created.
pub fn layout_requests(
    schedule: &Schedule,
    metadata: &SpreadsheetMetadata,
    schema: &Schema,
) -> Vec<FormatRequest> {
    let mut requests = Vec::new();

    for sheet in &schedule.sheets {
        let Some(sheet_id) = metadata.sheet_id(&sheet.sheet_name) else {
            continue;
        };
        requests.extend(header_requests(sheet_id));

        let offset = field_offset(sheet.sheet_type);
        if offset > 0 {
            requests.push(protect(sheet_id, 0, offset));
        }
        for (index, field) in sheet.fields.iter().enumerate() {
            if !field.editable {
                requests.push(protect(sheet_id, offset + index, offset + index + 1));
            }
        }

        if sheet.sheet_type == SheetType::General {
            let dropdowns = [
                (
                    FieldPath::Classification(ClassificationField::Full),
                    CLASSIFICATION_LIST_SHEET,
                    schema.classification_labels().len(),
                    "Select a classification.",
                ),
                (
                    FieldPath::ClassificationGroup(ClassificationField::Full),
                    CLASSIFICATION_GROUP_LIST_SHEET,
                    schema.classification_group_labels().len(),
                    "Select a classification group.",
                ),
            ];
            for (path, source_sheet, count, message) in dropdowns {
                let Some(column) = field_column(sheet, &path) else {
                    continue;
                };
                if count == 0 {
                    continue;
                }
                requests.push(FormatRequest::ListValidation {
                    sheet_id,
                    start_row: 1,
                    start_column: column as u16,
                    end_column: column as u16 + 1,
                    source: format!("={}!A1:A{count}", quote_sheet_name(source_sheet)),
                    input_message: message.to_string(),
                });
            }
        }
    }

    requests
}

/// One single-row delete per index, highest index first, so earlier deletes
/// never shift rows still to be removed.
pub fn deletion_requests(sheet_id: u32, indices: &[usize]) -> Vec<FormatRequest> {
    descending_unique(indices)
        .into_iter()
        .map(|index| FormatRequest::DeleteRows {
            sheet_id,
            start_index: index as u32,
            end_index: index as u32 + 1,
        })
        .collect()
}

/// Removes the rows at `indices` from `rows` in descending index order.
pub fn delete_rows_descending<T>(rows: &mut Vec<T>, indices: &[usize]) {
    for index in descending_unique(indices) {
        if index < rows.len() {
            rows.remove(index);
        }
    }
}

fn descending_unique(indices: &[usize]) -> Vec<usize> {
    let mut sorted = indices.to_vec();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    sorted.dedup();
    sorted
}
