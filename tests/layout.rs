mod common;

use bohm_sync::layout::{
    CLASSIFICATION_GROUP_LIST_SHEET, CLASSIFICATION_LIST_SHEET, PROJECT_INFO_SHEET,
    delete_rows_descending, deletion_requests, initial_values, layout_requests, sheet_names,
};
use bohm_sync::model::Schedule;
use bohm_sync::sheets::{FormatRequest, SheetProperties, SpreadsheetMetadata};
use common::{GENERAL, schema};
use pretty_assertions::assert_eq;

fn metadata(schedule: &Schedule) -> SpreadsheetMetadata {
    SpreadsheetMetadata {
        id: "sheet-1".into(),
        name: "Tower A - Doors".into(),
        url: "memory://sheet-1".into(),
        sheets: sheet_names(schedule)
            .into_iter()
            .enumerate()
            .map(|(id, name)| SheetProperties { id: id as u32, name })
            .collect(),
    }
}

#[test]
fn descending_deletes_match_removing_by_identity() {
    let mut rows: Vec<usize> = (0..10).collect();
    let doomed = [3, 7, 2];
    let expected: Vec<usize> = rows
        .iter()
        .copied()
        .filter(|value| !doomed.contains(value))
        .collect();

    delete_rows_descending(&mut rows, &doomed);
    assert_eq!(rows, expected);
}

#[test]
fn out_of_range_deletes_are_ignored() {
    let mut rows = vec!["a", "b"];
    delete_rows_descending(&mut rows, &[5, 1]);
    assert_eq!(rows, ["a"]);
}

#[test]
fn deletion_requests_cover_one_row_each() {
    assert_eq!(
        deletion_requests(2, &[1, 4]),
        [
            FormatRequest::DeleteRows {
                sheet_id: 2,
                start_index: 4,
                end_index: 5,
            },
            FormatRequest::DeleteRows {
                sheet_id: 2,
                start_index: 1,
                end_index: 2,
            },
        ]
    );
}

#[test]
fn sheets_are_ordered_by_kind_with_reserved_lists_last() {
    let schedule = Schedule::from_schema("Doors", &schema());
    assert_eq!(
        sheet_names(&schedule),
        [
            PROJECT_INFO_SHEET,
            GENERAL,
            "Specification",
            "Tags \"Site\"",
            "Pr Products",
            "Ss Systems",
            CLASSIFICATION_LIST_SHEET,
            CLASSIFICATION_GROUP_LIST_SHEET,
        ]
    );
}

#[test]
fn initial_values_fill_project_information_and_option_lists() {
    let schema = schema();
    let schedule = Schedule::from_schema("Doors", &schema);
    let values = initial_values(&schedule, &schema, "Tower A");

    assert_eq!(values[0].sheet_name, PROJECT_INFO_SHEET);
    assert_eq!(values[0].values, [["Project Name", "Tower A"]]);
    let classifications = values
        .iter()
        .find(|range| range.sheet_name == CLASSIFICATION_LIST_SHEET)
        .expect("classification list");
    assert_eq!(classifications.values, [["Pr_20 Doors"], ["Pr_30 Windows"]]);
}

#[test]
fn layout_protects_read_only_columns_and_binds_dropdowns() {
    let schema = schema();
    let schedule = Schedule::from_schema("Doors", &schema);
    let metadata = metadata(&schedule);
    let requests = layout_requests(&schedule, &metadata, &schema);

    let general_id = metadata.sheet_id(GENERAL).expect("general sheet");
    let validations: Vec<&String> = requests
        .iter()
        .filter_map(|request| match request {
            FormatRequest::ListValidation { sheet_id, source, .. } if *sheet_id == general_id => {
                Some(source)
            }
            _ => None,
        })
        .collect();
    assert_eq!(
        validations,
        [
            "='[Reserved] Classification List'!A1:A2",
            "='[Reserved] Classification Group List'!A1:A2",
        ]
    );

    let tags_id = metadata.sheet_id("Tags \"Site\"").expect("tags sheet");
    assert!(requests.contains(&FormatRequest::ProtectRange {
        sheet_id: tags_id,
        start_row: 1,
        start_column: 0,
        end_column: 3,
    }));
    assert!(requests.contains(&FormatRequest::ProtectRange {
        sheet_id: tags_id,
        start_row: 1,
        start_column: 4,
        end_column: 5,
    }));
    assert!(requests.contains(&FormatRequest::FreezeRows {
        sheet_id: tags_id,
        rows: 1,
    }));
}
