mod common;

use bohm_sync::io::document::conform;
use bohm_sync::io::sheet::SheetElement;
use bohm_sync::io::xml::read_project_file;
use bohm_sync::model::{ProjectKey, Schedule};
use bohm_sync::path::FieldPath;
use bohm_sync::reconcile::{SyncEngine, detect_changes};
use bohm_sync::sheets::{FormatRequest, MemorySpreadsheets, SpreadsheetService, ValueRange};
use bohm_sync::store::{MemoryStore, Repository};
use bohm_sync::sync::pull_file;
use common::{GENERAL, document, door, row, schema, seed_project, settings};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

fn key() -> ProjectKey {
    ProjectKey::Code("TA".into())
}

fn pushed() -> (MemoryStore, MemorySpreadsheets, String) {
    let schema = schema();
    let settings = settings();
    let mut store = MemoryStore::new();
    let mut sheets = MemorySpreadsheets::new();
    seed_project(&mut store, &schema);
    SyncEngine::new(&mut store, &mut sheets, &schema, &settings)
        .push(&key(), document(vec![door("G1", "Door-01", "Acme"), door("G2", "Door-02", "Brio")]))
        .expect("push succeeded");
    let id = Repository::new(&mut store)
        .project(&key())
        .expect("project")
        .schedules[0]
        .external_id
        .clone()
        .expect("spreadsheet bound");
    (store, sheets, id)
}

#[test]
fn change_set_is_empty_for_identical_values_and_exact_for_one_edit() {
    let schema = schema();
    let schedule = Schedule::from_schema("Doors", &schema);
    let stored = conform(door("G1", "Door-01", "Acme"), &schema);

    let identical = SheetElement {
        element: stored.clone(),
        missing_sheets: Vec::new(),
    };
    assert!(detect_changes(&stored, &identical, &schedule, &schema).is_empty());

    let mut blanked = identical.clone();
    blanked
        .element
        .core_properties
        .get_mut("Specification")
        .expect("core group")
        .insert("Model".into(), Some("  ".into()));
    assert!(
        detect_changes(&stored, &blanked, &schedule, &schema).is_empty(),
        "blank and absent values are equal"
    );

    let mut edited = identical.clone();
    edited
        .element
        .core_properties
        .get_mut("Specification")
        .expect("core group")
        .insert("Manufacturer".into(), Some("Brio".into()));
    edited
        .element
        .core_properties
        .get_mut("tags")
        .expect("core group")
        .insert("Survey Ref".into(), Some("read-only".into()));
    let changes = detect_changes(&stored, &edited, &schedule, &schema);
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].path, FieldPath::core("Specification", "Manufacturer"));
    assert_eq!(changes[0].new_value.as_deref(), Some("Brio"));
}

#[test]
fn sheets_without_a_row_do_not_blank_stored_values() {
    let schema = schema();
    let schedule = Schedule::from_schema("Doors", &schema);
    let stored = conform(door("G1", "Door-01", "Acme"), &schema);
    let mut from_sheet = stored.clone();
    from_sheet.core_properties["Specification"]["Manufacturer"] = None;

    let changes = detect_changes(
        &stored,
        &SheetElement {
            element: from_sheet,
            missing_sheets: vec!["Specification".into()],
        },
        &schedule,
        &schema,
    );
    assert!(changes.is_empty());
}

#[test]
fn spreadsheet_edits_reach_the_store_and_the_project_file() {
    let schema = schema();
    let settings = settings();
    let (mut store, mut sheets, id) = pushed();
    sheets
        .batch_write_values(
            &id,
            &[
                ValueRange::new("Specification", 1, 3, vec![row(&["Acme Ltd"])]),
                ValueRange::new(GENERAL, 1, 2, vec![row(&["Pr_30 Windows"])]),
            ],
        )
        .expect("collaborator edits");

    let temp_dir = tempdir().expect("temporary directory");
    let data_file = temp_dir.path().join("project.xml");
    let report = pull_file(&mut store, &mut sheets, &schema, &settings, &key(), &data_file)
        .expect("pull succeeded");
    assert_eq!(report.elements_changed, 1);
    assert_eq!(report.fields_changed, 2);

    let repository = Repository::new(&mut store);
    let stored = repository.element("TA", "G1").expect("lookup").expect("stored");
    assert_eq!(stored.classification.code.as_deref(), Some("Pr_30"));
    assert_eq!(stored.classification.full.as_deref(), Some("Pr_30 Windows"));
    assert_eq!(
        stored.core_properties["Specification"]["Manufacturer"].as_deref(),
        Some("Acme Ltd")
    );
    let snapshots = repository.snapshots("TA", "G1").expect("snapshots");
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].triggered_from, "Schedule");
    assert_eq!(snapshots[0].triggered_from_detail, "Schedule: Doors");

    let written = read_project_file(&data_file, &schema).expect("project file written");
    assert_eq!(written.elements.len(), 2);
    let g1 = written
        .elements
        .iter()
        .find(|element| element.guid == "G1")
        .expect("G1 exported");
    assert_eq!(g1.core_properties["Specification"]["Manufacturer"].as_deref(), Some("Acme Ltd"));

    let (again, _) = SyncEngine::new(&mut store, &mut sheets, &schema, &settings)
        .pull(&key())
        .expect("second pull");
    assert_eq!(again.elements_changed, 0);
}

#[test]
fn rows_without_a_stored_element_are_reported_and_skipped() {
    let schema = schema();
    let settings = settings();
    let (mut store, mut sheets, id) = pushed();
    sheets
        .batch_write_values(&id, &[ValueRange::new(GENERAL, 3, 0, vec![row(&["G99", "Ghost"])])])
        .expect("stray row");

    let (report, document) = SyncEngine::new(&mut store, &mut sheets, &schema, &settings)
        .pull(&key())
        .expect("pull succeeded");
    assert_eq!(report.missing, 1);
    assert_eq!(report.elements_changed, 0);
    assert_eq!(document.elements.len(), 2);
    assert!(
        Repository::new(&mut store)
            .element("TA", "G99")
            .expect("lookup")
            .is_none()
    );
}

#[test]
fn element_missing_from_a_property_sheet_keeps_its_values() {
    let schema = schema();
    let settings = settings();
    let (mut store, mut sheets, id) = pushed();
    let metadata = sheets.spreadsheet_metadata(&id).expect("metadata");
    let sheet_id = metadata.sheet_id("Specification").expect("core sheet");
    sheets
        .batch_apply_formatting(
            &id,
            &[FormatRequest::DeleteRows {
                sheet_id,
                start_index: 1,
                end_index: 2,
            }],
        )
        .expect("row removed");

    let (report, _) = SyncEngine::new(&mut store, &mut sheets, &schema, &settings)
        .pull(&key())
        .expect("pull succeeded");
    assert_eq!(report.elements_changed, 0);

    let stored = Repository::new(&mut store)
        .element("TA", "G1")
        .expect("lookup")
        .expect("stored");
    assert_eq!(
        stored.core_properties["Specification"]["Manufacturer"].as_deref(),
        Some("Acme")
    );
}
