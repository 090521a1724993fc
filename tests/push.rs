mod common;

use bohm_sync::ToolError;
use bohm_sync::layout::sheet_names;
use bohm_sync::io::xml::ProjectDocument;
use bohm_sync::model::{Project, ProjectKey, Schedule};
use bohm_sync::reconcile::{SyncEngine, UpdatePolicy, is_resumable};
use bohm_sync::settings::SyncSettings;
use bohm_sync::sheets::{MemorySpreadsheets, SpreadsheetService, ValueRange};
use bohm_sync::store::{DocumentStore, Filter, MemoryStore, Repository};
use common::{GENERAL, document, door, row, schema, seed_project, settings};
use pretty_assertions::assert_eq;
use serde_json::Value;

fn key() -> ProjectKey {
    ProjectKey::Code("TA".into())
}

fn spreadsheet_id(store: &mut MemoryStore) -> String {
    Repository::new(store)
        .project(&key())
        .expect("project")
        .schedules[0]
        .external_id
        .clone()
        .expect("spreadsheet bound")
}

fn all_rows(sheets: &MemorySpreadsheets, store: &mut MemoryStore) -> Vec<Vec<Vec<String>>> {
    let project = Repository::new(&mut *store).project(&key()).expect("project");
    let schedule = &project.schedules[0];
    let id = schedule.external_id.as_deref().expect("spreadsheet bound");
    sheet_names(schedule)
        .iter()
        .map(|name| sheets.read_range(id, name).expect("sheet read"))
        .collect()
}

#[test]
fn second_identical_push_writes_nothing() {
    let schema = schema();
    let settings = settings();
    let mut store = MemoryStore::new();
    let mut sheets = MemorySpreadsheets::new();
    seed_project(&mut store, &schema);
    let elements = vec![door("G1", "Door-01", "Acme"), door("G2", "Door-02", "Brio")];

    let first = SyncEngine::new(&mut store, &mut sheets, &schema, &settings)
        .push(&key(), document(elements.clone()))
        .expect("first push");
    assert_eq!(first.inserted, 2);
    assert!(first.schedules[0].created);

    let store_writes = store.write_count();
    let sheet_writes = sheets.write_batches();
    let second = SyncEngine::new(&mut store, &mut sheets, &schema, &settings)
        .push(&key(), document(elements))
        .expect("second push");

    assert_eq!(second.element_writes(), 0);
    assert_eq!(second.unchanged, 2);
    assert!(!second.schedules[0].wrote());
    assert_eq!(store.write_count(), store_writes);
    assert_eq!(sheets.write_batches(), sheet_writes);
}

#[test]
fn updates_snapshot_and_refresh_the_sheet() {
    let schema = schema();
    let settings = settings();
    let mut store = MemoryStore::new();
    let mut sheets = MemorySpreadsheets::new();
    seed_project(&mut store, &schema);

    SyncEngine::new(&mut store, &mut sheets, &schema, &settings)
        .push(&key(), document(vec![door("G1", "Door-01", "Acme")]))
        .expect("first push");
    let report = SyncEngine::new(&mut store, &mut sheets, &schema, &settings)
        .push(&key(), document(vec![door("G1", "Door-01A", "Acme")]))
        .expect("second push");
    assert_eq!(report.updated, 1);

    let repository = Repository::new(&mut store);
    let snapshots = repository.snapshots("TA", "G1").expect("snapshots");
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].triggered_from, "ArchiCAD");
    assert_eq!(snapshots[0].triggered_from_detail, "Element updated.");
    assert_eq!(snapshots[0].element.name.as_deref(), Some("Door-01"));
    let stored = repository.element("TA", "G1").expect("lookup").expect("stored");
    assert_eq!(stored.name.as_deref(), Some("Door-01A"));

    let id = spreadsheet_id(&mut store);
    let general = sheets.read_range(&id, GENERAL).expect("general sheet");
    assert_eq!(general[1][1], "Door-01A");
}

#[test]
fn snapshots_carry_the_configured_origin_label() {
    let schema = schema();
    let mut settings = settings();
    settings.snapshot_labels.authoring_tool = "Revit".into();
    let mut store = MemoryStore::new();
    let mut sheets = MemorySpreadsheets::new();
    seed_project(&mut store, &schema);

    SyncEngine::new(&mut store, &mut sheets, &schema, &settings)
        .push(&key(), document(vec![door("G1", "Door-01", "Acme")]))
        .expect("first push");
    let mut next = document(Vec::new());
    next.deleted_elements.push("G1".into());
    SyncEngine::new(&mut store, &mut sheets, &schema, &settings)
        .push(&key(), next)
        .expect("second push");

    let snapshots = Repository::new(&mut store).snapshots("TA", "G1").expect("snapshots");
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].triggered_from, "Revit");
    assert_eq!(snapshots[0].triggered_from_detail, "Element deleted.");
}

#[test]
fn pending_spreadsheet_edits_survive_a_push() {
    let schema = schema();
    let settings = settings();
    let mut store = MemoryStore::new();
    let mut sheets = MemorySpreadsheets::new();
    seed_project(&mut store, &schema);
    let elements = vec![door("G1", "Door-01", "Acme"), door("G2", "Door-02", "Brio")];

    SyncEngine::new(&mut store, &mut sheets, &schema, &settings)
        .push(&key(), document(elements.clone()))
        .expect("first push");
    let id = spreadsheet_id(&mut store);
    sheets
        .batch_write_values(&id, &[ValueRange::new("Specification", 2, 3, vec![row(&["Edited"])])])
        .expect("collaborator edit");

    let mut renamed = elements;
    renamed[0].name = Some("Door-01A".into());
    SyncEngine::new(&mut store, &mut sheets, &schema, &settings)
        .push(&key(), document(renamed))
        .expect("second push");

    let core = sheets.read_range(&id, "Specification").expect("core sheet");
    assert_eq!(core[2][3], "Edited");
}

#[test]
fn name_only_policy_leaves_properties_alone() {
    let schema = schema();
    let settings = SyncSettings {
        update_fields: UpdatePolicy::name_only(),
        ..settings()
    };
    let mut store = MemoryStore::new();
    let mut sheets = MemorySpreadsheets::new();
    seed_project(&mut store, &schema);

    SyncEngine::new(&mut store, &mut sheets, &schema, &settings)
        .push(&key(), document(vec![door("G1", "Door-01", "Acme")]))
        .expect("first push");
    SyncEngine::new(&mut store, &mut sheets, &schema, &settings)
        .push(&key(), document(vec![door("G1", "Door-01A", "Other")]))
        .expect("second push");

    let stored = Repository::new(&mut store)
        .element("TA", "G1")
        .expect("lookup")
        .expect("stored");
    assert_eq!(stored.name.as_deref(), Some("Door-01A"));
    assert_eq!(
        stored.core_properties["Specification"]["Manufacturer"].as_deref(),
        Some("Acme")
    );
}

#[test]
fn deletions_remove_rows_and_repoint_formulas() {
    let schema = schema();
    let settings = settings();
    let mut store = MemoryStore::new();
    let mut sheets = MemorySpreadsheets::new();
    seed_project(&mut store, &schema);

    SyncEngine::new(&mut store, &mut sheets, &schema, &settings)
        .push(&key(), document(vec![door("G1", "Door-01", "Acme"), door("G2", "Door-02", "Brio")]))
        .expect("first push");

    let mut next = document(vec![door("G2", "Door-02", "Brio")]);
    next.deleted_elements.push("G1".into());
    let report = SyncEngine::new(&mut store, &mut sheets, &schema, &settings)
        .push(&key(), next)
        .expect("second push");
    assert_eq!(report.deleted, 1);
    assert_eq!(
        report.schedules[0].rows_deleted, 4,
        "general, both core sheets and the custom sheet"
    );

    let repository = Repository::new(&mut store);
    assert!(repository.element("TA", "G1").expect("lookup").is_none());
    let snapshots = repository.snapshots("TA", "G1").expect("snapshots");
    assert_eq!(snapshots[0].triggered_from_detail, "Element deleted.");
    let project = repository.project(&key()).expect("project");
    assert_eq!(project.elements, ["G2"]);
    assert_eq!(project.deleted_elements, ["G1"]);

    let id = spreadsheet_id(&mut store);
    let core = sheets.read_range(&id, "Specification").expect("core sheet");
    assert_eq!(
        core[1..],
        [row(&[
            "G2",
            "='Element Name & Classification'!B2",
            "='Element Name & Classification'!C2",
            "Brio",
        ])]
    );
}

#[test]
fn failed_push_resumes_to_the_same_state() {
    let schema = schema();
    let settings = SyncSettings {
        batch_size: 1,
        ..settings()
    };
    let elements = vec![door("G1", "Door-01", "Acme"), door("G2", "Door-02", "Brio")];

    let mut clean_store = MemoryStore::new();
    let mut clean_sheets = MemorySpreadsheets::new();
    seed_project(&mut clean_store, &schema);
    SyncEngine::new(&mut clean_store, &mut clean_sheets, &schema, &settings)
        .push(&key(), document(elements.clone()))
        .expect("clean push");

    let mut store = MemoryStore::new();
    let mut sheets = MemorySpreadsheets::new();
    seed_project(&mut store, &schema);
    sheets.fail_writes_after(Some(3));
    let error = SyncEngine::new(&mut store, &mut sheets, &schema, &settings)
        .push(&key(), document(elements.clone()))
        .expect_err("quota hit mid-export");
    assert!(matches!(error, ToolError::ExternalService { .. }));
    assert!(is_resumable(&error));

    sheets.fail_writes_after(None);
    let resumed = SyncEngine::new(&mut store, &mut sheets, &schema, &settings)
        .push(&key(), document(elements))
        .expect("resumed push");
    assert_eq!(resumed.element_writes(), 0);
    assert!(!resumed.schedules[0].created);

    assert_eq!(all_rows(&sheets, &mut store), all_rows(&clean_sheets, &mut clean_store));
}

#[test]
fn interrupted_update_reaches_the_sheet_on_resume() {
    let schema = schema();
    let settings = settings();
    let mut store = MemoryStore::new();
    let mut sheets = MemorySpreadsheets::new();
    seed_project(&mut store, &schema);

    SyncEngine::new(&mut store, &mut sheets, &schema, &settings)
        .push(&key(), document(vec![door("G1", "Door-01", "Acme")]))
        .expect("first push");

    sheets.fail_writes_after(Some(0));
    let error = SyncEngine::new(&mut store, &mut sheets, &schema, &settings)
        .push(&key(), document(vec![door("G1", "Door-01A", "Acme")]))
        .expect_err("quota hit before the rename reached the sheet");
    assert!(matches!(error, ToolError::ExternalService { .. }));
    sheets.fail_writes_after(None);

    let (early, _) = SyncEngine::new(&mut store, &mut sheets, &schema, &settings)
        .pull(&key())
        .expect("pull before resuming");
    assert_eq!(early.elements_changed, 0, "the stale cell is not an edit");

    let resumed = SyncEngine::new(&mut store, &mut sheets, &schema, &settings)
        .push(&key(), document(vec![door("G1", "Door-01A", "Acme")]))
        .expect("resumed push");
    assert_eq!(resumed.element_writes(), 0);

    let id = spreadsheet_id(&mut store);
    let general = sheets.read_range(&id, GENERAL).expect("general sheet");
    assert_eq!(general[1][1], "Door-01A");
    let project = Repository::new(&mut store).project(&key()).expect("project");
    assert!(project.schedules[0].pending_export.is_empty());

    let (after, _) = SyncEngine::new(&mut store, &mut sheets, &schema, &settings)
        .pull(&key())
        .expect("pull after resuming");
    assert_eq!(after.elements_changed, 0);
    let stored = Repository::new(&mut store)
        .element("TA", "G1")
        .expect("lookup")
        .expect("stored");
    assert_eq!(stored.name.as_deref(), Some("Door-01A"));
}

#[test]
fn shared_guids_stay_within_their_project() {
    let schema = schema();
    let settings = settings();
    let mut store = MemoryStore::new();
    let mut sheets = MemorySpreadsheets::new();
    seed_project(&mut store, &schema);
    let mut tower_b = Project::new("Tower B", "TB");
    tower_b.schedules.push(Schedule::from_schema("Doors", &schema));
    Repository::new(&mut store)
        .insert_project(&tower_b)
        .expect("second project inserted");

    let other_key = ProjectKey::Code("TB".into());
    SyncEngine::new(&mut store, &mut sheets, &schema, &settings)
        .push(
            &other_key,
            ProjectDocument::new(
                "Tower B",
                vec![door("G1", "Door-B1", "Brio"), door("G2", "Door-B2", "Brio")],
            ),
        )
        .expect("push to the other project");

    let first = SyncEngine::new(&mut store, &mut sheets, &schema, &settings)
        .push(&key(), document(vec![door("G1", "Door-01", "Acme"), door("G2", "Door-02", "Acme")]))
        .expect("first push");
    assert_eq!(first.inserted, 2, "GUIDs of another project do not match");

    let mut next = document(vec![door("G1", "Door-01A", "Acme")]);
    next.deleted_elements.push("G2".into());
    let report = SyncEngine::new(&mut store, &mut sheets, &schema, &settings)
        .push(&key(), next)
        .expect("second push");
    assert_eq!((report.updated, report.deleted), (1, 1));

    let repository = Repository::new(&mut store);
    let g1 = repository.element("TB", "G1").expect("lookup").expect("stored");
    assert_eq!(g1.name.as_deref(), Some("Door-B1"));
    assert!(repository.element("TB", "G2").expect("lookup").is_some());
    assert!(repository.snapshots("TB", "G1").expect("snapshots").is_empty());
    assert!(repository.element("TA", "G2").expect("lookup").is_none());
}

/// Store whose element records vanish right before they are replaced, as if
/// another writer removed them mid-run.
struct VanishingElements(MemoryStore);

impl DocumentStore for VanishingElements {
    fn find_one(&self, collection: &str, filter: &Filter) -> bohm_sync::Result<Option<Value>> {
        self.0.find_one(collection, filter)
    }

    fn find_many(&self, collection: &str, filter: &Filter) -> bohm_sync::Result<Vec<Value>> {
        self.0.find_many(collection, filter)
    }

    fn insert_many(&mut self, collection: &str, documents: Vec<Value>) -> bohm_sync::Result<()> {
        self.0.insert_many(collection, documents)
    }

    fn replace_one(
        &mut self,
        collection: &str,
        filter: &Filter,
        document: Value,
    ) -> bohm_sync::Result<bool> {
        if collection == "elements" {
            self.0.delete_one(collection, filter)?;
        }
        self.0.replace_one(collection, filter, document)
    }

    fn update_one(
        &mut self,
        collection: &str,
        filter: &Filter,
        partial: &Value,
    ) -> bohm_sync::Result<bool> {
        self.0.update_one(collection, filter, partial)
    }

    fn update_many(
        &mut self,
        collection: &str,
        filter: &Filter,
        partial: &Value,
    ) -> bohm_sync::Result<usize> {
        self.0.update_many(collection, filter, partial)
    }

    fn delete_one(&mut self, collection: &str, filter: &Filter) -> bohm_sync::Result<bool> {
        self.0.delete_one(collection, filter)
    }

    fn delete_many(&mut self, collection: &str, filter: &Filter) -> bohm_sync::Result<usize> {
        self.0.delete_many(collection, filter)
    }
}

#[test]
fn vanished_element_is_skipped_without_a_snapshot() {
    let schema = schema();
    let settings = settings();
    let mut store = VanishingElements(MemoryStore::new());
    let mut sheets = MemorySpreadsheets::new();
    seed_project(&mut store, &schema);

    SyncEngine::new(&mut store, &mut sheets, &schema, &settings)
        .push(&key(), document(vec![door("G1", "Door-01", "Acme")]))
        .expect("first push");
    let report = SyncEngine::new(&mut store, &mut sheets, &schema, &settings)
        .push(&key(), document(vec![door("G1", "Door-01A", "Acme")]))
        .expect("update failure is skipped");

    assert_eq!((report.updated, report.skipped), (0, 1));
    let snapshots = Repository::new(&mut store).snapshots("TA", "G1").expect("snapshots");
    assert!(snapshots.is_empty());
}

#[test]
fn unknown_project_is_not_found() {
    let schema = schema();
    let settings = settings();
    let mut store = MemoryStore::new();
    let mut sheets = MemorySpreadsheets::new();

    let error = SyncEngine::new(&mut store, &mut sheets, &schema, &settings)
        .push(&ProjectKey::Name("Nowhere".into()), document(Vec::new()))
        .expect_err("no such project");
    assert!(matches!(error, ToolError::NotFound { kind: "project", .. }));
}
