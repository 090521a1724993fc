use std::collections::HashMap;

use indexmap::IndexMap;
use tracing::{info, instrument, warn};

use super::diff::{apply_changes, detect_changes};
use super::{SyncEngine, skip_on_recoverable};
use crate::bohm::tools::error::Result;
use crate::bohm::tools::io::document::conform;
use crate::bohm::tools::io::sheet::{SheetElement, read_schedule};
use crate::bohm::tools::io::xml::ProjectDocument;
use crate::bohm::tools::model::{ElementSnapshot, ProjectKey, Schedule, SnapshotOrigin};
use crate::bohm::tools::sheets::{Row, SpreadsheetService};
use crate::bohm::tools::store::DocumentStore;
use crate::bohm::tools::store::repository::Repository;

/// Outcome of a pull run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullReport {
    pub schedules_read: usize,
    pub schedules_skipped: usize,
    pub rows_read: usize,
    pub elements_changed: usize,
    pub fields_changed: usize,
    /// Spreadsheet rows whose GUID has no stored element.
    pub missing: usize,
    pub skipped: usize,
}

impl<S: DocumentStore + ?Sized, P: SpreadsheetService + ?Sized> SyncEngine<'_, S, P> {
    /// Applies spreadsheet edits to the store and returns the project file
    /// holding the store's current state.
    #[instrument(level = "info", skip_all, fields(project = %key))]
    pub fn pull(&mut self, key: &ProjectKey) -> Result<(PullReport, ProjectDocument)> {
        let schema = self.schema;
        let settings = self.settings;
        let mut report = PullReport::default();
        let project = self.repository().project(key)?;
        let code = project.code.clone();

        for schedule in project.schedules.iter().filter(|schedule| schedule.is_bound()) {
            let read = self.read_schedule_rows(schedule);
            let Some(sheet_elements) = skip_on_recoverable(read, "schedule", &schedule.name)? else {
                report.schedules_skipped += 1;
                continue;
            };
            report.schedules_read += 1;
            report.rows_read += sheet_elements.len();

            let guids: Vec<String> = sheet_elements
                .iter()
                .map(|sheet_element| sheet_element.element.guid.clone())
                .collect();
            let mut repository = Repository::new(&mut *self.store);
            let stored: HashMap<String, _> = repository
                .elements_by_guid(&code, &guids)?
                .into_iter()
                .map(|element| (element.guid.clone(), conform(element, schema)))
                .collect();

            for sheet_element in &sheet_elements {
                let guid = &sheet_element.element.guid;
                let Some(current) = stored.get(guid) else {
                    warn!(schedule = %schedule.name, %guid, "row has no stored element, skipped");
                    report.missing += 1;
                    continue;
                };
                let changes = detect_changes(current, sheet_element, schedule, schema);
                if changes.is_empty() {
                    continue;
                }

                let mut updated = current.clone();
                apply_changes(&mut updated, &changes);
                let updated = conform(updated, schema);
                let snapshot = ElementSnapshot::capture(
                    current,
                    settings.snapshot_label(SnapshotOrigin::Schedule),
                    format!("Schedule: {}", schedule.name),
                );
                let written = repository
                    .replace_element(&updated, schema)
                    .and_then(|()| repository.record_snapshots(&[snapshot]));
                match skip_on_recoverable(written, "element", guid)? {
                    Some(()) => {
                        report.elements_changed += 1;
                        report.fields_changed += changes.len();
                    }
                    None => report.skipped += 1,
                }
            }
        }
        info!(
            schedules = report.schedules_read,
            elements_changed = report.elements_changed,
            fields_changed = report.fields_changed,
            missing = report.missing,
            "spreadsheet edits applied"
        );

        let elements = self.repository().project_elements(&code)?;
        let mut document = ProjectDocument::new(project.name.clone(), elements);
        document.deleted_elements = project.deleted_elements.clone();
        Ok((report, document))
    }

    fn read_schedule_rows(&self, schedule: &Schedule) -> Result<Vec<SheetElement>> {
        let Some(spreadsheet_id) = schedule.external_id.as_deref() else {
            return Ok(Vec::new());
        };
        self.spreadsheets.spreadsheet_metadata(spreadsheet_id)?;
        let mut sheets: IndexMap<String, Vec<Row>> = IndexMap::new();
        for sheet in &schedule.sheets {
            let rows = self.spreadsheets.read_range(spreadsheet_id, &sheet.sheet_name)?;
            sheets.insert(sheet.sheet_name.clone(), rows);
        }
        Ok(read_schedule(schedule, &sheets, self.schema))
    }
}
