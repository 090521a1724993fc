use std::path::Path;

use tracing::{info, instrument};

use crate::bohm::tools::error::Result;
use crate::bohm::tools::io::xml::{read_project_file, write_project_file};
use crate::bohm::tools::model::{Project, ProjectKey, Schedule};
use crate::bohm::tools::reconcile::{PullReport, PushReport, SyncEngine};
use crate::bohm::tools::schema::Schema;
use crate::bohm::tools::settings::SyncSettings;
use crate::bohm::tools::sheets::SpreadsheetService;
use crate::bohm::tools::store::DocumentStore;
use crate::bohm::tools::store::repository::Repository;

/// Pushes an authoring-tool project file into the store and the project's spreadsheets.
#[instrument(
    level = "info",
    skip_all,
    fields(project = %key, data_file = %data_file.display())
)]
pub fn push_file<S, P>(
    store: &mut S,
    spreadsheets: &mut P,
    schema: &Schema,
    settings: &SyncSettings,
    key: &ProjectKey,
    data_file: &Path,
) -> Result<PushReport>
where
    S: DocumentStore + ?Sized,
    P: SpreadsheetService + ?Sized,
{
    let document = read_project_file(data_file, schema)?;
    info!(element_count = document.elements.len(), "parsed project file");
    SyncEngine::new(store, spreadsheets, schema, settings).push(key, document)
}

/// Pulls spreadsheet edits into the store and writes the resulting project
/// file for the authoring tool.
#[instrument(
    level = "info",
    skip_all,
    fields(project = %key, data_file = %data_file.display())
)]
pub fn pull_file<S, P>(
    store: &mut S,
    spreadsheets: &mut P,
    schema: &Schema,
    settings: &SyncSettings,
    key: &ProjectKey,
    data_file: &Path,
) -> Result<PullReport>
where
    S: DocumentStore + ?Sized,
    P: SpreadsheetService + ?Sized,
{
    let (report, document) = SyncEngine::new(store, spreadsheets, schema, settings).pull(key)?;
    write_project_file(data_file, &document, schema)?;
    Ok(report)
}

/// Creates a project record with one schedule derived from the schema.
#[instrument(level = "info", skip_all, fields(code = %code))]
pub fn init_project<S: DocumentStore + ?Sized>(
    store: &mut S,
    schema: &Schema,
    name: &str,
    code: &str,
    schedule_name: &str,
) -> Result<Project> {
    let mut project = Project::new(name, code);
    project.schedules.push(Schedule::from_schema(schedule_name, schema));
    Repository::new(store).insert_project(&project)?;
    info!(sheet_count = project.schedules[0].sheets.len(), "project created");
    Ok(project)
}
