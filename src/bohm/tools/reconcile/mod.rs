//! Reconciliation between the authoring tool, the document store and the
//! review spreadsheets.
//!
//! [`SyncEngine::push`] carries a project file into the store and out to every
//! schedule; [`SyncEngine::pull`] carries spreadsheet edits back into the store
//! and returns the project file the authoring tool should re-import.

pub mod diff;
pub mod export;
pub mod merge;
mod pull;
mod push;

pub use diff::{FieldChange, apply_changes, changed_editable_fields, detect_changes, values_equal};
pub use export::{Exporter, ScheduleReport};
pub use merge::{MutableField, Partition, UpdatePolicy, partition};
pub use pull::PullReport;
pub use push::PushReport;

use tracing::warn;

use crate::bohm::tools::error::{Result, ToolError};
use crate::bohm::tools::schema::Schema;
use crate::bohm::tools::settings::SyncSettings;
use crate::bohm::tools::sheets::SpreadsheetService;
use crate::bohm::tools::store::DocumentStore;
use crate::bohm::tools::store::repository::Repository;

/// One sync run's collaborators and configuration.
pub struct SyncEngine<'a, S: DocumentStore + ?Sized, P: SpreadsheetService + ?Sized> {
    store: &'a mut S,
    spreadsheets: &'a mut P,
    schema: &'a Schema,
    settings: &'a SyncSettings,
}

impl<'a, S: DocumentStore + ?Sized, P: SpreadsheetService + ?Sized> SyncEngine<'a, S, P> {
    pub fn new(
        store: &'a mut S,
        spreadsheets: &'a mut P,
        schema: &'a Schema,
        settings: &'a SyncSettings,
    ) -> Self {
        Self {
            store,
            spreadsheets,
            schema,
            settings,
        }
    }

    fn repository(&mut self) -> Repository<'_, S> {
        Repository::new(&mut *self.store)
    }
}

/// Logs and swallows skippable failures of one unit of work.
///
/// Returns `Ok(None)` for a skipped unit and propagates everything else.
fn skip_on_recoverable<T>(result: Result<T>, unit: &str, key: &str) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(error) if error.is_skippable() => {
            warn!(unit, key, %error, "skipping");
            Ok(None)
        }
        Err(error) => Err(error),
    }
}

/// Whether a failure left the run safe to resume by re-running it.
pub fn is_resumable(error: &ToolError) -> bool {
    matches!(error, ToolError::ExternalService { .. } | ToolError::Io(_))
}
