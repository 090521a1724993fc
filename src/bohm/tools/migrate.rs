//! Versioned data migrations.
//!
//! A migration rewrites stored elements of one project through the same
//! replace-and-snapshot path the sync engine uses. Each migration runs at
//! most once per project; applied ids are recorded in the `migrations`
//! collection.

use tracing::{info, instrument};

use crate::bohm::tools::error::Result;
use crate::bohm::tools::io::document::conform;
use crate::bohm::tools::model::{Element, ElementSnapshot, ProjectKey, SnapshotOrigin};
use crate::bohm::tools::reconcile::diff::changed_editable_fields;
use crate::bohm::tools::schema::Schema;
use crate::bohm::tools::settings::SyncSettings;
use crate::bohm::tools::store::DocumentStore;
use crate::bohm::tools::store::repository::Repository;

/// One idempotent element rewrite.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub id: &'static str,
    pub description: &'static str,
    /// Returns the rewritten element, or `None` when it needs no change.
    pub rewrite: fn(&Element, &SyncSettings) -> Option<Element>,
}

pub const BUILTIN: &[Migration] = &[Migration {
    id: "resolve-empty-classification",
    description: "Assign the default root classification to unclassified elements.",
    rewrite: resolve_empty_classification,
}];

fn resolve_empty_classification(element: &Element, settings: &SyncSettings) -> Option<Element> {
    if element.classification.code.is_some() {
        return None;
    }
    let mut updated = element.clone();
    updated.classification = settings.default_classification.to_classification();
    Some(updated)
}

/// What a migration run did per migration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// `(id, changed element count)` for migrations applied by this run.
    pub applied: Vec<(String, usize)>,
    /// Migrations already recorded for the project.
    pub already_applied: Vec<String>,
}

/// Applies every migration in `migrations` that the project has not seen yet.
#[instrument(level = "info", skip_all, fields(project = %key))]
pub fn run_migrations<S: DocumentStore + ?Sized>(
    store: &mut S,
    schema: &Schema,
    settings: &SyncSettings,
    key: &ProjectKey,
    migrations: &[Migration],
) -> Result<MigrationReport> {
    let mut repository = Repository::new(store);
    let mut project = repository.project(key)?;
    let mut report = MigrationReport::default();
    let mut pending_recorded = false;

    for migration in migrations {
        if repository.migration_applied(&project.code, migration.id)? {
            report.already_applied.push(migration.id.to_string());
            continue;
        }

        let mut changed = 0;
        for element in repository.project_elements(&project.code)? {
            let Some(updated) = (migration.rewrite)(&element, settings) else {
                continue;
            };
            let updated = conform(updated, schema);
            let before = conform(element.clone(), schema);
            if updated == before {
                continue;
            }
            repository.replace_element(&updated, schema)?;
            for schedule in project.schedules.iter_mut().filter(|schedule| schedule.is_bound()) {
                let fields = changed_editable_fields(&before, &updated, schedule);
                pending_recorded |= schedule.record_pending(&updated.guid, fields);
            }
            let snapshot = ElementSnapshot::capture(
                &element,
                settings.snapshot_label(SnapshotOrigin::Migration),
                format!("Migration: {}", migration.id),
            );
            repository.record_snapshots(&[snapshot])?;
            changed += 1;
        }

        repository.record_migration(&project.code, migration.id, changed)?;
        info!(migration = migration.id, changed, "migration applied");
        report.applied.push((migration.id.to_string(), changed));
    }

    if pending_recorded {
        repository.save_project(&project)?;
    }
    Ok(report)
}
