use std::collections::HashSet;

use tracing::{info, instrument, warn};

use super::diff::changed_editable_fields;
use super::export::{Exporter, ScheduleReport};
use super::merge::partition;
use super::{SyncEngine, skip_on_recoverable};
use crate::bohm::tools::error::Result;
use crate::bohm::tools::io::document::{conform, resolve_classification};
use crate::bohm::tools::io::xml::ProjectDocument;
use crate::bohm::tools::model::{
    Classification, ClassificationRecord, Element, ElementSnapshot, Project, ProjectKey,
    SnapshotOrigin,
};
use crate::bohm::tools::sheets::SpreadsheetService;
use crate::bohm::tools::store::DocumentStore;
use crate::bohm::tools::store::repository::Repository;

/// Outcome of a push run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushReport {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub deleted: usize,
    pub skipped: usize,
    pub schedules: Vec<ScheduleReport>,
}

impl PushReport {
    /// Number of store writes the run made for elements.
    pub fn element_writes(&self) -> usize {
        self.inserted + self.updated + self.deleted
    }
}

impl<S: DocumentStore + ?Sized, P: SpreadsheetService + ?Sized> SyncEngine<'_, S, P> {
    /// Applies a project file to the store, then refreshes every schedule.
    #[instrument(level = "info", skip_all, fields(project = %key))]
    pub fn push(&mut self, key: &ProjectKey, document: ProjectDocument) -> Result<PushReport> {
        let schema = self.schema;
        let settings = self.settings;
        let root = &settings.default_classification;
        let mut report = PushReport::default();
        let mut repository = Repository::new(&mut *self.store);

        let mut project = repository.project(key)?;
        if document.name != project.name {
            warn!(
                file = %document.name,
                store = %project.name,
                "project file names a different project"
            );
        }
        let code = project.code.clone();
        let existing = repository.project_elements(&code)?;
        let known = repository.classifications()?;
        info!(
            incoming = document.elements.len(),
            stored = existing.len(),
            deleted = document.deleted_elements.len(),
            "reconciling project file"
        );

        let ProjectDocument {
            elements,
            deleted_elements,
            element_type_groups,
            ..
        } = document;
        let hint = |guid: &str| element_type_groups.get(guid).map(String::as_str);
        let incoming: Vec<Element> = elements
            .into_iter()
            .map(|mut element| {
                element.project_code = Some(code.clone());
                conform(element, schema)
            })
            .collect();
        let split = partition(incoming, &existing);
        let mut updated: Vec<(Element, Element)> = Vec::new();

        for (stored, mut incoming) in split.to_update {
            let stored = conform(stored, schema);
            let refined = refined_classification(&incoming, hint(&incoming.guid), &known, root);
            if refined == stored.classification {
                incoming.classification = refined;
            }
            let merged = conform(settings.update_fields.merge(&stored, &incoming), schema);
            if merged == stored {
                report.unchanged += 1;
                continue;
            }
            let snapshot = ElementSnapshot::capture(
                &stored,
                settings.snapshot_label(SnapshotOrigin::AuthoringTool),
                "Element updated.",
            );
            let written = repository
                .replace_element(&merged, schema)
                .and_then(|()| repository.record_snapshots(&[snapshot]));
            match skip_on_recoverable(written, "element", &merged.guid)? {
                Some(()) => {
                    report.updated += 1;
                    updated.push((stored, merged));
                }
                None => report.skipped += 1,
            }
        }

        let to_insert: Vec<Element> = split
            .to_insert
            .into_iter()
            .map(|mut element| {
                element.classification =
                    refined_classification(&element, hint(&element.guid), &known, root);
                conform(element, schema)
            })
            .collect();
        if !to_insert.is_empty() {
            repository.insert_elements(&to_insert, schema)?;
            report.inserted = to_insert.len();
        }

        let doomed: Vec<&Element> = existing
            .iter()
            .filter(|element| deleted_elements.contains(&element.guid))
            .collect();
        if !doomed.is_empty() {
            let snapshots: Vec<ElementSnapshot> = doomed
                .iter()
                .map(|element| {
                    ElementSnapshot::capture(
                        element,
                        settings.snapshot_label(SnapshotOrigin::AuthoringTool),
                        "Element deleted.",
                    )
                })
                .collect();
            repository.record_snapshots(&snapshots)?;
            let guids: Vec<String> = doomed.iter().map(|element| element.guid.clone()).collect();
            report.deleted = repository.delete_elements(&code, &guids)?;
        }
        info!(
            inserted = report.inserted,
            updated = report.updated,
            unchanged = report.unchanged,
            deleted = report.deleted,
            "store reconciled"
        );

        let membership_changed =
            track_membership(&mut project, &existing, &to_insert, &deleted_elements);
        let mut pending_recorded = false;
        for schedule in project.schedules.iter_mut().filter(|schedule| schedule.is_bound()) {
            for (before, after) in &updated {
                let fields = changed_editable_fields(before, after, schedule);
                pending_recorded |= schedule.record_pending(&after.guid, fields);
            }
        }
        if membership_changed || pending_recorded {
            repository.save_project(&project)?;
        }

        let current = repository.project_elements(&code)?;
        let mut exporter = Exporter::new(&mut *self.spreadsheets, schema, settings);
        for index in 0..project.schedules.len() {
            let mut schedule_report = ScheduleReport::new(&project.schedules[index].name);
            let created = !project.schedules[index].is_bound();
            if created {
                exporter.create_spreadsheet(&project.name, &mut project.schedules[index])?;
                repository.save_project(&project)?;
                schedule_report.created = true;
            }

            let schedule = &project.schedules[index];
            let exported = if created || settings.full_resync {
                exporter.write_full(schedule, &current, &mut schedule_report)
            } else {
                exporter.write_incremental(schedule, &current, &mut schedule_report)
            };
            if skip_on_recoverable(exported, "schedule", &schedule.name)?.is_none() {
                continue;
            }
            report.schedules.push(schedule_report);
            let schedule = &mut project.schedules[index];
            if !schedule.pending_export.is_empty() {
                schedule.pending_export.clear();
                repository.save_project(&project)?;
            }
        }

        Ok(report)
    }
}

/// Classification an element arriving from the authoring tool resolves to.
/// Without a taxonomy in the store the authoring value stays.
fn refined_classification(
    element: &Element,
    element_type_group: Option<&str>,
    known: &[ClassificationRecord],
    default_root: &ClassificationRecord,
) -> Classification {
    if known.is_empty() {
        return if element.classification.is_empty() {
            default_root.to_classification()
        } else {
            element.classification.clone()
        };
    }
    let base = element.classification.code.clone().unwrap_or_default();
    resolve_classification(&base, element_type_group, known, default_root)
}

/// Updates the project's element and deleted-element lists. Returns whether
/// anything changed.
fn track_membership(
    project: &mut Project,
    existing: &[Element],
    inserted: &[Element],
    deleted: &[String],
) -> bool {
    let deleted_set: HashSet<&str> = deleted.iter().map(String::as_str).collect();
    let mut elements: Vec<String> = existing
        .iter()
        .chain(inserted)
        .map(|element| element.guid.clone())
        .filter(|guid| !deleted_set.contains(guid.as_str()))
        .collect();
    let mut seen = HashSet::new();
    elements.retain(|guid| seen.insert(guid.clone()));

    let mut deleted_elements = project.deleted_elements.clone();
    for guid in deleted {
        if !deleted_elements.contains(guid) {
            deleted_elements.push(guid.clone());
        }
    }

    let changed = elements != project.elements || deleted_elements != project.deleted_elements;
    project.elements = elements;
    project.deleted_elements = deleted_elements;
    changed
}
