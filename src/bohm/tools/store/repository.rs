use chrono::Utc;
use serde_json::{Value, json};
use tracing::warn;

use crate::bohm::tools::error::{Result, ToolError};
use crate::bohm::tools::io::document::{from_record, to_record};
use crate::bohm::tools::model::{
    ClassificationRecord, Element, ElementSnapshot, Project, ProjectKey,
};
use crate::bohm::tools::schema::Schema;
use crate::bohm::tools::store::{
    CLASSIFICATIONS, DocumentStore, ELEMENT_SNAPSHOTS, ELEMENTS, Filter, MIGRATIONS, PROJECTS,
};

/// Typed access to the collections the sync engine works with.
///
/// Element operations are always scoped by project code and GUID.
pub struct Repository<'a, S: DocumentStore + ?Sized> {
    store: &'a mut S,
}

pub fn element_filter(project_code: &str, guid: &str) -> Filter {
    Filter::eq("projectCode", project_code).and(Filter::eq("guid", guid))
}

impl<'a, S: DocumentStore + ?Sized> Repository<'a, S> {
    pub fn new(store: &'a mut S) -> Self {
        Self { store }
    }

    pub fn project(&self, key: &ProjectKey) -> Result<Project> {
        let record = self
            .store
            .find_one(PROJECTS, &Filter::eq(key.field(), key.value()))?
            .ok_or_else(|| ToolError::not_found("project", key.to_string()))?;
        serde_json::from_value(record)
            .map_err(|err| ToolError::DataShape(format!("project {key}: {err}")))
    }

    pub fn insert_project(&mut self, project: &Project) -> Result<()> {
        if self
            .store
            .find_one(PROJECTS, &Filter::eq("code", project.code.as_str()))?
            .is_some()
        {
            return Err(ToolError::Configuration(format!(
                "project with code '{}' already exists",
                project.code
            )));
        }
        self.store.insert_one(PROJECTS, serde_json::to_value(project)?)
    }

    pub fn save_project(&mut self, project: &Project) -> Result<()> {
        let replaced = self.store.replace_one(
            PROJECTS,
            &Filter::eq("code", project.code.as_str()),
            serde_json::to_value(project)?,
        )?;
        if !replaced {
            return Err(ToolError::not_found("project", project.code.clone()));
        }
        Ok(())
    }

    pub fn project_elements(&self, project_code: &str) -> Result<Vec<Element>> {
        let records = self
            .store
            .find_many(ELEMENTS, &Filter::eq("projectCode", project_code))?;
        Ok(decode_elements(records))
    }

    pub fn elements_by_guid(&self, project_code: &str, guids: &[String]) -> Result<Vec<Element>> {
        let filter = Filter::eq("projectCode", project_code)
            .and(Filter::is_in("guid", guids.iter().map(String::as_str)));
        Ok(decode_elements(self.store.find_many(ELEMENTS, &filter)?))
    }

    pub fn element(&self, project_code: &str, guid: &str) -> Result<Option<Element>> {
        self.store
            .find_one(ELEMENTS, &element_filter(project_code, guid))?
            .map(from_record)
            .transpose()
    }

    pub fn insert_elements(&mut self, elements: &[Element], schema: &Schema) -> Result<()> {
        if elements.is_empty() {
            return Ok(());
        }
        let records = elements
            .iter()
            .map(|element| to_record(element, schema))
            .collect::<Result<Vec<_>>>()?;
        self.store.insert_many(ELEMENTS, records)
    }

    /// Replaces the stored element with the same project code and GUID.
    pub fn replace_element(&mut self, element: &Element, schema: &Schema) -> Result<()> {
        let project_code = element
            .project_code
            .as_deref()
            .ok_or_else(|| {
                ToolError::DataShape(format!("element {} has no project code", element.guid))
            })?;
        let replaced = self.store.replace_one(
            ELEMENTS,
            &element_filter(project_code, &element.guid),
            to_record(element, schema)?,
        )?;
        if !replaced {
            return Err(ToolError::not_found("element", element.guid.clone()));
        }
        Ok(())
    }

    pub fn delete_elements(&mut self, project_code: &str, guids: &[String]) -> Result<usize> {
        if guids.is_empty() {
            return Ok(0);
        }
        let filter = Filter::eq("projectCode", project_code)
            .and(Filter::is_in("guid", guids.iter().map(String::as_str)));
        self.store.delete_many(ELEMENTS, &filter)
    }

    pub fn record_snapshots(&mut self, snapshots: &[ElementSnapshot]) -> Result<()> {
        if snapshots.is_empty() {
            return Ok(());
        }
        let records = snapshots
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        self.store.insert_many(ELEMENT_SNAPSHOTS, records)
    }

    /// Snapshots of one element, oldest first.
    pub fn snapshots(&self, project_code: &str, guid: &str) -> Result<Vec<ElementSnapshot>> {
        let records = self
            .store
            .find_many(ELEMENT_SNAPSHOTS, &element_filter(project_code, guid))?;
        let mut snapshots = records
            .into_iter()
            .map(serde_json::from_value::<ElementSnapshot>)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        snapshots.sort_by_key(|snapshot| snapshot.timestamp);
        Ok(snapshots)
    }

    pub fn classifications(&self) -> Result<Vec<ClassificationRecord>> {
        let records = self.store.find_all(CLASSIFICATIONS)?;
        Ok(records
            .into_iter()
            .filter_map(|record| match serde_json::from_value(record) {
                Ok(classification) => Some(classification),
                Err(error) => {
                    warn!(%error, "skipping malformed classification record");
                    None
                }
            })
            .collect())
    }

    pub fn insert_classifications(&mut self, records: &[ClassificationRecord]) -> Result<()> {
        let values = records
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        self.store.insert_many(CLASSIFICATIONS, values)
    }

    pub fn migration_applied(&self, project_code: &str, migration: &str) -> Result<bool> {
        let filter = Filter::eq("projectCode", project_code).and(Filter::eq("id", migration));
        Ok(self.store.find_one(MIGRATIONS, &filter)?.is_some())
    }

    pub fn record_migration(
        &mut self,
        project_code: &str,
        migration: &str,
        changed: usize,
    ) -> Result<()> {
        let record: Value = json!({
            "projectCode": project_code,
            "id": migration,
            "changedElements": changed,
            "appliedAt": Utc::now(),
        });
        self.store.insert_one(MIGRATIONS, record)
    }
}

fn decode_elements(records: Vec<Value>) -> Vec<Element> {
    records
        .into_iter()
        .filter_map(|record| match from_record(record) {
            Ok(element) => Some(element),
            Err(error) => {
                warn!(%error, "skipping malformed element record");
                None
            }
        })
        .collect()
}
