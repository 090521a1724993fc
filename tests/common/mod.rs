#![allow(dead_code)]

use bohm_sync::io::xml::ProjectDocument;
use bohm_sync::model::{Classification, Element, Project, Schedule};
use bohm_sync::schema::Schema;
use bohm_sync::settings::SyncSettings;
use bohm_sync::store::{DocumentStore, Repository};

pub const SCHEMA: &str = r#"
<configuration>
  <property-groups>
    <core name="Specification">
      <property name="Manufacturer"/>
      <property name="Model"/>
    </core>
    <core name="Tags &quot;Site&quot;" database-name="tags">
      <property name="Asset &quot;Tag&quot;" database-name="assetTag"/>
      <property name="Survey Ref" editable="false"/>
    </core>
    <custom name="Pr Products">
      <property name="Finish"/>
    </custom>
    <custom name="Ss Systems">
      <property name="Rating"/>
    </custom>
  </property-groups>
  <classification-options>
    <classification code="Pr_20" name="Doors"/>
    <classification code="Pr_30" name="Windows"/>
  </classification-options>
  <classification-group-options>
    <classification code="Pr" name="Products"/>
    <classification code="Ss" name="Systems"/>
  </classification-group-options>
  <classification-group-custom-property-group-mapping>
    <mapping classification-group="Pr" property-group="Pr Products"/>
    <mapping classification-group="Ss" property-group="Ss Systems"/>
  </classification-group-custom-property-group-mapping>
</configuration>
"#;

pub const GENERAL: &str = "Element Name & Classification";

pub fn schema() -> Schema {
    Schema::from_xml_str(SCHEMA).expect("schema parsed")
}

pub fn settings() -> SyncSettings {
    SyncSettings {
        cooldown_ms: 0,
        ..SyncSettings::default()
    }
}

/// Creates the `Tower A` / `TA` project with one schedule derived from the schema.
pub fn seed_project<S: DocumentStore + ?Sized>(store: &mut S, schema: &Schema) -> Project {
    let mut project = Project::new("Tower A", "TA");
    project.schedules.push(Schedule::from_schema("Doors", schema));
    Repository::new(store)
        .insert_project(&project)
        .expect("project inserted");
    project
}

pub fn door(guid: &str, name: &str, manufacturer: &str) -> Element {
    let mut element = Element::new(guid);
    element.name = Some(name.to_string());
    element.element_type = Some("Door".to_string());
    element.modi_stamp = Some("1".to_string());
    element.classification = Classification::new(Some("Pr_20".into()), Some("Doors".into()));
    element.classification_group = Classification::new(Some("Pr".into()), Some("Products".into()));
    element
        .core_properties
        .entry("Specification".to_string())
        .or_default()
        .insert("Manufacturer".to_string(), Some(manufacturer.to_string()));
    element
}

pub fn document(elements: Vec<Element>) -> ProjectDocument {
    ProjectDocument::new("Tower A", elements)
}

pub fn row(cells: &[&str]) -> Vec<String> {
    cells.iter().map(|cell| cell.to_string()).collect()
}
