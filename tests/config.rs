use std::fs;

use bohm_sync::ToolError;
use bohm_sync::model::SnapshotOrigin;
use bohm_sync::path::FieldPath;
use bohm_sync::reconcile::MutableField;
use bohm_sync::schema::Schema;
use bohm_sync::settings::{ProjectIdentity, SyncSettings};
use tempfile::tempdir;

fn configuration_error(source: &str) -> String {
    match Schema::from_xml_str(source) {
        Err(ToolError::Configuration(message)) => message,
        other => panic!("expected a configuration error, got {other:?}"),
    }
}

#[test]
fn duplicate_groups_are_rejected() {
    let message = configuration_error(
        r#"<configuration><property-groups>
             <core name="Specification"><property name="A"/></core>
             <core name="Specification"><property name="B"/></core>
           </property-groups></configuration>"#,
    );
    assert!(message.contains("duplicate core property group 'Specification'"), "{message}");
}

#[test]
fn duplicate_properties_are_rejected() {
    let message = configuration_error(
        r#"<configuration><property-groups>
             <custom name="Pr Products"><property name="Finish"/><property name="Finish"/></custom>
           </property-groups></configuration>"#,
    );
    assert!(message.contains("duplicate property 'Finish'"), "{message}");
}

#[test]
fn colliding_storage_keys_are_rejected() {
    let message = configuration_error(
        r#"<configuration><property-groups>
             <core name="Specification">
               <property name="Maker" database-name="manufacturer"/>
               <property name="Manufacturer" database-name="manufacturer"/>
             </core>
           </property-groups></configuration>"#,
    );
    assert!(message.contains("duplicate storage key 'manufacturer'"), "{message}");
}

#[test]
fn mapping_to_an_undeclared_group_is_rejected() {
    let message = configuration_error(
        r#"<configuration>
             <property-groups>
               <custom name="Pr Products"><property name="Finish"/></custom>
             </property-groups>
             <classification-group-custom-property-group-mapping>
               <mapping classification-group="Ss" property-group="Ss Systems"/>
             </classification-group-custom-property-group-mapping>
           </configuration>"#,
    );
    assert!(message.contains("undeclared custom group 'Ss Systems'"), "{message}");
}

#[test]
fn invalid_editable_flag_is_rejected() {
    let message = configuration_error(
        r#"<configuration><property-groups>
             <core name="Specification"><property name="Model" editable="maybe"/></core>
           </property-groups></configuration>"#,
    );
    assert!(message.contains("invalid editable flag 'maybe'"), "{message}");
}

#[test]
fn missing_schema_file_is_reported() {
    let temp_dir = tempdir().expect("temporary directory");
    let missing = temp_dir.path().join("schema.xml");
    assert!(matches!(
        Schema::load(&missing),
        Err(ToolError::MissingInput(path)) if path == missing
    ));
}

#[test]
fn settings_file_overrides_defaults() {
    let temp_dir = tempdir().expect("temporary directory");
    let path = temp_dir.path().join("settings.json");
    fs::write(
        &path,
        r#"{
            "projectIdentity": "code",
            "updateFields": ["name", "modiStamp"],
            "batchSize": 250,
            "defaultClassification": { "code": "Ss__02", "name": "Other systems" },
            "snapshotLabels": { "authoringTool": "Revit" }
        }"#,
    )
    .expect("settings written");

    let settings = SyncSettings::load(Some(&path)).expect("settings loaded");
    assert_eq!(settings.project_identity, ProjectIdentity::Code);
    assert!(settings.update_fields.allows(MutableField::ModiStamp));
    assert!(!settings.update_fields.allows(MutableField::CustomProperties));
    assert_eq!(settings.batch_size, 250);
    assert_eq!(settings.cooldown_ms, 5000);
    assert!(!settings.full_resync);
    assert_eq!(settings.default_classification.code, "Ss__02");
    assert_eq!(settings.snapshot_label(SnapshotOrigin::AuthoringTool), "Revit");
    assert_eq!(settings.snapshot_label(SnapshotOrigin::Schedule), "Schedule");
}

#[test]
fn malformed_settings_are_configuration_errors() {
    let temp_dir = tempdir().expect("temporary directory");
    let path = temp_dir.path().join("settings.json");
    fs::write(&path, r#"{ "updateFields": "everything" }"#).expect("settings written");
    assert!(matches!(
        SyncSettings::load(Some(&path)),
        Err(ToolError::Configuration(_))
    ));
}

#[test]
fn quoted_paths_keep_dots_and_quotes_inside_segments() {
    assert!(
        r#"coreProperties."Fire \"Rating\"".Resistance.min"#
            .parse::<FieldPath>()
            .is_err(),
        "an unquoted dot starts a new segment"
    );

    let parsed: FieldPath = r#"coreProperties."Fire \"Rating\""."Resistance.min""#
        .parse()
        .expect("quoted path parsed");
    assert_eq!(parsed, FieldPath::core("Fire \"Rating\"", "Resistance.min"));
    assert_eq!(parsed.to_string().parse::<FieldPath>().expect("reparsed"), parsed);

    assert!(matches!(
        "classification.colour".parse::<FieldPath>(),
        Err(ToolError::InvalidPath { .. })
    ));
}
