//! Element ↔ document store record mapping.
//!
//! Store records mirror the element shape, so the mapping is mostly serde.
//! What it adds is schema conformance on the way in and out, and the
//! classification refinement applied to elements arriving from the
//! authoring tool.

use serde_json::Value;

use crate::bohm::tools::error::{Result, ToolError};
use crate::bohm::tools::model::{Classification, ClassificationRecord, Element, PropertyValues};
use crate::bohm::tools::schema::Schema;

/// Builds a store record for `element`, completed against `schema`.
pub fn to_record(element: &Element, schema: &Schema) -> Result<Value> {
    let element = conform(element.clone(), schema);
    Ok(serde_json::to_value(element)?)
}

/// Reads an element back from a store record.
pub fn from_record(record: Value) -> Result<Element> {
    let mut element: Element = serde_json::from_value(record)
        .map_err(|err| ToolError::DataShape(format!("element record: {err}")))?;
    element.refresh_derived();
    Ok(element)
}

/// Brings an element in line with the schema.
///
/// Every declared core group and property is present (missing values are
/// `None`), and only the custom group selected by the classification group
/// remains in `custom_properties`, completed the same way.
pub fn conform(mut element: Element, schema: &Schema) -> Element {
    element.refresh_derived();

    let mut core = std::mem::take(&mut element.core_properties);
    for group in schema.core_groups() {
        let existing = core.shift_remove(&group.storage_key).unwrap_or_default();
        element.core_properties.insert(
            group.storage_key.clone(),
            complete(existing, group.properties.iter().map(|p| &p.storage_key)),
        );
    }

    let mut custom = std::mem::take(&mut element.custom_properties);
    if let Some(group) = schema.custom_group_for(&element.classification_group) {
        let existing = custom.shift_remove(&group.storage_key).unwrap_or_default();
        element.custom_properties.insert(
            group.storage_key.clone(),
            complete(existing, group.properties.iter().map(|p| &p.storage_key)),
        );
    }

    element
}

fn complete<'a>(
    mut existing: PropertyValues,
    keys: impl Iterator<Item = &'a String>,
) -> PropertyValues {
    keys.map(|key| {
        let value = existing.shift_remove(key).flatten();
        (key.clone(), value)
    })
    .collect()
}

/// Refines an authoring-tool classification code against the store taxonomy.
///
/// An element-type-group code wins when it is a strict descendant of the base
/// code and known to the store. Otherwise the base code's `__01` variant is
/// used when known, and failing that the default root classification.
pub fn resolve_classification(
    base_code: &str,
    element_type_group: Option<&str>,
    known: &[ClassificationRecord],
    default_root: &ClassificationRecord,
) -> Classification {
    let lookup = |code: &str| known.iter().find(|record| record.code == code);
    let base_code = base_code.trim();

    if !base_code.is_empty() {
        let descendant = element_type_group
            .map(str::trim)
            .filter(|code| *code != base_code && code.starts_with(base_code))
            .and_then(lookup);
        if let Some(record) = descendant {
            return record.to_classification();
        }

        if let Some(record) = lookup(&format!("{base_code}__01")) {
            return record.to_classification();
        }
    }

    default_root.to_classification()
}
