use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::bohm::tools::model::Element;

/// Element fields the authoring tool may overwrite on an existing record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MutableField {
    Name,
    Classification,
    ClassificationGroup,
    CoreProperties,
    CustomProperties,
    ModiStamp,
}

impl MutableField {
    pub const ALL: [Self; 6] = [
        Self::Name,
        Self::Classification,
        Self::ClassificationGroup,
        Self::CoreProperties,
        Self::CustomProperties,
        Self::ModiStamp,
    ];
}

/// Allowlist of fields overwritten when an element is updated.
///
/// Configured either as a preset (`"all"`, `"name-only"`) or as an explicit
/// list of field names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PolicyRepr", into = "PolicyRepr")]
pub struct UpdatePolicy {
    fields: BTreeSet<MutableField>,
}

impl Default for UpdatePolicy {
    fn default() -> Self {
        Self::all()
    }
}

impl UpdatePolicy {
    pub fn all() -> Self {
        Self::only(MutableField::ALL)
    }

    pub fn name_only() -> Self {
        Self::only([MutableField::Name])
    }

    pub fn only(fields: impl IntoIterator<Item = MutableField>) -> Self {
        Self {
            fields: fields.into_iter().collect(),
        }
    }

    pub fn allows(&self, field: MutableField) -> bool {
        self.fields.contains(&field)
    }

    /// `existing` with the allowed fields taken from `incoming`.
    pub fn merge(&self, existing: &Element, incoming: &Element) -> Element {
        let mut merged = existing.clone();
        for field in &self.fields {
            match field {
                MutableField::Name => merged.name = incoming.name.clone(),
                MutableField::Classification => {
                    merged.classification = incoming.classification.clone()
                }
                MutableField::ClassificationGroup => {
                    merged.classification_group = incoming.classification_group.clone()
                }
                MutableField::CoreProperties => {
                    merged.core_properties = incoming.core_properties.clone()
                }
                MutableField::CustomProperties => {
                    merged.custom_properties = incoming.custom_properties.clone()
                }
                MutableField::ModiStamp => merged.modi_stamp = incoming.modi_stamp.clone(),
            }
        }
        merged.refresh_derived();
        merged
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum PolicyRepr {
    Preset(String),
    Fields(Vec<MutableField>),
}

impl TryFrom<PolicyRepr> for UpdatePolicy {
    type Error = String;

    fn try_from(repr: PolicyRepr) -> Result<Self, Self::Error> {
        match repr {
            PolicyRepr::Preset(preset) => match preset.as_str() {
                "all" => Ok(Self::all()),
                "name-only" => Ok(Self::name_only()),
                other => Err(format!("unknown update policy '{other}'")),
            },
            PolicyRepr::Fields(fields) => Ok(Self::only(fields)),
        }
    }
}

impl From<UpdatePolicy> for PolicyRepr {
    fn from(policy: UpdatePolicy) -> Self {
        if policy == UpdatePolicy::all() {
            Self::Preset("all".into())
        } else if policy == UpdatePolicy::name_only() {
            Self::Preset("name-only".into())
        } else {
            Self::Fields(policy.fields.into_iter().collect())
        }
    }
}

/// Incoming elements split against the store by GUID.
#[derive(Debug, Default)]
pub struct Partition {
    pub to_insert: Vec<Element>,
    /// `(stored, incoming)` pairs.
    pub to_update: Vec<(Element, Element)>,
}

/// Splits `incoming` into inserts and updates. Repeated GUIDs keep their
/// first occurrence.
pub fn partition(incoming: Vec<Element>, existing: &[Element]) -> Partition {
    let stored: HashMap<&str, &Element> = existing
        .iter()
        .map(|element| (element.guid.as_str(), element))
        .collect();
    let mut seen = BTreeSet::new();
    let mut result = Partition::default();

    for element in incoming {
        if !seen.insert(element.guid.clone()) {
            warn!(guid = %element.guid, "duplicate element in project file skipped");
            continue;
        }
        match stored.get(element.guid.as_str()) {
            Some(current) => result.to_update.push(((*current).clone(), element)),
            None => result.to_insert.push(element),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_only_policy_keeps_other_fields() {
        let mut existing = Element::new("G1");
        existing.name = Some("Old".into());
        existing.modi_stamp = Some("1".into());
        let mut incoming = existing.clone();
        incoming.name = Some("New".into());
        incoming.modi_stamp = Some("2".into());

        let merged = UpdatePolicy::name_only().merge(&existing, &incoming);
        assert_eq!(merged.name.as_deref(), Some("New"));
        assert_eq!(merged.modi_stamp.as_deref(), Some("1"));
    }

    #[test]
    fn policy_accepts_presets_and_lists() {
        let policy: UpdatePolicy = serde_json::from_str(r#"["name", "modiStamp"]"#).expect("list");
        assert!(policy.allows(MutableField::ModiStamp));
        assert!(!policy.allows(MutableField::Classification));
        assert!(serde_json::from_str::<UpdatePolicy>(r#""everything""#).is_err());
        assert_eq!(serde_json::to_string(&UpdatePolicy::all()).expect("json"), r#""all""#);
    }

    #[test]
    fn partition_splits_by_guid() {
        let existing = vec![Element::new("G1")];
        let result = partition(
            vec![Element::new("G1"), Element::new("G2"), Element::new("G2")],
            &existing,
        );
        assert_eq!(result.to_update.len(), 1);
        assert_eq!(result.to_insert.len(), 1);
    }
}
